//! Hyperliquid market data recorder - entry point.

use anyhow::Result;
use clap::Parser;
use hldc_recorder::{AppConfig, Recorder};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Single-instrument Hyperliquid market data recorder
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via HLDC_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,

    /// Coin symbol, overrides the configured value
    #[arg(long)]
    coin: Option<String>,

    /// Use testnet endpoints
    #[arg(long)]
    testnet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize TLS crypto provider (must be before any WS connections)
    hldc_ws::init_crypto();

    let args = Args::parse();

    hldc_telemetry::init_logging()?;

    info!("Starting recorder v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match &args.config {
        Some(path) => {
            info!(config_path = %path, "Loading configuration");
            AppConfig::from_file(path)?
        }
        None => AppConfig::load()?,
    };

    if let Some(coin) = args.coin {
        config.coin = coin;
    }
    if args.testnet {
        config.testnet = true;
    }

    info!(
        coin = %config.coin,
        ws_url = %config.resolved_ws_url(),
        info_url = %config.resolved_info_url(),
        data_dir = %config.sink.data_dir,
        "Configuration loaded"
    );

    let recorder = Recorder::new(config)?;

    let shutdown = CancellationToken::new();
    {
        let token = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Ctrl-C received, shutting down");
                token.cancel();
            }
        });
    }

    recorder.run(shutdown).await?;

    Ok(())
}
