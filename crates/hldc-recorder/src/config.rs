//! Application configuration.

use crate::error::{AppError, AppResult};
use hldc_rest::RetryPolicy;
use hldc_sink::SinkConfig;
use hldc_ws::{Channel, ConnectionConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const MAINNET_WS_URL: &str = "wss://api.hyperliquid.xyz/ws";
const MAINNET_INFO_URL: &str = "https://api.hyperliquid.xyz/info";
const TESTNET_WS_URL: &str = "wss://api.hyperliquid-testnet.xyz/ws";
const TESTNET_INFO_URL: &str = "https://api.hyperliquid-testnet.xyz/info";

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Coin symbol to record (e.g. "BTC").
    #[serde(default = "default_coin")]
    pub coin: String,
    /// Use the testnet endpoints.
    #[serde(default)]
    pub testnet: bool,
    /// WebSocket endpoint override. Defaults by network when unset.
    #[serde(default)]
    pub ws_url: Option<String>,
    /// Info endpoint override. Defaults by network when unset.
    #[serde(default)]
    pub info_url: Option<String>,
    /// WebSocket configuration.
    #[serde(default)]
    pub websocket: WsSection,
    /// Polling configuration.
    #[serde(default)]
    pub poll: PollSection,
    /// Sink configuration.
    #[serde(default)]
    pub sink: SinkSection,
    /// Telemetry configuration.
    #[serde(default)]
    pub telemetry: TelemetrySection,
}

fn default_coin() -> String {
    "BTC".to_string()
}

/// WebSocket configuration subset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsSection {
    /// Maximum reconnection attempts (0 = infinite).
    #[serde(default)]
    pub max_reconnect_attempts: u32,
    /// Base delay for reconnection backoff (ms).
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,
    /// Maximum delay for reconnection backoff (ms).
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,
    /// Heartbeat interval (ms).
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// Heartbeat timeout (ms).
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,
}

fn default_reconnect_base_delay_ms() -> u64 {
    1000
}

fn default_reconnect_max_delay_ms() -> u64 {
    60_000
}

fn default_heartbeat_interval_ms() -> u64 {
    30_000
}

fn default_heartbeat_timeout_ms() -> u64 {
    10_000
}

impl Default for WsSection {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: 0,
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
            reconnect_max_delay_ms: default_reconnect_max_delay_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            heartbeat_timeout_ms: default_heartbeat_timeout_ms(),
        }
    }
}

/// REST polling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollSection {
    /// Funding rate poll interval (seconds).
    #[serde(default = "default_poll_interval_secs")]
    pub funding_interval_secs: u64,
    /// Open interest poll interval (seconds).
    #[serde(default = "default_poll_interval_secs")]
    pub open_interest_interval_secs: u64,
    /// Retry attempts per poll cycle.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_retry_attempts() -> u32 {
    3
}

impl Default for PollSection {
    fn default() -> Self {
        Self {
            funding_interval_secs: default_poll_interval_secs(),
            open_interest_interval_secs: default_poll_interval_secs(),
            retry_attempts: default_retry_attempts(),
        }
    }
}

/// Sink configuration subset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkSection {
    /// Base directory for CSV files.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Per-kind buffer size that triggers an inline flush.
    #[serde(default = "default_flush_threshold")]
    pub flush_threshold: usize,
    /// Per-kind buffer size that backpressures intake.
    #[serde(default = "default_watermark")]
    pub watermark: usize,
    /// Time-based flush interval (seconds).
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_flush_threshold() -> usize {
    100
}

fn default_watermark() -> usize {
    1000
}

fn default_flush_interval_secs() -> u64 {
    5
}

impl Default for SinkSection {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            flush_threshold: default_flush_threshold(),
            watermark: default_watermark(),
            flush_interval_secs: default_flush_interval_secs(),
        }
    }
}

/// Telemetry configuration subset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetrySection {
    /// Statistics summary interval (seconds).
    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,
}

fn default_stats_interval_secs() -> u64 {
    300
}

impl Default for TelemetrySection {
    fn default() -> Self {
        Self {
            stats_interval_secs: default_stats_interval_secs(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            coin: default_coin(),
            testnet: false,
            ws_url: None,
            info_url: None,
            websocket: WsSection::default(),
            poll: PollSection::default(),
            sink: SinkSection::default(),
            telemetry: TelemetrySection::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default location.
    pub fn load() -> AppResult<Self> {
        let config_path =
            std::env::var("HLDC_CONFIG").unwrap_or_else(|_| "config/default.toml".to_string());

        if Path::new(&config_path).exists() {
            Self::from_file(&config_path)
        } else {
            tracing::warn!(path = %config_path, "Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load from a specific file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;

        toml::from_str(&content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))
    }

    /// WebSocket endpoint, explicit override or the network default.
    pub fn resolved_ws_url(&self) -> String {
        self.ws_url.clone().unwrap_or_else(|| {
            if self.testnet {
                TESTNET_WS_URL.to_string()
            } else {
                MAINNET_WS_URL.to_string()
            }
        })
    }

    /// Info endpoint, explicit override or the network default.
    pub fn resolved_info_url(&self) -> String {
        self.info_url.clone().unwrap_or_else(|| {
            if self.testnet {
                TESTNET_INFO_URL.to_string()
            } else {
                MAINNET_INFO_URL.to_string()
            }
        })
    }

    /// Build the transport configuration.
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            url: self.resolved_ws_url(),
            coin: self.coin.clone(),
            channels: vec![Channel::Trades, Channel::L2Book, Channel::ActiveAssetCtx],
            max_reconnect_attempts: self.websocket.max_reconnect_attempts,
            reconnect_base_delay_ms: self.websocket.reconnect_base_delay_ms,
            reconnect_max_delay_ms: self.websocket.reconnect_max_delay_ms,
            heartbeat_interval_ms: self.websocket.heartbeat_interval_ms,
            heartbeat_timeout_ms: self.websocket.heartbeat_timeout_ms,
        }
    }

    /// Build the sink configuration.
    pub fn sink_config(&self) -> SinkConfig {
        SinkConfig {
            flush_threshold: self.sink.flush_threshold,
            // A watermark below the threshold would signal backpressure on
            // every buffer fill; clamp it up
            watermark: self.sink.watermark.max(self.sink.flush_threshold),
        }
    }

    /// Build the poll retry policy.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.poll.retry_attempts,
            ..Default::default()
        }
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.sink.flush_interval_secs.max(1))
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.telemetry.stats_interval_secs.max(1))
    }
}
