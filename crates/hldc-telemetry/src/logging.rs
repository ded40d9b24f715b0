//! Logging setup.
//!
//! Filtering comes from `RUST_LOG`, falling back to info globally with
//! debug for this workspace. `RUST_ENV=production` switches the output to
//! one JSON object per line for log shippers; anything else gets the
//! human-readable pretty format.

use crate::error::{TelemetryError, TelemetryResult};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub fn init_logging() -> TelemetryResult<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,hldc=debug"));

    let json = matches!(std::env::var("RUST_ENV").as_deref(), Ok("production"));

    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true),
            )
            .try_init()
    } else {
        registry
            .with(
                fmt::layer()
                    .pretty()
                    .with_target(true)
                    .with_thread_names(true),
            )
            .try_init()
    };

    result.map_err(|e| TelemetryError::LoggingInit(e.to_string()))
}
