//! Metrics and structured logging for the data collector.
//!
//! - Prometheus counters and gauges for ingestion, drops and transport health
//! - Structured JSON logging with tracing
//! - Periodic statistics summary written to the log

pub mod error;
pub mod logging;
pub mod metrics;
pub mod stats;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
pub use stats::{StatsReporter, StatsSnapshot};
