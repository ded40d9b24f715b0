//! Hyperliquid market data recorder.
//!
//! Wires the stream transport, info-endpoint polling, decoder and CSV sink
//! into a single-instrument recording pipeline.

pub mod config;
pub mod error;
pub mod recorder;

pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use recorder::{IngestState, Recorder, RecorderStatus};
