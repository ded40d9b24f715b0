//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] hldc_ws::WsError),

    #[error("Poll error: {0}")]
    Rest(#[from] hldc_rest::RestError),

    #[error("Feed error: {0}")]
    Feed(#[from] hldc_feed::FeedError),

    #[error("Sink error: {0}")]
    Sink(#[from] hldc_sink::SinkError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] hldc_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
