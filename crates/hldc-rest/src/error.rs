//! Poll transport error types.

use std::time::Duration;
use thiserror::Error;

/// Classified poll errors. Retryability is a property of the class:
/// Network/Timeout/Server are transient, RateLimited carries a mandatory
/// cool-down, Malformed indicates a protocol mismatch and is never retried.
#[derive(Debug, Error)]
pub enum RestError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Server error: HTTP {status}")]
    Server { status: u16 },

    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl RestError {
    /// Whether a retry can be expected to help.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Malformed(_))
    }
}

impl From<reqwest::Error> for RestError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if let Some(status) = e.status() {
            Self::Server {
                status: status.as_u16(),
            }
        } else {
            Self::Network(e.to_string())
        }
    }
}

pub type RestResult<T> = Result<T, RestError>;
