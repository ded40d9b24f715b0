//! Feed error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Invalid numeric value for {field}: {value}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(i64),

    #[error("Invalid side: {0}")]
    InvalidSide(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type FeedResult<T> = Result<T, FeedError>;
