//! REST poll transport for the Hyperliquid data collector.
//!
//! Issues synchronous request/response calls to the exchange's `/info`
//! endpoint for data not carried on the stream (funding rate, open
//! interest), with classified errors and a bounded retry policy.

pub mod client;
pub mod error;

pub use client::{AssetCtx, InfoClient, RetryPolicy};
pub use error::{RestError, RestResult};
