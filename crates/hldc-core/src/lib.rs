//! Core domain types for the Hyperliquid data collector.
//!
//! This crate provides the record types produced by the ingestion pipeline:
//! - `Trade`: individual fills from the trades channel
//! - `BookSnapshot`: full top-of-book renders from the l2Book channel
//! - `FundingRate`, `OpenInterest`: asset context samples
//! - `Record` / `RecordKind`: the unified flow handed to the sink

pub mod error;
pub mod record;

pub use error::{CoreError, Result};
pub use record::{
    BookLevel, BookSnapshot, FundingRate, OpenInterest, Record, RecordKind, Trade, TradeSide,
};
