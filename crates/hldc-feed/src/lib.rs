//! Message decoding for the Hyperliquid data collector.
//!
//! Turns raw channel payloads into typed records. Decoding is stateless and
//! side-effect-free: a payload either yields fully populated records or a
//! `FeedError` naming the reason it was dropped.

pub mod error;
pub mod parser;

pub use error::{FeedError, FeedResult};
pub use parser::{decode_asset_ctx, decode_l2_book, decode_trades};
