//! Typed market data records.
//!
//! Each record type maps to one output file kind. Field sets mirror the
//! exchange's wire format: prices, sizes and rates arrive as decimal strings
//! and are kept as `Decimal` end to end.

use crate::error::CoreError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// The four record kinds the pipeline produces.
///
/// Ordering is the merge tie-break priority: when two kinds carry identical
/// timestamps, the lower variant wins (Trades first, OpenInterest last).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Trades,
    OrderBook,
    FundingRate,
    OpenInterest,
}

impl RecordKind {
    /// All kinds, in priority order.
    pub const ALL: [RecordKind; 4] = [
        RecordKind::Trades,
        RecordKind::OrderBook,
        RecordKind::FundingRate,
        RecordKind::OpenInterest,
    ];

    /// File-name stem for this kind (e.g. `btc_trades.csv`).
    pub fn file_stem(&self) -> &'static str {
        match self {
            Self::Trades => "trades",
            Self::OrderBook => "orderbook",
            Self::FundingRate => "funding_rate",
            Self::OpenInterest => "open_interest",
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.file_stem())
    }
}

impl FromStr for RecordKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trades" => Ok(Self::Trades),
            "orderbook" => Ok(Self::OrderBook),
            "funding_rate" => Ok(Self::FundingRate),
            "open_interest" => Ok(Self::OpenInterest),
            other => Err(CoreError::InvalidRecordKind(other.to_string())),
        }
    }
}

/// Trade side. The exchange encodes buy as "B" and sell as "A" (ask hit).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    /// Parse from the exchange's single-letter encoding.
    pub fn from_wire(s: &str) -> Result<Self, CoreError> {
        match s {
            "B" | "b" | "buy" => Ok(Self::Buy),
            "A" | "a" | "sell" => Ok(Self::Sell),
            other => Err(CoreError::InvalidSide(other.to_string())),
        }
    }
}

impl std::fmt::Display for TradeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

/// A single fill from the trades channel.
///
/// Immutable once received; uniquely keyed by `trade_id` on the exchange
/// side. Duplicates are append-safe, downstream consumers dedupe by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub timestamp: DateTime<Utc>,
    pub coin: String,
    pub side: TradeSide,
    pub price: Decimal,
    pub size: Decimal,
    pub trade_id: u64,
    pub buyer: String,
    pub seller: String,
    pub hash: String,
    pub crossed: bool,
    /// Not carried on the trades channel; present only when backfilled.
    pub fee: Option<Decimal>,
}

/// One price level of the order book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: Decimal,
    pub size: Decimal,
    /// Number of resting orders at this level.
    pub orders: u32,
}

/// A complete order book render from the l2Book channel.
///
/// Every inbound message fully replaces the prior view; there is no diff
/// model. Bids are descending, asks ascending, as delivered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub timestamp: DateTime<Utc>,
    pub coin: String,
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
}

impl BookSnapshot {
    /// Best bid, if the bid side is non-empty.
    pub fn best_bid(&self) -> Option<&BookLevel> {
        self.bids.first()
    }

    /// Best ask, if the ask side is non-empty.
    pub fn best_ask(&self) -> Option<&BookLevel> {
        self.asks.first()
    }

    /// Spread: best ask minus best bid. None if either side is empty.
    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask.price - bid.price),
            _ => None,
        }
    }
}

/// Funding rate sample, from the activeAssetCtx channel or a poll cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundingRate {
    pub timestamp: DateTime<Utc>,
    pub coin: String,
    pub funding_rate: Decimal,
    pub predicted_funding_rate: Option<Decimal>,
    pub next_funding_time: Option<DateTime<Utc>>,
    pub mark_price: Decimal,
    pub index_price: Decimal,
}

/// Open interest sample, same cadence as `FundingRate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenInterest {
    pub timestamp: DateTime<Utc>,
    pub coin: String,
    pub open_interest: Decimal,
    pub mark_price: Decimal,
    pub oracle_price: Decimal,
}

/// Unified record flow handed from the coordinator to the sink.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Trade(Trade),
    Book(BookSnapshot),
    Funding(FundingRate),
    OpenInterest(OpenInterest),
}

impl Record {
    /// The kind this record routes to.
    pub fn kind(&self) -> RecordKind {
        match self {
            Self::Trade(_) => RecordKind::Trades,
            Self::Book(_) => RecordKind::OrderBook,
            Self::Funding(_) => RecordKind::FundingRate,
            Self::OpenInterest(_) => RecordKind::OpenInterest,
        }
    }

    /// Record timestamp.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Trade(t) => t.timestamp,
            Self::Book(b) => b.timestamp,
            Self::Funding(f) => f.timestamp,
            Self::OpenInterest(o) => o.timestamp,
        }
    }
}
