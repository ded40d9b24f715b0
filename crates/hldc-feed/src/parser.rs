//! Channel payload parsing.
//!
//! The exchange sends numeric values as strings; every field is validated
//! and converted to `Decimal` before a record is emitted. A payload that
//! fails any validation produces an error for the whole payload, never a
//! partially populated record.

use crate::error::{FeedError, FeedResult};
use chrono::{DateTime, TimeZone, Utc};
use hldc_core::{BookLevel, BookSnapshot, FundingRate, OpenInterest, Trade, TradeSide};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;

/// Raw trade entry from the trades channel.
#[derive(Debug, Deserialize)]
struct RawTrade {
    coin: String,
    side: String,
    px: String,
    sz: String,
    time: i64,
    hash: String,
    tid: u64,
    #[serde(default)]
    users: Vec<String>,
    #[serde(default)]
    crossed: bool,
}

/// Raw book level: {"px": "...", "sz": "...", "n": 3}.
#[derive(Debug, Deserialize)]
struct RawLevel {
    px: String,
    sz: String,
    n: u32,
}

/// Raw l2Book payload: levels[0] = bids descending, levels[1] = asks ascending.
#[derive(Debug, Deserialize)]
struct RawBook {
    coin: String,
    time: i64,
    levels: Vec<Vec<RawLevel>>,
}

/// Raw activeAssetCtx payload.
#[derive(Debug, Deserialize)]
struct RawActiveCtx {
    coin: String,
    ctx: RawCtxData,
}

/// Perps asset context data carried on the stream.
#[derive(Debug, Deserialize)]
struct RawCtxData {
    funding: String,
    #[serde(rename = "markPx")]
    mark_px: String,
    #[serde(rename = "oraclePx")]
    oracle_px: String,
    #[serde(rename = "openInterest")]
    open_interest: String,
}

/// Decode a trades channel payload into trade records.
///
/// The payload is an array; each entry is validated independently, but one
/// invalid entry fails the whole payload so it can be counted and dropped as
/// a unit.
pub fn decode_trades(data: &serde_json::Value) -> FeedResult<Vec<Trade>> {
    let raw: Vec<RawTrade> = serde_json::from_value(data.clone())?;

    raw.into_iter()
        .map(|t| {
            let (buyer, seller) = match t.users.as_slice() {
                [buyer, seller, ..] => (buyer.clone(), seller.clone()),
                [buyer] => (buyer.clone(), String::new()),
                [] => (String::new(), String::new()),
            };

            Ok(Trade {
                timestamp: millis_to_utc(t.time)?,
                coin: t.coin,
                side: TradeSide::from_wire(&t.side)
                    .map_err(|_| FeedError::InvalidSide(t.side.clone()))?,
                price: parse_decimal("px", &t.px)?,
                size: parse_decimal("sz", &t.sz)?,
                trade_id: t.tid,
                buyer,
                seller,
                hash: t.hash,
                crossed: t.crossed,
                fee: None, // not carried on the trades channel
            })
        })
        .collect()
}

/// Decode an l2Book payload into a full book snapshot.
///
/// Both sides must be present; an empty side is a valid (one-sided) book,
/// a missing side array is a malformed payload.
pub fn decode_l2_book(data: &serde_json::Value) -> FeedResult<BookSnapshot> {
    let raw: RawBook = serde_json::from_value(data.clone())?;

    let mut sides = raw.levels.into_iter();
    let bids = decode_levels(sides.next().ok_or(FeedError::MissingField("levels[0]"))?)?;
    let asks = decode_levels(sides.next().ok_or(FeedError::MissingField("levels[1]"))?)?;

    Ok(BookSnapshot {
        timestamp: millis_to_utc(raw.time)?,
        coin: raw.coin,
        bids,
        asks,
    })
}

/// Decode an activeAssetCtx payload into funding and open interest records.
///
/// One stream message carries both: the context block has the funding rate,
/// mark/oracle prices, and open interest. Both records share the receipt
/// timestamp since the stream variant carries no exchange time.
pub fn decode_asset_ctx(
    data: &serde_json::Value,
) -> FeedResult<(FundingRate, OpenInterest)> {
    decode_asset_ctx_at(data, Utc::now())
}

/// `decode_asset_ctx` with an explicit timestamp, for deterministic tests.
pub fn decode_asset_ctx_at(
    data: &serde_json::Value,
    timestamp: DateTime<Utc>,
) -> FeedResult<(FundingRate, OpenInterest)> {
    let raw: RawActiveCtx = serde_json::from_value(data.clone())?;

    let funding_rate = parse_decimal("funding", &raw.ctx.funding)?;
    let mark_price = parse_decimal("markPx", &raw.ctx.mark_px)?;
    let oracle_price = parse_decimal("oraclePx", &raw.ctx.oracle_px)?;
    let open_interest = parse_decimal("openInterest", &raw.ctx.open_interest)?;

    let funding = FundingRate {
        timestamp,
        coin: raw.coin.clone(),
        funding_rate,
        predicted_funding_rate: None,
        next_funding_time: None,
        mark_price,
        index_price: oracle_price,
    };

    let oi = OpenInterest {
        timestamp,
        coin: raw.coin,
        open_interest,
        mark_price,
        oracle_price,
    };

    Ok((funding, oi))
}

fn decode_levels(raw: Vec<RawLevel>) -> FeedResult<Vec<BookLevel>> {
    raw.into_iter()
        .map(|level| {
            Ok(BookLevel {
                price: parse_decimal("px", &level.px)?,
                size: parse_decimal("sz", &level.sz)?,
                orders: level.n,
            })
        })
        .collect()
}

fn parse_decimal(field: &'static str, value: &str) -> FeedResult<Decimal> {
    Decimal::from_str(value).map_err(|_| FeedError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

fn millis_to_utc(ms: i64) -> FeedResult<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or(FeedError::InvalidTimestamp(ms))
}
