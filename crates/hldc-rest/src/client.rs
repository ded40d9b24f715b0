//! HTTP client for the exchange's `/info` endpoint.
//!
//! All requests are POSTs with a typed `{"type": ...}` body. The asset
//! context call returns funding, mark/oracle price and open interest for a
//! coin by joining the `metaAndAssetCtxs` universe/context arrays.

use crate::error::{RestError, RestResult};
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

/// Default timeout for API requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Request body for the info endpoint.
#[derive(Debug, Serialize)]
struct InfoRequest {
    #[serde(rename = "type")]
    request_type: String,
}

/// Universe entry from the meta response.
#[derive(Debug, Deserialize)]
struct UniverseEntry {
    name: String,
}

/// Raw asset context entry. The exchange sends numeric values as strings.
#[derive(Debug, Deserialize)]
struct RawAssetCtx {
    funding: String,
    #[serde(rename = "markPx")]
    mark_px: String,
    #[serde(rename = "oraclePx")]
    oracle_px: String,
    #[serde(rename = "openInterest")]
    open_interest: String,
    #[serde(rename = "premium", default)]
    premium: Option<String>,
}

/// Typed asset context for one coin.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetCtx {
    /// Receipt time of the poll response.
    pub timestamp: DateTime<Utc>,
    pub coin: String,
    pub funding_rate: Decimal,
    pub mark_price: Decimal,
    pub oracle_price: Decimal,
    pub open_interest: Decimal,
    pub premium: Option<Decimal>,
    /// Predicted rate and next funding time, when fetched separately.
    pub predicted_funding_rate: Option<Decimal>,
    pub next_funding_time: Option<DateTime<Utc>>,
}

/// Retry policy for transient poll failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum attempts per call (including the first).
    pub max_attempts: u32,
    /// Base delay between attempts, doubled each retry.
    pub base_delay: Duration,
    /// Cool-down applied on rate limiting when the server gives no hint.
    pub rate_limit_cooldown: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            rate_limit_cooldown: Duration::from_secs(10),
        }
    }
}

/// Client for the exchange info endpoint.
pub struct InfoClient {
    client: Client,
    info_url: String,
}

impl InfoClient {
    /// Create a new info client.
    ///
    /// # Arguments
    /// * `info_url` - URL of the info endpoint (e.g. "https://api.hyperliquid.xyz/info")
    pub fn new(info_url: impl Into<String>) -> RestResult<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| RestError::Network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            info_url: info_url.into(),
        })
    }

    /// Fetch the asset context for a coin from `metaAndAssetCtxs`.
    ///
    /// The response is a two-element array: `[{universe: [...]}, [ctx, ...]]`
    /// where universe and contexts align by index.
    pub async fn fetch_asset_ctx(&self, coin: &str) -> RestResult<AssetCtx> {
        let body = self.post_info("metaAndAssetCtxs").await?;

        let parts = body
            .as_array()
            .filter(|a| a.len() >= 2)
            .ok_or_else(|| RestError::Malformed("metaAndAssetCtxs is not a pair".to_string()))?;

        let universe: Vec<UniverseEntry> = parts[0]
            .get("universe")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| RestError::Malformed(format!("universe: {e}")))?
            .ok_or_else(|| RestError::Malformed("missing universe".to_string()))?;

        let idx = universe
            .iter()
            .position(|entry| entry.name == coin)
            .ok_or_else(|| RestError::Malformed(format!("coin {coin} not in universe")))?;

        let raw: RawAssetCtx = parts[1]
            .get(idx)
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| RestError::Malformed(format!("assetCtx: {e}")))?
            .ok_or_else(|| RestError::Malformed(format!("no ctx at index {idx}")))?;

        let ctx = AssetCtx {
            timestamp: Utc::now(),
            coin: coin.to_string(),
            funding_rate: parse_decimal("funding", &raw.funding)?,
            mark_price: parse_decimal("markPx", &raw.mark_px)?,
            oracle_price: parse_decimal("oraclePx", &raw.oracle_px)?,
            open_interest: parse_decimal("openInterest", &raw.open_interest)?,
            premium: raw
                .premium
                .as_deref()
                .map(|p| parse_decimal("premium", p))
                .transpose()?,
            predicted_funding_rate: None,
            next_funding_time: None,
        };

        debug!(coin = %ctx.coin, funding = %ctx.funding_rate, oi = %ctx.open_interest, "Fetched asset ctx");
        Ok(ctx)
    }

    /// Fetch the predicted funding rate and next funding time for a coin
    /// from `predictedFundings`, best effort.
    ///
    /// Wire shape: `[[coin, [[venue, {fundingRate, nextFundingTime}], ...]], ...]`;
    /// only the native venue entry is used.
    pub async fn fetch_predicted_funding(
        &self,
        coin: &str,
    ) -> RestResult<Option<(Decimal, DateTime<Utc>)>> {
        let body = self.post_info("predictedFundings").await?;

        let entries = body
            .as_array()
            .ok_or_else(|| RestError::Malformed("predictedFundings is not an array".to_string()))?;

        for entry in entries {
            let Some(pair) = entry.as_array().filter(|p| p.len() >= 2) else {
                continue;
            };
            if pair[0].as_str() != Some(coin) {
                continue;
            }

            let Some(venues) = pair[1].as_array() else {
                continue;
            };
            for venue in venues {
                let Some(venue_pair) = venue.as_array().filter(|p| p.len() >= 2) else {
                    continue;
                };
                if venue_pair[0].as_str() != Some("HlPerp") {
                    continue;
                }
                let detail = &venue_pair[1];
                let rate = detail
                    .get("fundingRate")
                    .and_then(|r| r.as_str())
                    .map(|r| parse_decimal("fundingRate", r))
                    .transpose()?;
                let next = detail
                    .get("nextFundingTime")
                    .and_then(|t| t.as_i64())
                    .and_then(|ms| Utc.timestamp_millis_opt(ms).single());
                if let (Some(rate), Some(next)) = (rate, next) {
                    return Ok(Some((rate, next)));
                }
            }
        }

        Ok(None)
    }

    /// Fetch the asset context, retrying transient failures per `policy`.
    ///
    /// Rate limiting honors the server's retry hint when present, otherwise
    /// the configured cool-down. Malformed responses are returned
    /// immediately: they indicate a protocol mismatch, not transience.
    pub async fn fetch_asset_ctx_with_retry(
        &self,
        coin: &str,
        policy: &RetryPolicy,
    ) -> RestResult<AssetCtx> {
        let mut delay = policy.base_delay;
        let max_attempts = policy.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            match self.fetch_asset_ctx(coin).await {
                Ok(ctx) => return Ok(ctx),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) if attempt == max_attempts => return Err(e),
                Err(RestError::RateLimited { retry_after }) => {
                    let cooldown = retry_after.unwrap_or(policy.rate_limit_cooldown);
                    warn!(attempt, cooldown_ms = cooldown.as_millis(), "Rate limited, cooling down");
                    tokio::time::sleep(cooldown).await;
                }
                Err(e) => {
                    warn!(attempt, ?e, delay_ms = delay.as_millis(), "Poll failed, retrying");
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                }
            }
        }

        unreachable!("retry loop always returns");
    }

    async fn post_info(&self, request_type: &str) -> RestResult<serde_json::Value> {
        let request = InfoRequest {
            request_type: request_type.to_string(),
        };

        let response = self
            .client
            .post(&self.info_url)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(RestError::RateLimited { retry_after });
        }
        if !status.is_success() {
            return Err(RestError::Server {
                status: status.as_u16(),
            });
        }

        response
            .json()
            .await
            .map_err(|e| RestError::Malformed(format!("JSON decode failed: {e}")))
    }
}

fn parse_decimal(field: &str, value: &str) -> RestResult<Decimal> {
    Decimal::from_str(value).map_err(|e| RestError::Malformed(format!("{field}={value}: {e}")))
}
