//! WebSocket message envelopes.
//!
//! Outgoing requests follow the exchange's subscribe/ping vocabulary.
//! Incoming frames all share the `{"channel": ..., "data": ...}` shape.

use serde::{Deserialize, Serialize};

/// Outgoing request envelope.
#[derive(Debug, Clone, Serialize)]
pub struct WsRequest {
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription: Option<serde_json::Value>,
}

impl WsRequest {
    /// Create a subscribe request.
    pub fn subscribe(subscription: serde_json::Value) -> Self {
        Self {
            method: "subscribe".to_string(),
            subscription: Some(subscription),
        }
    }

    /// Create an application-level ping.
    pub fn ping() -> Self {
        Self {
            method: "ping".to_string(),
            subscription: None,
        }
    }
}

/// Incoming channel message.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelMessage {
    /// Channel tag: "trades", "l2Book", "activeAssetCtx",
    /// "subscriptionResponse", "pong", or "error".
    pub channel: String,
    /// Channel payload, decoded downstream by hldc-feed.
    #[serde(default)]
    pub data: serde_json::Value,
}

impl ChannelMessage {
    /// Whether this is the application-level pong.
    pub fn is_pong(&self) -> bool {
        self.channel == "pong"
    }
}

/// Extract the subscription type from a subscriptionResponse payload.
pub fn subscription_ack_type(data: &serde_json::Value) -> Option<&str> {
    // Official format: {"method": "subscribe", "subscription": {"type": ...}}
    data.get("subscription")
        .and_then(|s| s.get("type"))
        .and_then(|t| t.as_str())
        // Fallback: type at the top level
        .or_else(|| data.get("type").and_then(|t| t.as_str()))
}
