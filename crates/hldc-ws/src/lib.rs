//! WebSocket stream transport for the Hyperliquid data collector.
//!
//! Provides robust connectivity with:
//! - Automatic reconnection with capped exponential backoff and jitter
//! - Full subscription replay after every reconnect
//! - Heartbeat monitoring (application-level ping, pong timeout detection)
//! - Transport events over a bounded channel (the backpressure point)

pub mod connection;
pub mod error;
pub mod heartbeat;
pub mod message;

pub use connection::{Channel, ConnectionConfig, ConnectionManager, TransportState, WsEvent};
pub use error::{WsError, WsResult};
pub use message::{ChannelMessage, WsRequest};

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Initialize the TLS crypto provider.
/// Must be called before any WebSocket connections are made.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
