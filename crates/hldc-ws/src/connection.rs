//! WebSocket connection manager.
//!
//! Handles the connection lifecycle, automatic reconnection with capped
//! exponential backoff, and subscription replay after reconnection. All
//! transport outcomes surface as `WsEvent`s on a bounded channel; the
//! consumer side of that channel is the intake backpressure point.

use crate::error::{WsError, WsResult};
use crate::heartbeat::HeartbeatManager;
use crate::message::{subscription_ack_type, ChannelMessage, WsRequest};
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async_tls_with_config, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Subscription channels on the exchange feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Trades,
    L2Book,
    ActiveAssetCtx,
}

impl Channel {
    /// Wire name of the subscription type.
    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::Trades => "trades",
            Self::L2Book => "l2Book",
            Self::ActiveAssetCtx => "activeAssetCtx",
        }
    }

    /// Build the subscription payload for a coin.
    pub fn subscription(&self, coin: &str) -> serde_json::Value {
        serde_json::json!({
            "type": self.wire_name(),
            "coin": coin,
        })
    }
}

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// WebSocket URL.
    pub url: String,
    /// Coin symbol to subscribe for (e.g. "BTC").
    pub coin: String,
    /// Channels to subscribe to.
    pub channels: Vec<Channel>,
    /// Maximum reconnection attempts (0 = infinite).
    pub max_reconnect_attempts: u32,
    /// Base delay for exponential backoff.
    pub reconnect_base_delay_ms: u64,
    /// Maximum delay for exponential backoff.
    pub reconnect_max_delay_ms: u64,
    /// Heartbeat interval.
    pub heartbeat_interval_ms: u64,
    /// Heartbeat timeout (pong must arrive within this).
    pub heartbeat_timeout_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            coin: "BTC".to_string(),
            channels: vec![Channel::Trades, Channel::L2Book, Channel::ActiveAssetCtx],
            max_reconnect_attempts: 0, // Infinite
            reconnect_base_delay_ms: 1000,
            reconnect_max_delay_ms: 60000,
            heartbeat_interval_ms: 30000,
            heartbeat_timeout_ms: 10000,
        }
    }
}

/// Transport-level connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Transport events delivered to the coordinator.
///
/// Ordering on the channel is delivery order; a `Disconnected` event is
/// always emitted between the payloads of two distinct connections, so the
/// consumer can treat the next book payload as a fresh snapshot.
#[derive(Debug, Clone)]
pub enum WsEvent {
    /// TCP/TLS handshake completed, subscriptions about to be sent.
    Connected,
    /// Every configured channel has been acknowledged.
    Subscribed,
    /// A data payload on a subscribed channel.
    Payload(ChannelMessage),
    /// The connection dropped; the manager will back off and retry.
    Disconnected { reason: String },
    /// Backoff elapsed, a new dial attempt is starting.
    Reconnecting { attempt: u32 },
}

/// WebSocket connection manager.
pub struct ConnectionManager {
    config: ConnectionConfig,
    state: Arc<RwLock<TransportState>>,
    heartbeat: HeartbeatManager,
    event_tx: mpsc::Sender<WsEvent>,
    reconnect_count: RwLock<u32>,
    shutdown_token: CancellationToken,
}

impl ConnectionManager {
    /// Create a new connection manager.
    pub fn new(config: ConnectionConfig, event_tx: mpsc::Sender<WsEvent>) -> Self {
        let heartbeat =
            HeartbeatManager::new(config.heartbeat_interval_ms, config.heartbeat_timeout_ms);
        Self {
            config,
            state: Arc::new(RwLock::new(TransportState::Disconnected)),
            heartbeat,
            event_tx,
            reconnect_count: RwLock::new(0),
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Get current transport state.
    pub fn state(&self) -> TransportState {
        *self.state.read()
    }

    /// Number of reconnection attempts since the last successful connect.
    pub fn reconnect_count(&self) -> u32 {
        *self.reconnect_count.read()
    }

    /// Signal graceful shutdown. The connect loop exits at its next
    /// suspension point.
    pub fn shutdown(&self) {
        info!("ConnectionManager shutdown requested");
        self.shutdown_token.cancel();
    }

    /// Check if shutdown has been requested.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    /// Connect and run the receive loop, reconnecting on failure until
    /// shutdown or the attempt limit is reached.
    pub async fn connect(&self) -> WsResult<()> {
        let mut attempt = 0u32;

        loop {
            if self.is_shutdown() {
                info!("Shutdown requested, exiting connect loop");
                *self.state.write() = TransportState::Disconnected;
                return Ok(());
            }

            *self.state.write() = TransportState::Connecting;

            let reason = match self.try_connect().await {
                Ok(()) => {
                    info!("WebSocket connection closed");
                    "closed".to_string()
                }
                Err(e) => {
                    error!(?e, "WebSocket connection error");
                    e.to_string()
                }
            };

            // The consumer must learn about every drop, even during shutdown.
            if self
                .event_tx
                .send(WsEvent::Disconnected {
                    reason: reason.clone(),
                })
                .await
                .is_err()
            {
                warn!("Event receiver dropped, stopping transport");
                *self.state.write() = TransportState::Disconnected;
                return Err(WsError::ReceiverDropped);
            }

            if self.is_shutdown() {
                info!("Shutdown requested after disconnect, not reconnecting");
                *self.state.write() = TransportState::Disconnected;
                return Ok(());
            }

            attempt += 1;
            *self.reconnect_count.write() = attempt;

            if self.config.max_reconnect_attempts > 0
                && attempt >= self.config.max_reconnect_attempts
            {
                error!(attempt, "Max reconnection attempts reached");
                return Err(WsError::ConnectionFailed(
                    "Max reconnection attempts reached".to_string(),
                ));
            }

            *self.state.write() = TransportState::Reconnecting;

            let delay = self.calculate_backoff_delay(attempt);
            warn!(attempt, delay_ms = delay.as_millis(), reason = %reason, "Reconnecting");

            // Cancellation-aware backoff sleep
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = self.shutdown_token.cancelled() => {
                    info!("Shutdown requested during backoff, exiting");
                    *self.state.write() = TransportState::Disconnected;
                    return Ok(());
                }
            }

            if self
                .event_tx
                .send(WsEvent::Reconnecting { attempt })
                .await
                .is_err()
            {
                warn!("Event receiver dropped, stopping transport");
                *self.state.write() = TransportState::Disconnected;
                return Err(WsError::ReceiverDropped);
            }
        }
    }

    async fn try_connect(&self) -> WsResult<()> {
        info!(url = %self.config.url, "Connecting to WebSocket");

        let (ws_stream, _response) =
            connect_async_tls_with_config(&self.config.url, None, true, None).await?;
        let (mut write, mut read) = ws_stream.split();

        *self.state.write() = TransportState::Connected;
        *self.reconnect_count.write() = 0;
        info!("WebSocket connected");

        if self.event_tx.send(WsEvent::Connected).await.is_err() {
            return Err(WsError::ReceiverDropped);
        }

        // No state survives a reconnect: send the full channel set every time.
        let mut pending_acks: HashSet<&'static str> = HashSet::new();
        for channel in &self.config.channels {
            let request = WsRequest::subscribe(channel.subscription(&self.config.coin));
            let text = serde_json::to_string(&request)?;
            write.send(Message::Text(text)).await?;
            pending_acks.insert(channel.wire_name());
            debug!(channel = channel.wire_name(), coin = %self.config.coin, "Subscription sent");
        }

        self.heartbeat.reset();

        // Receive loop
        loop {
            tokio::select! {
                () = self.shutdown_token.cancelled() => {
                    info!("Shutdown signal received in receive loop");
                    if let Err(e) = write.send(Message::Close(None)).await {
                        warn!(?e, "Failed to send Close frame during shutdown");
                    }
                    *self.state.write() = TransportState::Disconnected;
                    return Ok(());
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.handle_text_message(&text, &mut pending_acks).await?;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Pong(_))) => {
                            self.heartbeat.record_pong();
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|f| (f.code.into(), f.reason.to_string()))
                                .unwrap_or((1000, "Normal close".to_string()));
                            warn!(code, %reason, "WebSocket closed by server");
                            return Err(WsError::ConnectionClosed { code, reason });
                        }
                        Some(Err(e)) => {
                            error!(?e, "WebSocket read error");
                            return Err(e.into());
                        }
                        None => {
                            warn!("WebSocket stream ended");
                            return Ok(());
                        }
                        _ => {}
                    }
                }

                _ = self.heartbeat.wait_for_check() => {
                    if self.heartbeat.is_timed_out() {
                        error!("Heartbeat timeout");
                        return Err(WsError::HeartbeatTimeout);
                    }

                    if self.heartbeat.should_send_heartbeat() {
                        let text = serde_json::to_string(&WsRequest::ping())?;
                        write.send(Message::Text(text)).await?;
                        self.heartbeat.record_ping();
                        debug!("Sent heartbeat ping");
                    }
                }
            }
        }
    }

    async fn handle_text_message(
        &self,
        text: &str,
        pending_acks: &mut HashSet<&'static str>,
    ) -> WsResult<()> {
        self.heartbeat.record_message();

        let msg: ChannelMessage = match serde_json::from_str(text) {
            Ok(msg) => msg,
            Err(e) => {
                // A frame we cannot even frame-decode is not a data loss;
                // payload-level decode errors are handled downstream.
                warn!(?e, "Unparseable WebSocket frame");
                return Ok(());
            }
        };

        if msg.is_pong() {
            self.heartbeat.record_pong();
            return Ok(());
        }

        if msg.channel == "subscriptionResponse" {
            if let Some(kind) = subscription_ack_type(&msg.data) {
                let was_pending = pending_acks.remove(kind);
                debug!(channel = kind, was_pending, "Subscription acknowledged");
                if was_pending && pending_acks.is_empty() {
                    if self.event_tx.send(WsEvent::Subscribed).await.is_err() {
                        return Err(WsError::ReceiverDropped);
                    }
                }
            }
            return Ok(());
        }

        if msg.channel == "error" {
            // Subscription rejection or server-side complaint. Fatal for the
            // affected channel until the next reconnect replays it.
            warn!(data = ?msg.data, "Error channel message");
            return Err(WsError::SubscriptionRejected(msg.data.to_string()));
        }

        // Bounded send: suspends the receive loop while the coordinator is
        // backpressured, instead of dropping the payload.
        if self.event_tx.send(WsEvent::Payload(msg)).await.is_err() {
            warn!("Event receiver dropped");
            return Err(WsError::ReceiverDropped);
        }

        Ok(())
    }

    fn calculate_backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.config.reconnect_base_delay_ms;
        let max = self.config.reconnect_max_delay_ms;

        // Exponential backoff: base * 2^(attempt-1), capped at max
        let exponent = attempt.saturating_sub(1).min(10);
        let delay = base.saturating_mul(1u64 << exponent);
        let delay = delay.min(max);

        // Add jitter (0-1000ms)
        Duration::from_millis(delay + rand_jitter())
    }
}

/// Generate random jitter (0-1000ms).
fn rand_jitter() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    (nanos % 1000) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager_with(config: ConnectionConfig) -> ConnectionManager {
        let (tx, _rx) = mpsc::channel(16);
        ConnectionManager::new(config, tx)
    }

    #[test]
    fn test_default_config() {
        let config = ConnectionConfig::default();
        assert_eq!(config.max_reconnect_attempts, 0); // Infinite
        assert_eq!(config.channels.len(), 3);
    }

    #[test]
    fn test_channel_subscription_payload() {
        let payload = Channel::L2Book.subscription("BTC");
        assert_eq!(payload["type"], "l2Book");
        assert_eq!(payload["coin"], "BTC");
    }

    #[test]
    fn test_backoff_is_capped() {
        let manager = manager_with(ConnectionConfig {
            reconnect_base_delay_ms: 1000,
            reconnect_max_delay_ms: 8000,
            ..Default::default()
        });

        // attempt 1 -> base, attempt 10 -> capped at max (+ up to 1s jitter)
        assert!(manager.calculate_backoff_delay(1) < Duration::from_millis(2001));
        let capped = manager.calculate_backoff_delay(10);
        assert!(capped >= Duration::from_millis(8000));
        assert!(capped < Duration::from_millis(9001));
    }

    #[test]
    fn test_shutdown_flag() {
        let manager = manager_with(ConnectionConfig::default());
        assert!(!manager.is_shutdown());
        manager.shutdown();
        assert!(manager.is_shutdown());
    }
}
