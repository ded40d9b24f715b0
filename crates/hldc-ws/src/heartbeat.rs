//! Connection liveness tracking.
//!
//! The exchange answers application-level pings with pongs. A pong that
//! never arrives within the timeout means the connection is dead even when
//! the socket still looks open, and the read loop must reconnect.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::time::Duration;
use tracing::debug;

pub struct HeartbeatManager {
    interval_ms: u64,
    timeout_ms: u64,
    /// When the outstanding ping went out, if one is in flight.
    last_ping: RwLock<Option<DateTime<Utc>>>,
    /// Receipt time of the most recent frame of any kind.
    last_message: RwLock<DateTime<Utc>>,
    waiting_for_pong: RwLock<bool>,
}

impl HeartbeatManager {
    pub fn new(interval_ms: u64, timeout_ms: u64) -> Self {
        Self {
            interval_ms,
            timeout_ms,
            last_ping: RwLock::new(None),
            last_message: RwLock::new(Utc::now()),
            waiting_for_pong: RwLock::new(false),
        }
    }

    /// Clear all tracking state. Called on every (re)connect so a stale
    /// in-flight ping from the previous socket cannot trip the timeout.
    pub fn reset(&self) {
        *self.last_ping.write() = None;
        *self.last_message.write() = Utc::now();
        *self.waiting_for_pong.write() = false;
    }

    pub fn record_ping(&self) {
        *self.last_ping.write() = Some(Utc::now());
        *self.waiting_for_pong.write() = true;
    }

    pub fn record_pong(&self) {
        let now = Utc::now();
        *self.waiting_for_pong.write() = false;

        if let Some(sent) = *self.last_ping.read() {
            debug!(rtt_ms = (now - sent).num_milliseconds(), "Received pong");
        }
    }

    /// Any inbound frame counts as liveness, not just pongs.
    pub fn record_message(&self) {
        *self.last_message.write() = Utc::now();
    }

    /// True when a ping has gone unanswered past the timeout.
    pub fn is_timed_out(&self) -> bool {
        if !*self.waiting_for_pong.read() {
            return false;
        }

        match *self.last_ping.read() {
            Some(sent) => (Utc::now() - sent).num_milliseconds() > self.timeout_ms as i64,
            None => false,
        }
    }

    pub fn time_since_last_message_ms(&self) -> i64 {
        (Utc::now() - *self.last_message.read()).num_milliseconds()
    }

    /// A ping goes out only when the line has been quiet for a full
    /// interval and no earlier ping is still awaiting its pong.
    pub fn should_send_heartbeat(&self) -> bool {
        !*self.waiting_for_pong.read()
            && self.time_since_last_message_ms() >= self.interval_ms as i64
    }

    /// Sleep until the next liveness check. Half the ping interval keeps
    /// the timeout detection latency bounded without busy-polling.
    pub async fn wait_for_check(&self) {
        tokio::time::sleep(Duration::from_millis(self.interval_ms / 2)).await;
    }
}
