//! Prometheus metrics for the ingestion pipeline.
//!
//! Covers record flow (ingested/dropped per kind), decode failures,
//! transport health and sink activity.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. A registration
//! failure means a duplicate metric name, a fatal configuration error
//! that should crash at startup rather than fail silently. These panics
//! only occur during static initialization, never at runtime.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_gauge_vec, Counter,
    CounterVec, Gauge, GaugeVec,
};

/// WebSocket connection state (1 = connected, 0 = disconnected).
pub static WS_CONNECTED: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "hldc_ws_connected",
        "WebSocket connection state (1=connected)"
    )
    .unwrap()
});

/// Ingestion state machine current state.
/// Labels: state (disconnected/connecting/subscribing/streaming/degraded/shutting_down)
pub static INGEST_STATE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "hldc_ingest_state",
        "Ingestion state machine current state (1=active, 0=inactive)",
        &["state"]
    )
    .unwrap()
});

/// Total WebSocket reconnection attempts.
pub static WS_RECONNECT_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "hldc_ws_reconnect_total",
        "Total WebSocket reconnection attempts",
        &["reason"]
    )
    .unwrap()
});

/// Records accepted into the pipeline.
pub static RECORDS_INGESTED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "hldc_records_ingested_total",
        "Total records accepted into the pipeline",
        &["kind"]
    )
    .unwrap()
});

/// Records dropped before reaching the sink.
/// Labels: kind, reason (duplicate/backpressure/shutdown)
pub static RECORDS_DROPPED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "hldc_records_dropped_total",
        "Total records dropped before the sink",
        &["kind", "reason"]
    )
    .unwrap()
});

/// Inbound messages that failed to decode.
pub static DECODE_ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "hldc_decode_errors_total",
        "Total inbound messages that failed to decode",
        &["channel"]
    )
    .unwrap()
});

/// Poll cycles that ended in error.
pub static POLL_ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "hldc_poll_errors_total",
        "Total poll cycles that ended in error",
        &["endpoint"]
    )
    .unwrap()
});

/// Completed sink flushes.
pub static FLUSH_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!("hldc_flush_total", "Total completed sink flushes").unwrap()
});

/// Failed sink flushes.
pub static FLUSH_FAILURE_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!("hldc_flush_failure_total", "Total failed sink flushes").unwrap()
});

/// Failed segment publishes.
pub static PUBLISH_FAILURE_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "hldc_publish_failure_total",
        "Total failed segment publishes"
    )
    .unwrap()
});

/// Metrics facade for easy access.
pub struct Metrics;

impl Metrics {
    pub fn ws_connected() {
        WS_CONNECTED.set(1.0);
    }

    pub fn ws_disconnected() {
        WS_CONNECTED.set(0.0);
    }

    /// Set the state machine gauge. Only the active state is 1.
    pub fn ingest_state_set(state: &str) {
        for s in &[
            "disconnected",
            "connecting",
            "subscribing",
            "streaming",
            "degraded",
            "shutting_down",
        ] {
            INGEST_STATE.with_label_values(&[s]).set(0.0);
        }
        INGEST_STATE.with_label_values(&[state]).set(1.0);
    }

    pub fn ws_reconnect(reason: &str) {
        WS_RECONNECT_TOTAL.with_label_values(&[reason]).inc();
    }

    pub fn record_ingested(kind: &str) {
        RECORDS_INGESTED_TOTAL.with_label_values(&[kind]).inc();
    }

    pub fn record_dropped(kind: &str, reason: &str) {
        RECORDS_DROPPED_TOTAL
            .with_label_values(&[kind, reason])
            .inc();
    }

    pub fn decode_error(channel: &str) {
        DECODE_ERRORS_TOTAL.with_label_values(&[channel]).inc();
    }

    pub fn poll_error(endpoint: &str) {
        POLL_ERRORS_TOTAL.with_label_values(&[endpoint]).inc();
    }

    pub fn flush_completed() {
        FLUSH_TOTAL.inc();
    }

    pub fn flush_failed() {
        FLUSH_FAILURE_TOTAL.inc();
    }

    pub fn publish_failed() {
        PUBLISH_FAILURE_TOTAL.inc();
    }
}
