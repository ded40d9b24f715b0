//! Periodic statistics summary.
//!
//! Reads the pipeline counters and writes an operator-readable summary to
//! the log at a fixed interval, with both lifetime totals and the delta
//! since the previous report.

use crate::metrics::{
    DECODE_ERRORS_TOTAL, FLUSH_FAILURE_TOTAL, FLUSH_TOTAL, PUBLISH_FAILURE_TOTAL,
    RECORDS_DROPPED_TOTAL, RECORDS_INGESTED_TOTAL, WS_RECONNECT_TOTAL,
};
use chrono::{DateTime, Utc};
use hldc_core::RecordKind;
use prometheus::core::Collector;
use std::collections::HashMap;
use tracing::info;

/// Point-in-time view of the pipeline counters.
#[derive(Debug, Clone, Default)]
pub struct StatsSnapshot {
    pub ingested: HashMap<RecordKind, u64>,
    pub dropped: HashMap<RecordKind, u64>,
    pub decode_errors: u64,
    pub reconnects: u64,
    pub flushes: u64,
    pub flush_failures: u64,
    pub publish_failures: u64,
}

impl StatsSnapshot {
    pub fn total_ingested(&self) -> u64 {
        self.ingested.values().sum()
    }
}

/// Statistics reporter for the periodic summary log line.
pub struct StatsReporter {
    coin: String,
    start_time: DateTime<Utc>,
    previous: StatsSnapshot,
}

impl StatsReporter {
    pub fn new(coin: &str) -> Self {
        Self {
            coin: coin.to_string(),
            start_time: Utc::now(),
            previous: StatsSnapshot::default(),
        }
    }

    /// Read the current counter values.
    pub fn snapshot(&self) -> StatsSnapshot {
        let mut ingested = HashMap::new();
        let mut dropped = HashMap::new();

        for kind in RecordKind::ALL {
            let label = kind.file_stem();
            ingested.insert(
                kind,
                RECORDS_INGESTED_TOTAL.with_label_values(&[label]).get() as u64,
            );
            dropped.insert(kind, sum_counter_for_label(&RECORDS_DROPPED_TOTAL, label));
        }

        StatsSnapshot {
            ingested,
            dropped,
            decode_errors: sum_counter(&DECODE_ERRORS_TOTAL),
            reconnects: sum_counter(&WS_RECONNECT_TOTAL),
            flushes: FLUSH_TOTAL.get() as u64,
            flush_failures: FLUSH_FAILURE_TOTAL.get() as u64,
            publish_failures: PUBLISH_FAILURE_TOTAL.get() as u64,
        }
    }

    /// Write the interval summary to the log and roll the baseline.
    pub fn report(&mut self) {
        let current = self.snapshot();
        let uptime = Utc::now() - self.start_time;
        let hours = uptime.num_hours();
        let minutes = uptime.num_minutes() % 60;

        info!(
            coin = %self.coin,
            uptime = format!("{hours}h{minutes:02}m"),
            "Statistics summary"
        );

        for kind in RecordKind::ALL {
            let total = current.ingested.get(&kind).copied().unwrap_or(0);
            let prev = self.previous.ingested.get(&kind).copied().unwrap_or(0);
            let dropped = current.dropped.get(&kind).copied().unwrap_or(0);
            info!(
                kind = %kind,
                total,
                interval = total.saturating_sub(prev),
                dropped,
                "Record counts"
            );
        }

        info!(
            decode_errors = current.decode_errors,
            reconnects = current.reconnects,
            flushes = current.flushes,
            flush_failures = current.flush_failures,
            publish_failures = current.publish_failures,
            "Pipeline health"
        );

        self.previous = current;
    }
}

/// Sum a counter vec across all label combinations.
fn sum_counter(counter: &prometheus::CounterVec) -> u64 {
    counter
        .collect()
        .iter()
        .flat_map(|mf| mf.get_metric())
        .map(|m| m.get_counter().get_value() as u64)
        .sum()
}

/// Sum a counter vec across combinations whose first label matches.
fn sum_counter_for_label(counter: &prometheus::CounterVec, first_label: &str) -> u64 {
    counter
        .collect()
        .iter()
        .flat_map(|mf| mf.get_metric())
        .filter(|m| {
            m.get_label()
                .first()
                .map(|p| p.get_value() == first_label)
                .unwrap_or(false)
        })
        .map(|m| m.get_counter().get_value() as u64)
        .sum()
}
