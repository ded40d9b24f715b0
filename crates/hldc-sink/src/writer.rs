//! Per-kind CSV append writers.
//!
//! One growing file per record kind with a fixed column schema; files are
//! opened in append mode and the header row is written only when a file is
//! created, so the schema is stable across restarts. Append-only growth
//! keeps interrupted writes recoverable: a torn tail line affects only
//! itself.

use crate::error::SinkResult;
use chrono::{DateTime, Utc};
use hldc_core::{Record, RecordKind};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Fixed column schemas, one per record kind.
const TRADES_COLUMNS: &[&str] = &[
    "timestamp", "coin", "side", "price", "size", "trade_id", "buyer", "seller", "hash",
    "crossed", "fee",
];
const ORDERBOOK_COLUMNS: &[&str] = &[
    "timestamp", "coin", "bids", "asks", "bid_price", "ask_price", "bid_size", "ask_size",
    "spread",
];
const FUNDING_RATE_COLUMNS: &[&str] = &[
    "timestamp", "coin", "funding_rate", "predicted_funding_rate", "next_funding_time",
    "mark_price", "index_price",
];
const OPEN_INTEREST_COLUMNS: &[&str] = &[
    "timestamp", "coin", "open_interest", "mark_price", "oracle_price",
];

fn columns_for(kind: RecordKind) -> &'static [&'static str] {
    match kind {
        RecordKind::Trades => TRADES_COLUMNS,
        RecordKind::OrderBook => ORDERBOOK_COLUMNS,
        RecordKind::FundingRate => FUNDING_RATE_COLUMNS,
        RecordKind::OpenInterest => OPEN_INTEREST_COLUMNS,
    }
}

/// Sink configuration.
#[derive(Debug, Clone)]
pub struct SinkConfig {
    /// Per-kind buffer size that triggers an inline flush.
    pub flush_threshold: usize,
    /// Per-kind buffer size that signals backpressure upstream. Reached
    /// only while flushing keeps failing; must be >= flush_threshold.
    pub watermark: usize,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            flush_threshold: 100,
            watermark: 1000,
        }
    }
}

/// A completed flush, handed to the publish collaborator.
#[derive(Debug, Clone)]
pub struct SegmentReady {
    pub kind: RecordKind,
    /// File name plus flush ordinal, e.g. "btc_trades.csv#3".
    pub segment_id: String,
    pub path: PathBuf,
}

/// Open writer state for one record kind.
struct KindWriter {
    writer: csv::Writer<File>,
    path: PathBuf,
    records_written: u64,
}

/// Buffered, append-only CSV sink with one file per record kind.
pub struct CsvSink {
    data_dir: PathBuf,
    coin: String,
    config: SinkConfig,
    buffers: HashMap<RecordKind, Vec<Record>>,
    writers: HashMap<RecordKind, KindWriter>,
    flush_ordinals: HashMap<RecordKind, u64>,
    last_flush: Option<DateTime<Utc>>,
}

impl CsvSink {
    /// Create a new sink rooted at `data_dir`. The directory is created if
    /// missing; files are opened lazily on first flush.
    pub fn new(data_dir: impl AsRef<Path>, coin: &str, config: SinkConfig) -> Self {
        let data_dir = data_dir.as_ref().to_path_buf();
        if let Err(e) = std::fs::create_dir_all(&data_dir) {
            warn!(?e, dir = %data_dir.display(), "Failed to create data directory");
        }

        Self {
            data_dir,
            coin: coin.to_lowercase(),
            config,
            buffers: HashMap::new(),
            writers: HashMap::new(),
            flush_ordinals: HashMap::new(),
            last_flush: None,
        }
    }

    /// Append a record to its kind buffer, flushing inline when the buffer
    /// reaches the threshold.
    ///
    /// On success the record is either durably written or held in a buffer
    /// whose staleness is bounded by the external flush timer. A flush
    /// failure leaves the buffer intact (no loss) and is surfaced so the
    /// caller can pause intake.
    pub fn append(&mut self, record: Record) -> SinkResult<Option<SegmentReady>> {
        let kind = record.kind();
        let buffer = self.buffers.entry(kind).or_default();
        buffer.push(record);

        if buffer.len() >= self.config.flush_threshold {
            return self.flush_kind(kind);
        }

        Ok(None)
    }

    /// Whether any kind buffer has reached the backpressure watermark.
    pub fn is_backlogged(&self) -> bool {
        self.buffers
            .values()
            .any(|b| b.len() >= self.config.watermark)
    }

    /// Number of buffered (unflushed) records for a kind.
    pub fn buffered(&self, kind: RecordKind) -> usize {
        self.buffers.get(&kind).map(Vec::len).unwrap_or(0)
    }

    /// Time of the last successful flush, if any.
    pub fn last_flush(&self) -> Option<DateTime<Utc>> {
        self.last_flush
    }

    /// Flush every kind buffer. Time-based trigger, driven by the
    /// coordinator's flush timer and the shutdown drain.
    pub fn flush_all(&mut self) -> SinkResult<Vec<SegmentReady>> {
        let mut segments = Vec::new();
        for kind in RecordKind::ALL {
            if let Some(segment) = self.flush_kind(kind)? {
                segments.push(segment);
            }
        }
        Ok(segments)
    }

    /// Flush one kind buffer to its file.
    fn flush_kind(&mut self, kind: RecordKind) -> SinkResult<Option<SegmentReady>> {
        if self.buffers.get(&kind).map(Vec::is_empty).unwrap_or(true) {
            return Ok(None);
        }

        if !self.writers.contains_key(&kind) {
            let writer = self.open_writer(kind)?;
            self.writers.insert(kind, writer);
        }
        let (Some(buffer), Some(active)) =
            (self.buffers.get_mut(&kind), self.writers.get_mut(&kind))
        else {
            return Ok(None);
        };

        // Rows are written straight from the buffer; the buffer is only
        // cleared after the file flush succeeds, so a failed flush keeps
        // every record for retry (duplicates on retry are append-safe).
        for record in buffer.iter() {
            active.writer.write_record(encode_row(record))?;
        }
        active.writer.flush()?;
        let record_count = buffer.len();
        active.records_written += record_count as u64;
        buffer.clear();
        let path = active.path.clone();

        self.last_flush = Some(Utc::now());
        let ordinal = self.flush_ordinals.entry(kind).or_insert(0);
        *ordinal += 1;

        let segment_id = format!(
            "{}#{}",
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| kind.to_string()),
            ordinal
        );

        debug!(kind = %kind, records = record_count, segment = %segment_id, "Flushed records");

        Ok(Some(SegmentReady {
            kind,
            segment_id,
            path,
        }))
    }

    fn open_writer(&self, kind: RecordKind) -> SinkResult<KindWriter> {
        let path = self
            .data_dir
            .join(format!("{}_{}.csv", self.coin, kind.file_stem()));

        let is_new = !path.exists() || std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0) == 0;

        info!(path = %path.display(), is_new, "Opening CSV writer (append mode)");

        // Append mode - never truncates existing data
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        // Header only when the file is created; schema is stable across restarts
        if is_new {
            writer.write_record(columns_for(kind))?;
            writer.flush()?;
        }

        Ok(KindWriter {
            writer,
            path,
            records_written: 0,
        })
    }

    /// Flush pending buffers and release the writers.
    pub fn close(&mut self) -> SinkResult<Vec<SegmentReady>> {
        let segments = self.flush_all()?;
        for (kind, active) in self.writers.drain() {
            info!(kind = %kind, records = active.records_written, "Closed CSV writer");
        }
        Ok(segments)
    }
}

impl Drop for CsvSink {
    fn drop(&mut self) {
        if let Err(e) = self.flush_all() {
            warn!(?e, "Failed to flush buffers on drop");
        }
    }
}

/// Encode one record as its fixed-schema CSV row.
fn encode_row(record: &Record) -> Vec<String> {
    match record {
        Record::Trade(t) => vec![
            t.timestamp.to_rfc3339(),
            t.coin.clone(),
            t.side.to_string(),
            t.price.to_string(),
            t.size.to_string(),
            t.trade_id.to_string(),
            t.buyer.clone(),
            t.seller.clone(),
            t.hash.clone(),
            t.crossed.to_string(),
            t.fee.map(|f| f.to_string()).unwrap_or_default(),
        ],
        Record::Book(b) => {
            let bids = serde_json::to_string(&b.bids).unwrap_or_default();
            let asks = serde_json::to_string(&b.asks).unwrap_or_default();
            vec![
                b.timestamp.to_rfc3339(),
                b.coin.clone(),
                bids,
                asks,
                b.best_bid().map(|l| l.price.to_string()).unwrap_or_default(),
                b.best_ask().map(|l| l.price.to_string()).unwrap_or_default(),
                b.best_bid().map(|l| l.size.to_string()).unwrap_or_default(),
                b.best_ask().map(|l| l.size.to_string()).unwrap_or_default(),
                b.spread().map(|s| s.to_string()).unwrap_or_default(),
            ]
        }
        Record::Funding(f) => vec![
            f.timestamp.to_rfc3339(),
            f.coin.clone(),
            f.funding_rate.to_string(),
            f.predicted_funding_rate
                .map(|p| p.to_string())
                .unwrap_or_default(),
            f.next_funding_time
                .map(|t| t.to_rfc3339())
                .unwrap_or_default(),
            f.mark_price.to_string(),
            f.index_price.to_string(),
        ],
        Record::OpenInterest(o) => vec![
            o.timestamp.to_rfc3339(),
            o.coin.clone(),
            o.open_interest.to_string(),
            o.mark_price.to_string(),
            o.oracle_price.to_string(),
        ],
    }
}
