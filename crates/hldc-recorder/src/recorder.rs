//! Ingestion coordinator.
//!
//! Owns the pipeline state machine and the single merge point where stream
//! payloads and poll records meet the sink. The transport and poll tasks
//! only produce onto bounded channels; every decode, dedupe and write
//! decision happens here, on one task, so no record path races another.

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use chrono::{DateTime, Utc};
use hldc_core::{FundingRate, OpenInterest, Record, RecordKind};
use hldc_rest::{InfoClient, RetryPolicy};
use hldc_sink::{run_publish_loop, CsvSink, NullPublisher, SegmentReady};
use hldc_telemetry::{Metrics, StatsReporter};
use hldc_ws::{ChannelMessage, ConnectionManager, WsEvent};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Bounded queue sizes. The transport queue is the backpressure point:
/// when it fills, the WebSocket receive loop suspends instead of dropping.
const WS_EVENT_QUEUE: usize = 256;
const POLL_QUEUE: usize = 64;
const SEGMENT_QUEUE: usize = 64;

/// How long the shutdown drain waits for in-flight events.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Flush retry backoff while degraded.
const RECOVER_BASE_DELAY: Duration = Duration::from_millis(500);
const RECOVER_MAX_DELAY: Duration = Duration::from_secs(10);

/// Pipeline state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestState {
    /// No transport activity yet.
    Disconnected,
    /// Transport is dialing (or backing off between attempts).
    Connecting,
    /// Connected, waiting for every subscription acknowledgement.
    Subscribing,
    /// All channels live, records flowing.
    Streaming,
    /// Stream down, transport backing off; poll records still flow.
    Degraded,
    /// Drain in progress, no new intake.
    ShuttingDown,
}

impl IngestState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Subscribing => "subscribing",
            Self::Streaming => "streaming",
            Self::Degraded => "degraded",
            Self::ShuttingDown => "shutting_down",
        }
    }
}

impl std::fmt::Display for IngestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of the pipeline, for operators and tests.
#[derive(Debug, Clone)]
pub struct RecorderStatus {
    pub state: IngestState,
    pub ingested: HashMap<RecordKind, u64>,
    pub dropped: HashMap<RecordKind, u64>,
    pub last_flush: Option<DateTime<Utc>>,
}

/// The ingestion coordinator.
pub struct Recorder {
    config: AppConfig,
    state: IngestState,
    sink: CsvSink,
    stats: StatsReporter,
    ingested: HashMap<RecordKind, u64>,
    dropped: HashMap<RecordKind, u64>,
    /// Dedupe key of the last accepted poll-sourced funding record.
    last_funding: Option<(DateTime<Utc>, Decimal)>,
}

impl Recorder {
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let sink = CsvSink::new(&config.sink.data_dir, &config.coin, config.sink_config());
        let stats = StatsReporter::new(&config.coin);

        Ok(Self {
            config,
            state: IngestState::Disconnected,
            sink,
            stats,
            ingested: HashMap::new(),
            dropped: HashMap::new(),
            last_funding: None,
        })
    }

    /// Current pipeline status.
    pub fn status(&self) -> RecorderStatus {
        RecorderStatus {
            state: self.state,
            ingested: self.ingested.clone(),
            dropped: self.dropped.clone(),
            last_flush: self.sink.last_flush(),
        }
    }

    /// Run the pipeline until `shutdown` is cancelled.
    pub async fn run(mut self, shutdown: CancellationToken) -> AppResult<()> {
        let (ws_tx, mut ws_rx) = mpsc::channel(WS_EVENT_QUEUE);
        let manager = Arc::new(ConnectionManager::new(self.config.connection_config(), ws_tx));

        let transport = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move {
                if let Err(e) = manager.connect().await {
                    error!(?e, "Transport exited with error");
                }
            })
        };

        let (segment_tx, segment_rx) = mpsc::channel(SEGMENT_QUEUE);
        let publish_token = CancellationToken::new();
        let publisher = tokio::spawn(run_publish_loop(
            segment_rx,
            NullPublisher,
            publish_token.clone(),
        ));

        let (poll_tx, mut poll_rx) = mpsc::channel(POLL_QUEUE);
        let client = Arc::new(InfoClient::new(self.config.resolved_info_url())?);
        let funding_poll = tokio::spawn(funding_poll_loop(
            Arc::clone(&client),
            self.config.coin.clone(),
            Duration::from_secs(self.config.poll.funding_interval_secs.max(1)),
            self.config.retry_policy(),
            poll_tx.clone(),
            shutdown.clone(),
        ));
        let oi_poll = tokio::spawn(open_interest_poll_loop(
            client,
            self.config.coin.clone(),
            Duration::from_secs(self.config.poll.open_interest_interval_secs.max(1)),
            self.config.retry_policy(),
            poll_tx,
            shutdown.clone(),
        ));

        let mut flush_timer = tokio::time::interval(self.config.flush_interval());
        flush_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut stats_timer = tokio::time::interval(self.config.stats_interval());
        stats_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick of an interval completes immediately
        flush_timer.tick().await;
        stats_timer.tick().await;

        self.set_state(IngestState::Connecting);
        let mut poll_open = true;

        loop {
            tokio::select! {
                // Stream events are drained before poll records: on a tied
                // timestamp the trade or book update reaches the sink first
                biased;

                () = shutdown.cancelled() => {
                    info!("Shutdown requested");
                    break;
                }

                maybe = ws_rx.recv() => match maybe {
                    Some(event) => self.handle_ws_event(event, &segment_tx, &shutdown).await?,
                    None => {
                        warn!("Transport event channel closed");
                        break;
                    }
                },

                maybe = poll_rx.recv(), if poll_open => match maybe {
                    Some(record) => self.ingest(record, &segment_tx, &shutdown).await?,
                    None => poll_open = false,
                },

                _ = flush_timer.tick() => {
                    self.flush(&segment_tx, &shutdown).await?;
                }

                _ = stats_timer.tick() => {
                    self.stats.report();
                }
            }
        }

        self.set_state(IngestState::ShuttingDown);
        manager.shutdown();

        // Drain in-flight events with a bounded deadline, then flush
        let deadline = Instant::now() + DRAIN_TIMEOUT;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!("Drain deadline reached with events still pending");
                break;
            }
            match tokio::time::timeout(remaining, ws_rx.recv()).await {
                Ok(Some(WsEvent::Payload(msg))) => {
                    self.handle_payload(msg, &segment_tx, &shutdown).await?;
                }
                Ok(Some(_)) => {}
                Ok(None) | Err(_) => break,
            }
        }
        while let Ok(record) = poll_rx.try_recv() {
            self.ingest(record, &segment_tx, &shutdown).await?;
        }

        match self.sink.close() {
            Ok(segments) => {
                for segment in segments {
                    forward_segment(&segment_tx, segment);
                }
                Metrics::flush_completed();
            }
            Err(e) => {
                // Buffers survive in memory only; log loudly and move on
                error!(?e, "Final flush failed");
                Metrics::flush_failed();
            }
        }

        drop(segment_tx);
        publish_token.cancel();
        if let Ok(failures) = publisher.await {
            if failures > 0 {
                warn!(failures, "Segment publishes failed during this run");
            }
        }
        let _ = transport.await;
        let _ = funding_poll.await;
        let _ = oi_poll.await;

        self.stats.report();
        info!("Recorder stopped");
        Ok(())
    }

    async fn handle_ws_event(
        &mut self,
        event: WsEvent,
        segment_tx: &mpsc::Sender<SegmentReady>,
        shutdown: &CancellationToken,
    ) -> AppResult<()> {
        match event {
            WsEvent::Connected => {
                Metrics::ws_connected();
                self.set_state(IngestState::Subscribing);
            }
            WsEvent::Subscribed => {
                self.set_state(IngestState::Streaming);
            }
            WsEvent::Disconnected { reason } => {
                Metrics::ws_disconnected();
                let label = if reason == "closed" { "closed" } else { "error" };
                Metrics::ws_reconnect(label);
                warn!(%reason, "Stream disconnected, polls continue");
                if self.state != IngestState::ShuttingDown {
                    self.set_state(IngestState::Degraded);
                }
            }
            WsEvent::Reconnecting { attempt } => {
                debug!(attempt, "Stream retrying");
                if self.state != IngestState::ShuttingDown {
                    self.set_state(IngestState::Connecting);
                }
            }
            WsEvent::Payload(msg) => {
                self.handle_payload(msg, segment_tx, shutdown).await?;
            }
        }
        Ok(())
    }

    /// Decode one channel message and ingest the resulting records.
    ///
    /// Decode failures are counted and skipped; one malformed payload never
    /// interrupts the stream.
    async fn handle_payload(
        &mut self,
        msg: ChannelMessage,
        segment_tx: &mpsc::Sender<SegmentReady>,
        shutdown: &CancellationToken,
    ) -> AppResult<()> {
        match msg.channel.as_str() {
            "trades" => match hldc_feed::decode_trades(&msg.data) {
                Ok(trades) => {
                    for trade in trades {
                        self.ingest(Record::Trade(trade), segment_tx, shutdown).await?;
                    }
                }
                Err(e) => {
                    warn!(?e, "Failed to decode trades payload");
                    Metrics::decode_error("trades");
                }
            },
            "l2Book" => match hldc_feed::decode_l2_book(&msg.data) {
                Ok(snapshot) => {
                    self.ingest(Record::Book(snapshot), segment_tx, shutdown).await?;
                }
                Err(e) => {
                    warn!(?e, "Failed to decode l2Book payload");
                    Metrics::decode_error("l2Book");
                }
            },
            "activeAssetCtx" => match hldc_feed::decode_asset_ctx(&msg.data) {
                Ok((funding, oi)) => {
                    self.ingest(Record::Funding(funding), segment_tx, shutdown).await?;
                    self.ingest(Record::OpenInterest(oi), segment_tx, shutdown).await?;
                }
                Err(e) => {
                    warn!(?e, "Failed to decode activeAssetCtx payload");
                    Metrics::decode_error("activeAssetCtx");
                }
            },
            other => {
                debug!(channel = other, "Ignoring unsubscribed channel");
            }
        }
        Ok(())
    }

    /// Accept one record into the sink.
    async fn ingest(
        &mut self,
        record: Record,
        segment_tx: &mpsc::Sender<SegmentReady>,
        shutdown: &CancellationToken,
    ) -> AppResult<()> {
        if let Record::Funding(f) = &record {
            // Poll samples repeat the same (next_funding_time, rate) pair
            // between funding events; identical consecutive pairs add no
            // information. Stream samples carry no funding time and are
            // kept as-is, preserving their mark/index price cadence.
            if let Some(next) = f.next_funding_time {
                let key = (next, f.funding_rate);
                if self.last_funding == Some(key) {
                    *self.dropped.entry(RecordKind::FundingRate).or_insert(0) += 1;
                    Metrics::record_dropped(RecordKind::FundingRate.file_stem(), "duplicate");
                    return Ok(());
                }
                self.last_funding = Some(key);
            }
        }

        let kind = record.kind();
        *self.ingested.entry(kind).or_insert(0) += 1;
        Metrics::record_ingested(kind.file_stem());

        match self.sink.append(record) {
            Ok(Some(segment)) => {
                Metrics::flush_completed();
                forward_segment(segment_tx, segment);
            }
            Ok(None) => {
                if self.sink.is_backlogged() {
                    warn!("Sink backlog reached watermark, pausing intake");
                    self.recover(segment_tx, shutdown).await;
                }
            }
            Err(e) => {
                warn!(?e, "Sink append failed");
                Metrics::flush_failed();
                self.recover(segment_tx, shutdown).await;
            }
        }
        Ok(())
    }

    /// Timer-driven flush of every kind buffer.
    async fn flush(
        &mut self,
        segment_tx: &mpsc::Sender<SegmentReady>,
        shutdown: &CancellationToken,
    ) -> AppResult<()> {
        match self.sink.flush_all() {
            Ok(segments) => {
                if !segments.is_empty() {
                    Metrics::flush_completed();
                }
                for segment in segments {
                    forward_segment(segment_tx, segment);
                }
            }
            Err(e) => {
                warn!(?e, "Timed flush failed");
                Metrics::flush_failed();
                self.recover(segment_tx, shutdown).await;
            }
        }
        Ok(())
    }

    /// Intake pause: this task retries the flush with backoff and does
    /// nothing else, so the bounded transport queue fills and suspends the
    /// receive loop upstream. No record is dropped; intake resumes once a
    /// flush succeeds.
    async fn recover(
        &mut self,
        segment_tx: &mpsc::Sender<SegmentReady>,
        shutdown: &CancellationToken,
    ) {
        let mut delay = RECOVER_BASE_DELAY;

        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    // The shutdown drain makes the final flush attempt
                    return;
                }
                () = tokio::time::sleep(delay) => {}
            }

            match self.sink.flush_all() {
                Ok(segments) => {
                    info!("Flush recovered, resuming intake");
                    Metrics::flush_completed();
                    for segment in segments {
                        forward_segment(segment_tx, segment);
                    }
                    return;
                }
                Err(e) => {
                    warn!(?e, delay_ms = delay.as_millis(), "Flush retry failed");
                    Metrics::flush_failed();
                    delay = (delay * 2).min(RECOVER_MAX_DELAY);
                }
            }
        }
    }

    fn set_state(&mut self, next: IngestState) {
        if self.state != next {
            info!(from = %self.state, to = %next, "State transition");
            self.state = next;
            Metrics::ingest_state_set(next.as_str());
        }
    }
}

/// Hand a completed segment to the publish task without blocking. A full
/// publish queue means the publisher is far behind; dropping the event is
/// preferable to stalling ingestion, and the failure is counted.
fn forward_segment(segment_tx: &mpsc::Sender<SegmentReady>, segment: SegmentReady) {
    if let Err(e) = segment_tx.try_send(segment) {
        warn!(?e, "Publish queue rejected segment");
        Metrics::publish_failed();
    }
}

/// Poll the funding rate on a fixed interval, enriched with the predicted
/// rate and next funding time when available.
async fn funding_poll_loop(
    client: Arc<InfoClient>,
    coin: String,
    interval: Duration,
    policy: RetryPolicy,
    tx: mpsc::Sender<Record>,
    shutdown: CancellationToken,
) {
    let mut timer = tokio::time::interval(interval);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = shutdown.cancelled() => return,
            _ = timer.tick() => {}
        }

        match client.fetch_asset_ctx_with_retry(&coin, &policy).await {
            Ok(ctx) => {
                // Predicted funding is best effort; the sample is still
                // useful without it
                let predicted = match client.fetch_predicted_funding(&coin).await {
                    Ok(p) => p,
                    Err(e) => {
                        debug!(?e, "Predicted funding unavailable");
                        None
                    }
                };

                let record = Record::Funding(FundingRate {
                    timestamp: ctx.timestamp,
                    coin: ctx.coin,
                    funding_rate: ctx.funding_rate,
                    predicted_funding_rate: predicted.map(|(rate, _)| rate),
                    next_funding_time: predicted.map(|(_, time)| time),
                    mark_price: ctx.mark_price,
                    index_price: ctx.oracle_price,
                });
                if tx.send(record).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                warn!(?e, "Funding poll failed");
                Metrics::poll_error("metaAndAssetCtxs");
            }
        }
    }
}

/// Poll open interest on a fixed interval.
async fn open_interest_poll_loop(
    client: Arc<InfoClient>,
    coin: String,
    interval: Duration,
    policy: RetryPolicy,
    tx: mpsc::Sender<Record>,
    shutdown: CancellationToken,
) {
    let mut timer = tokio::time::interval(interval);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = shutdown.cancelled() => return,
            _ = timer.tick() => {}
        }

        match client.fetch_asset_ctx_with_retry(&coin, &policy).await {
            Ok(ctx) => {
                let record = Record::OpenInterest(OpenInterest {
                    timestamp: ctx.timestamp,
                    coin: ctx.coin,
                    open_interest: ctx.open_interest,
                    mark_price: ctx.mark_price,
                    oracle_price: ctx.oracle_price,
                });
                if tx.send(record).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                warn!(?e, "Open interest poll failed");
                Metrics::poll_error("metaAndAssetCtxs");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SinkSection;
    use chrono::TimeZone;
    use hldc_core::{Trade, TradeSide};
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn test_recorder(data_dir: &std::path::Path) -> Recorder {
        let config = AppConfig {
            sink: SinkSection {
                data_dir: data_dir.to_string_lossy().into_owned(),
                ..Default::default()
            },
            ..Default::default()
        };
        Recorder::new(config).unwrap()
    }

    fn funding_record(rate: Decimal, next_funding_time: Option<DateTime<Utc>>) -> Record {
        Record::Funding(FundingRate {
            timestamp: Utc::now(),
            coin: "BTC".to_string(),
            funding_rate: rate,
            predicted_funding_rate: None,
            next_funding_time,
            mark_price: dec!(50000),
            index_price: dec!(50001),
        })
    }

    fn trade_record(tid: u64) -> Record {
        Record::Trade(Trade {
            timestamp: Utc::now(),
            coin: "BTC".to_string(),
            side: TradeSide::Buy,
            price: dec!(50000),
            size: dec!(0.1),
            trade_id: tid,
            buyer: "0xb".to_string(),
            seller: "0xs".to_string(),
            hash: "0xh".to_string(),
            crossed: true,
            fee: None,
        })
    }

    fn channel_message(channel: &str, data: serde_json::Value) -> ChannelMessage {
        ChannelMessage {
            channel: channel.to_string(),
            data,
        }
    }

    #[tokio::test]
    async fn test_connect_lifecycle_transitions() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let mut recorder = test_recorder(temp_dir.path());
        let (segment_tx, _segment_rx) = mpsc::channel(8);
        let shutdown = CancellationToken::new();

        assert_eq!(recorder.status().state, IngestState::Disconnected);

        recorder
            .handle_ws_event(WsEvent::Connected, &segment_tx, &shutdown)
            .await
            .unwrap();
        assert_eq!(recorder.status().state, IngestState::Subscribing);

        recorder
            .handle_ws_event(WsEvent::Subscribed, &segment_tx, &shutdown)
            .await
            .unwrap();
        assert_eq!(recorder.status().state, IngestState::Streaming);

        recorder
            .handle_ws_event(
                WsEvent::Disconnected {
                    reason: "closed".to_string(),
                },
                &segment_tx,
                &shutdown,
            )
            .await
            .unwrap();
        assert_eq!(recorder.status().state, IngestState::Degraded);

        recorder
            .handle_ws_event(WsEvent::Reconnecting { attempt: 1 }, &segment_tx, &shutdown)
            .await
            .unwrap();
        assert_eq!(recorder.status().state, IngestState::Connecting);
    }

    #[tokio::test]
    async fn test_poll_funding_duplicate_dropped() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let mut recorder = test_recorder(temp_dir.path());
        let (segment_tx, _segment_rx) = mpsc::channel(8);
        let shutdown = CancellationToken::new();

        let next = Utc.with_ymd_and_hms(2026, 1, 1, 8, 0, 0).unwrap();
        recorder
            .ingest(funding_record(dec!(0.0001), Some(next)), &segment_tx, &shutdown)
            .await
            .unwrap();
        recorder
            .ingest(funding_record(dec!(0.0001), Some(next)), &segment_tx, &shutdown)
            .await
            .unwrap();
        recorder
            .ingest(funding_record(dec!(0.0002), Some(next)), &segment_tx, &shutdown)
            .await
            .unwrap();

        let status = recorder.status();
        assert_eq!(status.ingested[&RecordKind::FundingRate], 2);
        assert_eq!(status.dropped[&RecordKind::FundingRate], 1);
    }

    #[tokio::test]
    async fn test_stream_funding_samples_all_kept() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let mut recorder = test_recorder(temp_dir.path());
        let (segment_tx, _segment_rx) = mpsc::channel(8);
        let shutdown = CancellationToken::new();

        // activeAssetCtx samples carry no next funding time; each one keeps
        // its mark/index prices, so a steady rate must not collapse rows
        for _ in 0..3 {
            recorder
                .ingest(funding_record(dec!(0.0001), None), &segment_tx, &shutdown)
                .await
                .unwrap();
        }

        let status = recorder.status();
        assert_eq!(status.ingested[&RecordKind::FundingRate], 3);
        assert!(status.dropped.is_empty());
    }

    /// A sink that cannot flush must pause intake, hold every buffered
    /// record, and resume once flushing works again.
    #[cfg(unix)]
    #[tokio::test]
    async fn test_intake_pauses_until_flush_recovers() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        // The data dir path points at a regular file, so creating CSV
        // files under it fails until the file is swapped for a directory
        let blocker = temp_dir.path().join("data");
        std::fs::write(&blocker, b"").unwrap();

        let config = AppConfig {
            sink: SinkSection {
                data_dir: blocker.to_string_lossy().into_owned(),
                flush_threshold: 1,
                watermark: 1,
                ..Default::default()
            },
            ..Default::default()
        };
        let mut recorder = Recorder::new(config).unwrap();

        let (segment_tx, _segment_rx) = mpsc::channel(8);
        let shutdown = CancellationToken::new();

        let handle = tokio::spawn(async move {
            recorder
                .ingest(trade_record(1), &segment_tx, &shutdown)
                .await
                .unwrap();
            recorder
        });

        // The failed flush keeps the coordinator in its retry loop
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!handle.is_finished(), "intake should be paused");

        std::fs::remove_file(&blocker).unwrap();
        std::fs::create_dir(&blocker).unwrap();

        let recorder = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("intake should resume after the flush recovers")
            .unwrap();

        assert_eq!(recorder.status().ingested[&RecordKind::Trades], 1);
        let written = std::fs::read_to_string(blocker.join("btc_trades.csv")).unwrap();
        assert!(written.lines().any(|l| l.contains("0xh")));
    }

    #[tokio::test]
    async fn test_decode_error_does_not_interrupt() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let mut recorder = test_recorder(temp_dir.path());
        let (segment_tx, _segment_rx) = mpsc::channel(8);
        let shutdown = CancellationToken::new();

        // Malformed trades payload, then a valid one
        recorder
            .handle_payload(
                channel_message("trades", json!([{"coin": "BTC", "px": "bogus"}])),
                &segment_tx,
                &shutdown,
            )
            .await
            .unwrap();

        recorder
            .handle_payload(
                channel_message(
                    "trades",
                    json!([{
                        "coin": "BTC",
                        "side": "B",
                        "px": "50000.5",
                        "sz": "0.01",
                        "time": 1700000000000i64,
                        "tid": 7,
                        "users": ["0xb", "0xs"],
                        "hash": "0xh",
                        "crossed": true
                    }]),
                ),
                &segment_tx,
                &shutdown,
            )
            .await
            .unwrap();

        let status = recorder.status();
        assert_eq!(status.ingested.get(&RecordKind::Trades), Some(&1));
    }

    #[tokio::test]
    async fn test_asset_ctx_yields_funding_and_oi() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let mut recorder = test_recorder(temp_dir.path());
        let (segment_tx, _segment_rx) = mpsc::channel(8);
        let shutdown = CancellationToken::new();

        recorder
            .handle_payload(
                channel_message(
                    "activeAssetCtx",
                    json!({
                        "coin": "BTC",
                        "ctx": {
                            "funding": "0.0000125",
                            "markPx": "50000",
                            "oraclePx": "50001",
                            "openInterest": "1234.5"
                        }
                    }),
                ),
                &segment_tx,
                &shutdown,
            )
            .await
            .unwrap();

        let status = recorder.status();
        assert_eq!(status.ingested.get(&RecordKind::FundingRate), Some(&1));
        assert_eq!(status.ingested.get(&RecordKind::OpenInterest), Some(&1));
    }

    #[tokio::test]
    async fn test_unknown_channel_ignored() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let mut recorder = test_recorder(temp_dir.path());
        let (segment_tx, _segment_rx) = mpsc::channel(8);
        let shutdown = CancellationToken::new();

        recorder
            .handle_payload(
                channel_message("notifications", json!({"note": "hi"})),
                &segment_tx,
                &shutdown,
            )
            .await
            .unwrap();

        assert!(recorder.status().ingested.is_empty());
    }

    #[test]
    fn test_state_labels() {
        assert_eq!(IngestState::Streaming.as_str(), "streaming");
        assert_eq!(IngestState::ShuttingDown.as_str(), "shutting_down");
    }
}
