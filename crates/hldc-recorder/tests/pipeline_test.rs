//! End-to-end pipeline tests.
//!
//! Drives a full `Recorder` against the scripted mock server and asserts
//! on the CSV files it produces: record flow, reconnection survival and
//! append-safe duplicate handling.

mod integration;
use integration::common::mock_ws::MockWsServer;

use hldc_recorder::{AppConfig, Recorder};
use hldc_recorder::config::{PollSection, SinkSection, WsSection};
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

fn test_config(server_url: String, data_dir: &Path) -> AppConfig {
    AppConfig {
        coin: "BTC".to_string(),
        testnet: false,
        ws_url: Some(server_url),
        // Nothing listens here; polls fail fast and are non-fatal
        info_url: Some("http://127.0.0.1:9".to_string()),
        websocket: WsSection {
            reconnect_base_delay_ms: 100,
            ..Default::default()
        },
        poll: PollSection {
            funding_interval_secs: 60,
            open_interest_interval_secs: 60,
            retry_attempts: 1,
        },
        sink: SinkSection {
            data_dir: data_dir.to_string_lossy().into_owned(),
            flush_interval_secs: 1,
            ..Default::default()
        },
        ..Default::default()
    }
}

fn trade_frame(tid: u64, time: i64) -> String {
    json!({
        "channel": "trades",
        "data": [{
            "coin": "BTC",
            "side": "B",
            "px": "50000.5",
            "sz": "0.01",
            "time": time,
            "tid": tid,
            "users": ["0xbuyer", "0xseller"],
            "hash": format!("0xhash{tid}"),
            "crossed": true
        }]
    })
    .to_string()
}

fn book_frame(time: i64) -> String {
    json!({
        "channel": "l2Book",
        "data": {
            "coin": "BTC",
            "time": time,
            "levels": [
                [{"px": "50000", "sz": "1.5", "n": 3}],
                [{"px": "50001", "sz": "2.0", "n": 2}]
            ]
        }
    })
    .to_string()
}

/// Poll until `cond` holds or the timeout elapses.
async fn wait_for<F, Fut>(what: &str, mut cond: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    timeout(Duration::from_secs(5), async {
        loop {
            if cond().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {what}"));
}

fn read_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

#[tokio::test]
async fn test_records_survive_reconnect() {
    let server = MockWsServer::start().await;
    let temp_dir = tempfile::TempDir::new().unwrap();

    let config = test_config(server.url(), temp_dir.path());
    let recorder = Recorder::new(config).unwrap();
    let shutdown = CancellationToken::new();

    let run = tokio::spawn(recorder.run(shutdown.clone()));

    // Wait for the initial connection and full subscription set
    wait_for("first connection", || async {
        server.connection_count().await >= 1
    })
    .await;
    wait_for("subscriptions", || async {
        let messages = server.received_messages().await;
        messages.iter().filter(|m| m.contains("subscribe")).count() >= 3
    })
    .await;

    // Snapshot, trade, snapshot
    server.send_text(book_frame(1_700_000_001_000)).await;
    server.send_text(trade_frame(1, 1_700_000_002_000)).await;
    server.send_text(book_frame(1_700_000_003_000)).await;

    // Disconnect mid-stream; the recorder reconnects and resubscribes
    server.drop_connections().await;
    wait_for("reconnection", || async {
        server.connection_count().await >= 2
    })
    .await;
    wait_for("resubscription", || async {
        let messages = server.received_messages().await;
        messages.iter().filter(|m| m.contains("subscribe")).count() >= 6
    })
    .await;

    // Post-reconnect snapshot
    server.send_text(book_frame(1_700_000_006_000)).await;

    // Wait for records to land on disk via the timed flush
    let book_path = temp_dir.path().join("btc_orderbook.csv");
    wait_for("flushed book rows", || async {
        read_lines(&book_path).len() >= 4
    })
    .await;

    shutdown.cancel();
    let result = timeout(Duration::from_secs(15), run)
        .await
        .expect("run did not stop")
        .expect("run task panicked");
    assert!(result.is_ok(), "run returned error: {result:?}");

    // Header + three snapshots across both connections
    let book_lines = read_lines(&book_path);
    assert_eq!(book_lines.len(), 4);

    // Header + one trade
    let trade_lines = read_lines(&temp_dir.path().join("btc_trades.csv"));
    assert_eq!(trade_lines.len(), 2);
    assert!(trade_lines[1].contains("0xhash1"));

    server.shutdown().await;
}

#[tokio::test]
async fn test_duplicate_trade_ids_are_both_recorded() {
    let server = MockWsServer::start().await;
    let temp_dir = tempfile::TempDir::new().unwrap();

    let config = test_config(server.url(), temp_dir.path());
    let recorder = Recorder::new(config).unwrap();
    let shutdown = CancellationToken::new();

    let run = tokio::spawn(recorder.run(shutdown.clone()));

    wait_for("subscriptions", || async {
        let messages = server.received_messages().await;
        messages.iter().filter(|m| m.contains("subscribe")).count() >= 3
    })
    .await;

    // The same trade id delivered twice (exchange replay after a hiccup)
    server.send_text(trade_frame(42, 1_700_000_001_000)).await;
    server.send_text(trade_frame(42, 1_700_000_001_000)).await;

    let trade_path = temp_dir.path().join("btc_trades.csv");
    wait_for("flushed trade rows", || async {
        read_lines(&trade_path).len() >= 3
    })
    .await;

    shutdown.cancel();
    let result = timeout(Duration::from_secs(15), run)
        .await
        .expect("run did not stop")
        .expect("run task panicked");
    assert!(result.is_ok());

    // Appends are at-least-once; dedupe is the reader's job
    let lines = read_lines(&trade_path);
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[1].split(',').nth(5), Some("42"));
    assert_eq!(lines[2].split(',').nth(5), Some("42"));

    server.shutdown().await;
}

#[tokio::test]
async fn test_active_asset_ctx_produces_funding_and_open_interest() {
    let server = MockWsServer::start().await;
    let temp_dir = tempfile::TempDir::new().unwrap();

    let config = test_config(server.url(), temp_dir.path());
    let recorder = Recorder::new(config).unwrap();
    let shutdown = CancellationToken::new();

    let run = tokio::spawn(recorder.run(shutdown.clone()));

    wait_for("subscriptions", || async {
        let messages = server.received_messages().await;
        messages.iter().filter(|m| m.contains("subscribe")).count() >= 3
    })
    .await;

    let ctx = json!({
        "channel": "activeAssetCtx",
        "data": {
            "coin": "BTC",
            "ctx": {
                "funding": "0.0000125",
                "markPx": "50000",
                "oraclePx": "50001",
                "openInterest": "1234.5"
            }
        }
    });
    server.send_text(ctx.to_string()).await;

    let funding_path = temp_dir.path().join("btc_funding_rate.csv");
    let oi_path = temp_dir.path().join("btc_open_interest.csv");
    wait_for("funding and oi rows", || async {
        read_lines(&funding_path).len() >= 2 && read_lines(&oi_path).len() >= 2
    })
    .await;

    shutdown.cancel();
    let result = timeout(Duration::from_secs(15), run)
        .await
        .expect("run did not stop")
        .expect("run task panicked");
    assert!(result.is_ok());

    let funding_lines = read_lines(&funding_path);
    assert!(funding_lines[1].contains("0.0000125"));
    let oi_lines = read_lines(&oi_path);
    assert!(oi_lines[1].contains("1234.5"));

    server.shutdown().await;
}
