//! WebSocket lifecycle integration tests.
//!
//! Tests the connection lifecycle:
//! - Connection establishment and subscription acknowledgement
//! - Payload delivery
//! - Reconnection with subscription replay

mod integration;
use integration::common::mock_ws::MockWsServer;

use hldc_ws::{ConnectionConfig, ConnectionManager, WsEvent};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

async fn next_event(rx: &mut mpsc::Receiver<WsEvent>) -> WsEvent {
    timeout(Duration::from_secs(3), rx.recv())
        .await
        .expect("timed out waiting for transport event")
        .expect("event channel closed")
}

fn trades_frame(tid: u64) -> String {
    json!({
        "channel": "trades",
        "data": [{
            "coin": "BTC",
            "side": "B",
            "px": "50000.5",
            "sz": "0.01",
            "time": 1700000000000i64,
            "tid": tid,
            "users": ["0xbuyer", "0xseller"],
            "hash": "0xabc",
            "crossed": true
        }]
    })
    .to_string()
}

#[tokio::test]
async fn test_connect_subscribe_and_receive_payload() {
    let server = MockWsServer::start().await;

    let config = ConnectionConfig {
        url: server.url(),
        max_reconnect_attempts: 3,
        ..Default::default()
    };

    let (event_tx, mut event_rx) = mpsc::channel(100);
    let manager = Arc::new(ConnectionManager::new(config, event_tx));

    let manager_clone = manager.clone();
    let handle = tokio::spawn(async move {
        let _ = manager_clone.connect().await;
    });

    assert!(matches!(next_event(&mut event_rx).await, WsEvent::Connected));
    assert!(matches!(
        next_event(&mut event_rx).await,
        WsEvent::Subscribed
    ));

    // All three channels were subscribed
    let messages = server.received_messages().await;
    let subscribes = messages.iter().filter(|m| m.contains("subscribe")).count();
    assert_eq!(subscribes, 3);
    assert!(messages.iter().any(|m| m.contains("l2Book")));
    assert!(messages.iter().any(|m| m.contains("activeAssetCtx")));

    server.send_text(trades_frame(1)).await;
    match next_event(&mut event_rx).await {
        WsEvent::Payload(msg) => assert_eq!(msg.channel, "trades"),
        other => panic!("expected payload, got {other:?}"),
    }

    manager.shutdown();
    let _ = handle.await;
    server.shutdown().await;
}

#[tokio::test]
async fn test_reconnect_replays_subscriptions() {
    let server = MockWsServer::start().await;

    let config = ConnectionConfig {
        url: server.url(),
        reconnect_base_delay_ms: 100,
        ..Default::default()
    };

    let (event_tx, mut event_rx) = mpsc::channel(100);
    let manager = Arc::new(ConnectionManager::new(config, event_tx));

    let manager_clone = manager.clone();
    let handle = tokio::spawn(async move {
        let _ = manager_clone.connect().await;
    });

    assert!(matches!(next_event(&mut event_rx).await, WsEvent::Connected));
    assert!(matches!(
        next_event(&mut event_rx).await,
        WsEvent::Subscribed
    ));

    server.drop_connections().await;

    assert!(matches!(
        next_event(&mut event_rx).await,
        WsEvent::Disconnected { .. }
    ));
    assert!(matches!(
        next_event(&mut event_rx).await,
        WsEvent::Reconnecting { attempt: 1 }
    ));
    assert!(matches!(next_event(&mut event_rx).await, WsEvent::Connected));
    assert!(matches!(
        next_event(&mut event_rx).await,
        WsEvent::Subscribed
    ));

    assert_eq!(server.connection_count().await, 2);

    // The full subscription set was replayed on the second connection
    let messages = server.received_messages().await;
    let subscribes = messages.iter().filter(|m| m.contains("subscribe")).count();
    assert_eq!(subscribes, 6);

    manager.shutdown();
    let _ = handle.await;
    server.shutdown().await;
}

#[tokio::test]
async fn test_max_reconnect_attempts_respected() {
    // Nothing listens on this port
    let config = ConnectionConfig {
        url: "ws://127.0.0.1:59999".to_string(),
        max_reconnect_attempts: 2,
        reconnect_base_delay_ms: 100,
        ..Default::default()
    };

    let (event_tx, _event_rx) = mpsc::channel(100);
    let manager = Arc::new(ConnectionManager::new(config, event_tx));

    let result = timeout(Duration::from_secs(5), manager.connect()).await;

    assert!(result.is_ok(), "Should stop after max reconnect attempts");
    assert!(result.unwrap().is_err(), "Exhausted retries should error");
}
