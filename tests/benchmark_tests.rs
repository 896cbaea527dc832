//! Performance benchmarks for critical sync paths

use client::session::ClientSyncSession;
use serde_json::{json, Value};
use server::actions::{ActionRegistry, ActionServer};
use server::hub::ConnectionHub;
use server::store::ChannelStore;
use shared::{ActionRequest, ServerMessage, HOME_ROOM};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

/// Benchmarks a write fanning out to many observers
#[test]
fn benchmark_store_fan_out() {
    let store = ChannelStore::new();
    let delivered = Arc::new(AtomicUsize::new(0));

    let observers = 1_000;
    for _ in 0..observers {
        let delivered = Arc::clone(&delivered);
        store.observe(HOME_ROOM, move |_| {
            delivered.fetch_add(1, Ordering::Relaxed);
        });
    }

    let iterations = 1_000;
    let start = Instant::now();

    for clock in 0..iterations {
        store.write(HOME_ROOM, json!({ "clock": clock }));
    }

    let duration = start.elapsed();
    println!(
        "Store fan-out: {} writes × {} observers in {:?} ({:.2} μs/write)",
        iterations,
        observers,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert_eq!(delivered.load(Ordering::Relaxed), iterations * observers);
    // Should complete in under 5 seconds
    assert!(duration.as_millis() < 5000);
}

/// Benchmarks writes spread over many independent channels
#[test]
fn benchmark_store_many_channels() {
    let store = ChannelStore::new();
    let channels: Vec<String> = (0..1_000).map(|i| format!("Room:{}", i)).collect();

    let start = Instant::now();

    for round in 0..10 {
        for channel in &channels {
            store.write(channel, json!(round));
        }
    }

    let duration = start.elapsed();
    println!(
        "Store writes: {} channels × 10 rounds in {:?}",
        channels.len(),
        duration
    );

    assert_eq!(store.len(), channels.len());
    assert_eq!(store.read("Room:999"), Some(json!(9)));
    // Should complete in under 1 second
    assert!(duration.as_millis() < 1000);
}

/// Stress tests connection churn and checks nothing leaks
#[test]
fn stress_test_hub_churn() {
    let store = Arc::new(ChannelStore::new());
    let hub = ConnectionHub::new(Arc::clone(&store));

    let connections = 500;
    let start = Instant::now();

    for i in 0..connections {
        let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
        let id = hub.connect(tx);
        hub.subscribe(id, HOME_ROOM).unwrap();
        hub.subscribe(id, &format!("Private:{}", i)).unwrap();
        assert!(rx.try_recv().is_ok());
        hub.unsubscribe(id, HOME_ROOM).unwrap();
        assert_eq!(hub.disconnect(id), Some(1));
    }

    let duration = start.elapsed();
    println!("Hub churn: {} connections in {:?}", connections, duration);

    assert!(hub.is_empty());
    assert_eq!(store.observer_count(HOME_ROOM), 0);
    assert_eq!(store.write(HOME_ROOM, json!({"clock": 1})), 0);
    // Should complete in under 2 seconds
    assert!(duration.as_millis() < 2000);
}

/// Benchmarks client-side multiplexing of updates onto local callbacks
#[test]
fn benchmark_session_updates() {
    let session = ClientSyncSession::new();
    let delivered = Arc::new(AtomicUsize::new(0));

    let subscriptions: Vec<_> = (0..100)
        .map(|_| {
            let delivered = Arc::clone(&delivered);
            session.subscribe(HOME_ROOM, move |_| {
                delivered.fetch_add(1, Ordering::Relaxed);
            })
        })
        .collect();

    let iterations = 10_000;
    let start = Instant::now();

    for clock in 0..iterations {
        session.handle_update(HOME_ROOM, Some(json!({ "clock": clock })));
    }

    let duration = start.elapsed();
    println!(
        "Session updates: {} updates × {} callbacks in {:?}",
        iterations,
        subscriptions.len(),
        duration
    );

    assert_eq!(delivered.load(Ordering::Relaxed), iterations * subscriptions.len());
    // Should complete in under 5 seconds
    assert!(duration.as_millis() < 5000);

    for subscription in subscriptions {
        subscription.unsubscribe();
    }
    assert_eq!(session.subscriber_count(HOME_ROOM), 0);
}

/// Benchmarks action dispatch through the registry
#[tokio::test]
async fn benchmark_action_dispatch() {
    struct Echo;

    #[async_trait::async_trait]
    impl server::actions::ActionHandler for Echo {
        async fn handle(
            &self,
            payload: serde_json::Map<String, Value>,
        ) -> Result<Value, server::error::ActionError> {
            Ok(Value::Object(payload))
        }
    }

    let mut registry = ActionRegistry::new();
    registry.register("Echo", Echo);
    let actions = ActionServer::new(registry);

    let iterations = 5_000;
    let start = Instant::now();

    for i in 0..iterations {
        let mut payload = serde_json::Map::new();
        payload.insert("n".to_string(), json!(i));
        let result = actions.dispatch(ActionRequest::new("Echo", payload)).await.unwrap();
        assert_eq!(result["n"], i);
    }

    let duration = start.elapsed();
    println!(
        "Action dispatch: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    // Should complete in under 5 seconds
    assert!(duration.as_millis() < 5000);
}
