//! Integration tests for moving a broker across a process boundary
//!
//! These tests verify:
//! - A serialized snapshot rebuilds a broker on the same queue
//! - The rebuilt broker owns a fresh connection but sees the same backlog
//! - Leases taken before the handoff can be settled after it

mod common;

use broker_runtime::{BrokerSnapshot, InMemoryCache, MemoryStore};
use common::memory_factory;
use serde_json::json;

fn ship(snapshot: &BrokerSnapshot) -> BrokerSnapshot {
    let wire = serde_json::to_vec(snapshot).unwrap();
    serde_json::from_slice(&wire).unwrap()
}

/// Verify that tasks enqueued before the handoff are dequeued after it
#[tokio::test]
async fn test_backlog_survives_handoff() {
    let store = MemoryStore::new();
    let factory = memory_factory(&store, None);

    let producer = factory.get_broker(Some("jobs")).unwrap();
    producer.enqueue("first").await.unwrap();
    producer.enqueue("second").await.unwrap();

    let worker = factory.rehydrate(ship(&producer.snapshot())).unwrap();
    assert_eq!(worker.list_key().as_str(), "jobs");
    assert_eq!(worker.queue_size().await.unwrap(), 2);

    let first = worker.dequeue().await.unwrap().unwrap();
    let second = worker.dequeue().await.unwrap().unwrap();
    assert_eq!(first.message, "first");
    assert_eq!(second.message, "second");
    assert!(worker.dequeue().await.unwrap().is_none());
}

/// Verify that a lease taken on one side can be acknowledged on the other
#[tokio::test]
async fn test_lease_settled_after_handoff() {
    let store = MemoryStore::new();
    let factory = memory_factory(&store, None);

    let before = factory.get_broker(Some("jobs")).unwrap();
    before.enqueue("payload").await.unwrap();
    let task = before.dequeue().await.unwrap().unwrap();
    assert_eq!(before.lock_size().await.unwrap(), 1);

    let after = factory.rehydrate(ship(&before.snapshot())).unwrap();
    after
        .acknowledge(task.task_id.as_ref().unwrap())
        .await
        .unwrap();

    assert_eq!(after.lock_size().await.unwrap(), 0);
    assert_eq!(before.lock_size().await.unwrap(), 0);
}

/// Verify that the snapshot carries only the queue and the description
#[test]
fn test_snapshot_wire_format() {
    let factory = memory_factory(&MemoryStore::new(), None);
    let broker = factory.get_broker(Some("jobs")).unwrap();

    let wire = serde_json::to_value(broker.snapshot()).unwrap();
    assert_eq!(wire, json!({"list_key": "jobs", "info": "Memory"}));
}

/// Verify that the rebuilt broker publishes stats to the same cluster index
#[tokio::test]
async fn test_stats_continue_after_handoff() {
    let store = MemoryStore::new();
    let cache = InMemoryCache::new("default");
    let factory = memory_factory(&store, Some(&cache));

    let before = factory.get_broker(None).unwrap();
    before.set_stat("worker-a", json!("idle"), None).await.unwrap();

    let after = factory.rehydrate(ship(&before.snapshot())).unwrap();
    after.set_stat("worker-b", json!("busy"), None).await.unwrap();

    assert_eq!(
        before.get_stats("*").await.unwrap(),
        Some(vec![json!("idle"), json!("busy")])
    );
}

/// Verify that a snapshot for a queue no longer in the store rebuilds an empty queue
#[tokio::test]
async fn test_handoff_after_queue_deleted() {
    let store = MemoryStore::new();
    let factory = memory_factory(&store, None);

    let broker = factory.get_broker(Some("jobs")).unwrap();
    broker.enqueue("doomed").await.unwrap();
    let snapshot = broker.snapshot();
    broker.delete_queue().await.unwrap();

    let restored = factory.rehydrate(ship(&snapshot)).unwrap();
    assert_eq!(restored.queue_size().await.unwrap(), 0);
    assert!(restored.dequeue().await.unwrap().is_none());
}
