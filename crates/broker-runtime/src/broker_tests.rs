//! Tests for [`Broker`].

use super::*;
use crate::backends::{MemoryBackend, MemoryStore};
use crate::cache::InMemoryCache;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

fn queue() -> QueueName {
    QueueName::new("default".to_string()).unwrap()
}

fn memory_broker(store: &MemoryStore, cache: Option<InMemoryCache>) -> Broker {
    let backend = MemoryBackend::new(queue(), store.clone(), Duration::seconds(60));
    let cache = cache.map(|c| Arc::new(c) as Arc<dyn crate::cache::CacheProvider>);
    Broker::new(
        queue(),
        Box::new(backend),
        StatsTracker::new(cache, "broker:default:cluster"),
    )
}

/// Backend that implements nothing beyond the required methods
struct BareBackend;

#[async_trait]
impl BrokerBackend for BareBackend {
    fn name(&self) -> &str {
        "bare"
    }

    async fn ping(&self) -> bool {
        false
    }
}

#[tokio::test]
async fn test_queue_operations_reach_backend() {
    let store = MemoryStore::new();
    let broker = memory_broker(&store, None);

    let task_id = broker.enqueue("job").await.unwrap();
    assert_eq!(broker.queue_size().await.unwrap(), 1);

    let task = broker.dequeue().await.unwrap().unwrap();
    assert_eq!(task.task_id, Some(task_id.clone()));
    assert_eq!(broker.lock_size().await.unwrap(), 1);

    broker.acknowledge(&task_id).await.unwrap();
    assert_eq!(broker.lock_size().await.unwrap(), 0);
}

#[tokio::test]
async fn test_unimplemented_operations_surface_as_errors() {
    let broker = Broker::new(
        queue(),
        Box::new(BareBackend),
        StatsTracker::new(None, "index"),
    );

    let err = broker.enqueue("job").await.unwrap_err();
    assert!(matches!(
        err,
        BrokerError::NotImplemented { ref operation, ref backend }
            if operation == "enqueue" && backend == "bare"
    ));
    assert!(broker.purge_queue().await.is_err());
    assert_eq!(broker.info(), None);
}

#[tokio::test]
async fn test_ping_is_false_when_connection_breaks() {
    let store = MemoryStore::new();
    let broker = memory_broker(&store, None);
    assert!(broker.ping().await);

    store.disconnect();
    assert!(!broker.ping().await);
}

#[test]
fn test_info_is_captured_from_backend() {
    let broker = memory_broker(&MemoryStore::new(), None);
    assert_eq!(broker.info(), Some("Memory"));
    assert_eq!(broker.backend_name(), "memory");
    assert_eq!(broker.list_key(), &queue());
}

#[test]
fn test_snapshot_holds_only_identity_and_info() {
    let broker = memory_broker(&MemoryStore::new(), Some(InMemoryCache::default()));
    let snapshot = broker.snapshot();

    assert_eq!(snapshot.list_key, queue());
    assert_eq!(snapshot.info.as_deref(), Some("Memory"));

    let encoded = serde_json::to_value(&snapshot).unwrap();
    assert_eq!(encoded, json!({"list_key": "default", "info": "Memory"}));
    let decoded: BrokerSnapshot = serde_json::from_value(encoded).unwrap();
    assert_eq!(decoded, snapshot);
}

#[tokio::test]
async fn test_stats_go_through_cache() {
    let cache = InMemoryCache::default();
    let broker = memory_broker(&MemoryStore::new(), Some(cache.clone()));

    broker.set_stat("worker", json!({"busy": true}), None).await.unwrap();

    assert_eq!(
        broker.get_stat("worker").await.unwrap(),
        Some(json!({"busy": true}))
    );
    assert_eq!(
        broker.get_stats("*").await.unwrap(),
        Some(vec![json!({"busy": true})])
    );
    assert_eq!(cache.len(), 2);
}

#[tokio::test]
async fn test_stats_without_cache_are_disabled() {
    let broker = memory_broker(&MemoryStore::new(), None);

    broker.set_stat("worker", json!(1), None).await.unwrap();
    assert_eq!(broker.get_stat("worker").await.unwrap(), None);
    assert_eq!(broker.get_stats("*").await.unwrap(), None);
    assert!(!broker.stats().is_enabled());
}
