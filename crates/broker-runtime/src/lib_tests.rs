//! Tests for the broker-runtime crate surface.

use super::*;
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn test_end_to_end_with_memory_backend() {
    let store = MemoryStore::new();
    let cache = InMemoryCache::new("default");

    let mut backends = BackendRegistry::new();
    backends.register_memory(store.clone());
    let mut caches = CacheRegistry::new();
    caches.register("default", Arc::new(cache.clone()));

    let settings = BrokerSettings {
        broker_class: Some("memory".to_string()),
        ..Default::default()
    };
    let factory = BrokerFactory::new(settings, backends, caches);
    let broker = factory.get_broker(None).unwrap();

    let task_id = broker.enqueue("payload").await.unwrap();
    let task = broker.dequeue().await.unwrap().unwrap();
    assert_eq!(task.task_id.as_ref(), Some(&task_id));
    broker.acknowledge(&task_id).await.unwrap();

    broker
        .set_stat("worker-1", json!({"status": "idle"}), None)
        .await
        .unwrap();
    assert_eq!(
        broker.get_stats("*").await.unwrap(),
        Some(vec![json!({"status": "idle"})])
    );
    assert!(broker.ping().await);
}

#[test]
fn test_default_settings_select_redis() {
    assert_eq!(
        BackendKind::select(&BrokerSettings::default()),
        BackendKind::Redis
    );
}

#[test]
fn test_broker_is_send_and_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Broker>();
    assert_send_sync::<BrokerFactory>();
    assert_send_sync::<StatsTracker>();
}
