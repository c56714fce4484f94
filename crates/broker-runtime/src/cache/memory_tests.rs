//! Tests for the in-memory cache provider.

use super::*;
use serde_json::json;

#[tokio::test]
async fn test_get_missing_key() {
    let cache = InMemoryCache::default();
    assert_eq!(cache.get("absent").await.unwrap(), None);
}

#[tokio::test]
async fn test_set_then_get() {
    let cache = InMemoryCache::default();
    cache
        .set("cluster:1", json!({"workers": 4}), Some(Duration::seconds(60)))
        .await
        .unwrap();

    assert_eq!(
        cache.get("cluster:1").await.unwrap(),
        Some(json!({"workers": 4}))
    );
    assert_eq!(cache.len(), 1);
}

#[tokio::test]
async fn test_set_without_timeout_persists() {
    let cache = InMemoryCache::default();
    cache.set("index", json!(["a", "b"]), None).await.unwrap();
    assert_eq!(cache.get("index").await.unwrap(), Some(json!(["a", "b"])));
}

#[tokio::test]
async fn test_overwrite_replaces_value() {
    let cache = InMemoryCache::default();
    cache.set("k", json!(1), None).await.unwrap();
    cache.set("k", json!(2), None).await.unwrap();
    assert_eq!(cache.get("k").await.unwrap(), Some(json!(2)));
}

#[tokio::test]
async fn test_non_positive_timeout_expires_immediately() {
    let cache = InMemoryCache::default();
    cache.set("k", json!(1), None).await.unwrap();
    cache.set("k", json!(2), Some(Duration::zero())).await.unwrap();
    assert_eq!(cache.get("k").await.unwrap(), None);
}

#[tokio::test]
async fn test_entry_expires_after_timeout() {
    let cache = InMemoryCache::default();
    cache
        .set("short", json!("lived"), Some(Duration::milliseconds(20)))
        .await
        .unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    assert_eq!(cache.get("short").await.unwrap(), None);
    assert!(cache.is_empty());
}

#[tokio::test]
async fn test_delete_removes_key() {
    let cache = InMemoryCache::default();
    cache.set("k", json!(1), None).await.unwrap();
    cache.delete("k").await.unwrap();
    cache.delete("never-set").await.unwrap();
    assert_eq!(cache.get("k").await.unwrap(), None);
}

#[tokio::test]
async fn test_clones_share_storage() {
    let cache = InMemoryCache::new("shared");
    let clone = cache.clone();

    cache.set("k", json!("v"), None).await.unwrap();

    assert_eq!(clone.get("k").await.unwrap(), Some(json!("v")));
    assert_eq!(clone.name(), "shared");
}
