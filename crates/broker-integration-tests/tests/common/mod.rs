//! Common test utilities for broker-runtime integration tests
//!
//! This module provides:
//! - A recording backend standing in for transports that need external services
//! - Factory builders over the in-memory store and cache

use broker_runtime::{
    BackendRegistry, BrokerBackend, BrokerError, BrokerFactory, BrokerSettings, CacheRegistry,
    DequeuedTask, InMemoryCache, MemoryStore, TaskId,
};
use std::sync::{Arc, Mutex};

/// Every backend name the factory can select without a custom class
#[allow(dead_code)]
pub const SELECTABLE_BACKENDS: [&str; 6] = ["ironmq", "sqs", "orm", "mongo", "pubsub", "redis"];

// ============================================================================
// Recording Backend
// ============================================================================

/// Calls observed by a [`RecordingBackend`], as `"{backend}:{queue}:{operation}"`
pub type CallLog = Arc<Mutex<Vec<String>>>;

/// Backend that records each call and otherwise behaves like an empty queue
pub struct RecordingBackend {
    name: String,
    queue: String,
    calls: CallLog,
}

impl RecordingBackend {
    fn record(&self, operation: &str) {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{}:{}:{}", self.name, self.queue, operation));
    }
}

#[async_trait::async_trait]
impl BrokerBackend for RecordingBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn enqueue(&self, _message: &str) -> Result<TaskId, BrokerError> {
        self.record("enqueue");
        Ok(TaskId::generate())
    }

    async fn dequeue(&self) -> Result<Option<DequeuedTask>, BrokerError> {
        self.record("dequeue");
        Ok(None)
    }

    async fn queue_size(&self) -> Result<u64, BrokerError> {
        self.record("queue_size");
        Ok(0)
    }

    async fn ping(&self) -> bool {
        self.record("ping");
        true
    }

    fn info(&self) -> Option<String> {
        Some(format!("recording {}", self.name))
    }
}

/// Registry where each name builds a [`RecordingBackend`] sharing one call log
#[allow(dead_code)]
pub fn recording_registry(names: &[&str]) -> (BackendRegistry, CallLog) {
    let calls: CallLog = Arc::default();
    let mut registry = BackendRegistry::new();
    for name in names {
        let owned = name.to_string();
        let log = calls.clone();
        registry.register(*name, move |queue, _settings| {
            Ok(Box::new(RecordingBackend {
                name: owned.clone(),
                queue: queue.to_string(),
                calls: log.clone(),
            }) as Box<dyn BrokerBackend>)
        });
    }
    (registry, calls)
}

// ============================================================================
// Factory Builders
// ============================================================================

/// Factory whose brokers use the `memory` backend over `store`
///
/// When `cache` is given it is registered as the `default` cache.
#[allow(dead_code)]
pub fn memory_factory(store: &MemoryStore, cache: Option<&InMemoryCache>) -> BrokerFactory {
    memory_factory_with(store, cache, BrokerSettings::default())
}

/// As [`memory_factory`], starting from the given settings
#[allow(dead_code)]
pub fn memory_factory_with(
    store: &MemoryStore,
    cache: Option<&InMemoryCache>,
    settings: BrokerSettings,
) -> BrokerFactory {
    let mut backends = BackendRegistry::new();
    backends.register_memory(store.clone());

    let mut caches = CacheRegistry::new();
    if let Some(cache) = cache {
        caches.register("default", Arc::new(cache.clone()));
    }

    let settings = BrokerSettings {
        broker_class: Some("memory".to_string()),
        ..settings
    };
    BrokerFactory::new(settings, backends, caches)
}
