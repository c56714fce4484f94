//! Backend constructors keyed by name.
//!
//! The factory never names a backend type directly. It resolves a registry
//! name from the settings and asks the [`BackendRegistry`] to build it, so
//! deployments can plug in their own transports (or replace a built-in one)
//! by registering a constructor before the factory is created.

use crate::backend::BrokerBackend;
use crate::backends::{MemoryBackend, MemoryStore};
use crate::error::{BrokerError, ConfigurationError};
use crate::message::QueueName;
use crate::settings::BrokerSettings;
use chrono::Duration;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;

/// Builds a backend for one queue from the broker settings
pub type BackendConstructor = Arc<
    dyn Fn(&QueueName, &BrokerSettings) -> Result<Box<dyn BrokerBackend>, BrokerError>
        + Send
        + Sync,
>;

/// Longest lease the memory backend accepts, in seconds
const MAX_LEASE_SECONDS: u64 = i32::MAX as u64;

/// Named backend constructors
#[derive(Clone, Default)]
pub struct BackendRegistry {
    constructors: HashMap<String, BackendConstructor>,
}

impl BackendRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Registry with the backends compiled into this crate
    ///
    /// `memory` gets a fresh [`MemoryStore`] shared by every broker the
    /// registry builds. `redis` and `sqs` are present when their features are
    /// enabled.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register_memory(MemoryStore::new());

        #[cfg(feature = "redis")]
        registry.register("redis", |queue, settings| {
            let backend = crate::backends::RedisBackend::new(queue.clone(), &settings.redis)?;
            Ok(Box::new(backend) as Box<dyn BrokerBackend>)
        });

        #[cfg(feature = "sqs")]
        registry.register("sqs", |queue, settings| {
            let sqs = settings.sqs.as_ref().ok_or_else(|| ConfigurationError::Missing {
                key: "sqs".to_string(),
            })?;
            let backend = crate::backends::SqsBackend::new(queue.clone(), sqs, settings.retry)?;
            Ok(Box::new(backend) as Box<dyn BrokerBackend>)
        });

        registry
    }

    /// Register the `memory` backend over the given store
    pub fn register_memory(&mut self, store: MemoryStore) -> &mut Self {
        self.register("memory", move |queue, settings| {
            let lease = Duration::seconds(settings.retry.min(MAX_LEASE_SECONDS) as i64);
            Ok(Box::new(MemoryBackend::new(queue.clone(), store.clone(), lease))
                as Box<dyn BrokerBackend>)
        })
    }

    /// Register a constructor, replacing any constructor with the same name
    pub fn register<F>(&mut self, name: impl Into<String>, constructor: F) -> &mut Self
    where
        F: Fn(&QueueName, &BrokerSettings) -> Result<Box<dyn BrokerBackend>, BrokerError>
            + Send
            + Sync
            + 'static,
    {
        let name = name.into();
        debug!(backend = %name, "Registered backend constructor");
        self.constructors.insert(name, Arc::new(constructor));
        self
    }

    /// Look up a constructor by name
    pub fn get(&self, name: &str) -> Option<BackendConstructor> {
        self.constructors.get(name).cloned()
    }

    /// Check whether a constructor is registered
    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.constructors.keys().cloned().collect();
        names.sort();
        names
    }

    /// Build the backend registered under `name`
    ///
    /// # Errors
    ///
    /// [`ConfigurationError::UnknownBackend`] if nothing is registered under
    /// `name`, otherwise whatever the constructor returns.
    pub fn construct(
        &self,
        name: &str,
        queue: &QueueName,
        settings: &BrokerSettings,
    ) -> Result<Box<dyn BrokerBackend>, BrokerError> {
        let constructor = self
            .constructors
            .get(name)
            .ok_or_else(|| ConfigurationError::UnknownBackend {
                name: name.to_string(),
            })?;
        constructor(queue, settings)
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backends", &self.names())
            .finish()
    }
}
