//! Resolving settings into a broker.
//!
//! [`BrokerFactory`] owns the settings, the backend registry and the cache
//! registry. [`BrokerFactory::get_broker`] picks the backend with
//! [`BackendKind::select`], builds it for the requested queue and attaches
//! the configured cache. A backend that cannot be built is a fatal error;
//! there is no fallback to another transport.

use crate::backend::BackendKind;
use crate::broker::{Broker, BrokerSnapshot};
use crate::cache::CacheRegistry;
use crate::error::BrokerError;
use crate::message::QueueName;
use crate::registry::BackendRegistry;
use crate::settings::BrokerSettings;
use crate::stats::StatsTracker;
use std::path::Path;
use tracing::info;

#[cfg(test)]
#[path = "factory_tests.rs"]
mod tests;

/// Builds brokers from one set of settings
#[derive(Debug, Clone)]
pub struct BrokerFactory {
    settings: BrokerSettings,
    backends: BackendRegistry,
    caches: CacheRegistry,
}

impl BrokerFactory {
    /// Create a factory from its parts
    pub fn new(settings: BrokerSettings, backends: BackendRegistry, caches: CacheRegistry) -> Self {
        Self {
            settings,
            backends,
            caches,
        }
    }

    /// Factory with the built-in backends and the caches named in `settings`
    ///
    /// # Errors
    ///
    /// Fails if the settings are invalid or a cache cannot be built.
    pub fn from_settings(settings: BrokerSettings) -> Result<Self, BrokerError> {
        settings.validate()?;
        let caches = CacheRegistry::from_settings(&settings.caches)?;
        Ok(Self::new(settings, BackendRegistry::builtin(), caches))
    }

    /// Load settings from an optional file plus the environment
    pub fn load(path: Option<&Path>) -> Result<Self, BrokerError> {
        Self::from_settings(BrokerSettings::load(path)?)
    }

    pub fn settings(&self) -> &BrokerSettings {
        &self.settings
    }

    pub fn backends(&self) -> &BackendRegistry {
        &self.backends
    }

    /// Mutable access for registering custom backends
    pub fn backends_mut(&mut self) -> &mut BackendRegistry {
        &mut self.backends
    }

    pub fn caches(&self) -> &CacheRegistry {
        &self.caches
    }

    /// Mutable access for registering cache providers
    pub fn caches_mut(&mut self) -> &mut CacheRegistry {
        &mut self.caches
    }

    /// The backend the settings select
    pub fn backend_kind(&self) -> BackendKind {
        BackendKind::select(&self.settings)
    }

    /// Build a broker for `list_key`, or for the cluster queue when `None`
    ///
    /// # Errors
    ///
    /// A validation error for a bad queue name, a configuration error when
    /// the selected backend is not registered, or any error from the
    /// backend's constructor.
    pub fn get_broker(&self, list_key: Option<&str>) -> Result<Broker, BrokerError> {
        let queue = match list_key {
            Some(name) => QueueName::new(name.to_string())?,
            None => self.settings.default_queue()?,
        };

        let kind = self.backend_kind();
        let backend = self
            .backends
            .construct(kind.registry_name(), &queue, &self.settings)?;
        info!(backend = %kind, queue = %queue, "Created broker");

        Ok(Broker::new(queue, backend, self.stats_tracker()))
    }

    /// Build a fresh broker equivalent to the one that produced `snapshot`
    ///
    /// The backend and its connection are constructed anew and the cache is
    /// resolved again; only the queue name and `info` come from the snapshot.
    pub fn rehydrate(&self, snapshot: BrokerSnapshot) -> Result<Broker, BrokerError> {
        let kind = self.backend_kind();
        let backend =
            self.backends
                .construct(kind.registry_name(), &snapshot.list_key, &self.settings)?;
        info!(backend = %kind, queue = %snapshot.list_key, "Rehydrated broker");

        Ok(Broker::from_snapshot(snapshot, backend, self.stats_tracker()))
    }

    fn stats_tracker(&self) -> StatsTracker {
        let cache = self.caches.resolve(self.settings.cache.as_deref());
        StatsTracker::new(cache, self.settings.q_stat())
    }
}
