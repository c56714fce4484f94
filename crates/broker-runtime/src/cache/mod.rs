//! Cache providers backing cluster statistics.
//!
//! A [`CacheProvider`] is a key/value store with optional per-key expiry.
//! Providers are built once from the `caches` configuration table and kept in
//! a [`CacheRegistry`]; a broker resolves the provider named by the `cache`
//! setting. An unknown name resolves to no cache at all, which turns the
//! statistics operations into no-ops instead of failing the broker.

use crate::error::{BrokerError, CacheError};
use crate::settings::CacheSettings;
use async_trait::async_trait;
use chrono::Duration;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;

pub use self::memory::InMemoryCache;
#[cfg(feature = "redis")]
pub use self::redis::RedisCache;

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;

/// Name of the cache that is always available after [`CacheRegistry::from_settings`]
pub const DEFAULT_CACHE: &str = "default";

/// Key/value store used for cluster statistics
#[async_trait]
pub trait CacheProvider: Send + Sync {
    /// Name the provider is registered under
    fn name(&self) -> &str;

    /// Look up a value; expired and missing keys both yield `None`
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError>;

    /// Store a value. `None` keeps it until evicted, a non-positive timeout
    /// expires it immediately.
    async fn set(&self, key: &str, value: Value, timeout: Option<Duration>)
        -> Result<(), CacheError>;

    /// Remove a key; removing a missing key succeeds
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

/// Named cache providers, built once at startup
#[derive(Clone, Default)]
pub struct CacheRegistry {
    caches: HashMap<String, Arc<dyn CacheProvider>>,
}

impl CacheRegistry {
    /// Create a new, empty registry.
    pub fn new() -> Self {
        Self {
            caches: HashMap::new(),
        }
    }

    /// Build every provider described in the `caches` table.
    ///
    /// A process-local cache is registered as `default` unless the table
    /// defines one, so the default `cache` setting always resolves.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when a provider cannot be constructed,
    /// e.g. a malformed Redis URL or a Redis cache without Redis support
    /// compiled in.
    pub fn from_settings(caches: &HashMap<String, CacheSettings>) -> Result<Self, BrokerError> {
        let mut registry = Self::new();
        for (name, settings) in caches {
            let provider: Arc<dyn CacheProvider> = match settings {
                CacheSettings::Memory => Arc::new(InMemoryCache::new(name.clone())),
                #[cfg(feature = "redis")]
                CacheSettings::Redis { url } => Arc::new(RedisCache::new(
                    name.clone(),
                    url,
                    crate::connection::PoolConfig::default(),
                )?),
                #[cfg(not(feature = "redis"))]
                CacheSettings::Redis { .. } => {
                    return Err(crate::error::ConfigurationError::Invalid {
                        message: format!(
                            "cache '{}' requires Redis support, which is not compiled in",
                            name
                        ),
                    }
                    .into())
                }
            };
            debug!(cache = %name, "Registered cache provider");
            registry.register(name.clone(), provider);
        }

        if !registry.contains(DEFAULT_CACHE) {
            debug!(cache = DEFAULT_CACHE, "Registered process-local default cache");
            registry.register(DEFAULT_CACHE, Arc::new(InMemoryCache::new(DEFAULT_CACHE)));
        }
        Ok(registry)
    }

    /// Register a provider, replacing any provider with the same name.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        provider: Arc<dyn CacheProvider>,
    ) -> &mut Self {
        self.caches.insert(name.into(), provider);
        self
    }

    /// Look up a provider by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn CacheProvider>> {
        self.caches.get(name).cloned()
    }

    /// Check whether a provider is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.caches.contains_key(name)
    }

    /// Resolve the provider selected by the `cache` setting.
    ///
    /// Never fails: an unset or unknown name yields `None`.
    pub fn resolve(&self, name: Option<&str>) -> Option<Arc<dyn CacheProvider>> {
        let name = match name {
            Some(name) => name,
            None => {
                debug!("No cache configured; cluster statistics are disabled");
                return None;
            }
        };

        let provider = self.get(name);
        if provider.is_none() {
            warn!(
                cache = %name,
                "Cache provider is not configured; cluster statistics are disabled"
            );
        }
        provider
    }
}

impl std::fmt::Debug for CacheRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.caches.keys().collect();
        names.sort();
        f.debug_struct("CacheRegistry")
            .field("caches", &names)
            .finish()
    }
}

