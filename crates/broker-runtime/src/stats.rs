//! Cluster statistics published through the configured cache.
//!
//! Every stat is stored under its own cache key. The set of keys published so
//! far is kept in a single index entry (the `q_stat` key) so that monitoring
//! can enumerate stats without scanning the cache. Stats expire on their own
//! timeouts; the index is pruned lazily when [`StatsTracker::get_stats`]
//! notices a key whose value is gone.
//!
//! Updates to the index are a plain read-modify-write. Two writers racing on
//! a new key can lose one of the additions; the key stays readable with
//! [`StatsTracker::get_stat`] but is missing from listings until it is set
//! again.

use crate::cache::CacheProvider;
use crate::error::BrokerError;
use chrono::Duration;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

#[cfg(test)]
#[path = "stats_tests.rs"]
mod tests;

/// Reads and writes cluster stats for one broker
#[derive(Clone)]
pub struct StatsTracker {
    cache: Option<Arc<dyn CacheProvider>>,
    index_key: String,
}

impl StatsTracker {
    /// Create a tracker; without a cache every operation is a no-op
    pub fn new(cache: Option<Arc<dyn CacheProvider>>, index_key: impl Into<String>) -> Self {
        Self {
            cache,
            index_key: index_key.into(),
        }
    }

    /// Whether a cache is attached
    pub fn is_enabled(&self) -> bool {
        self.cache.is_some()
    }

    /// Cache key holding the stat key index
    pub fn index_key(&self) -> &str {
        &self.index_key
    }

    /// Publish a stat and record its key in the index.
    ///
    /// The index itself never expires; `timeout` applies only to the value.
    pub async fn set_stat(
        &self,
        key: &str,
        value: Value,
        timeout: Option<Duration>,
    ) -> Result<(), BrokerError> {
        let cache = match &self.cache {
            Some(cache) => cache,
            None => return Ok(()),
        };

        let mut keys = self.read_index(cache.as_ref()).await?;
        if !keys.iter().any(|k| k == key) {
            keys.push(key.to_string());
            debug!(key = %key, index = %self.index_key, "Added stat key to index");
        }
        // Written on every publish; an evicted index reappears here
        self.write_index(cache.as_ref(), &keys).await?;

        cache.set(key, value, timeout).await?;
        Ok(())
    }

    /// Look up a single stat
    pub async fn get_stat(&self, key: &str) -> Result<Option<Value>, BrokerError> {
        match &self.cache {
            Some(cache) => Ok(cache.get(key).await?),
            None => Ok(None),
        }
    }

    /// Collect every live stat in index order.
    ///
    /// Keys whose values have expired or been removed are dropped from the
    /// index as a side effect. `pattern` is accepted for compatibility and
    /// does not filter the result.
    pub async fn get_stats(&self, pattern: &str) -> Result<Option<Vec<Value>>, BrokerError> {
        let cache = match &self.cache {
            Some(cache) => cache,
            None => return Ok(None),
        };

        let keys = self.read_index(cache.as_ref()).await?;
        if keys.is_empty() {
            return Ok(Some(Vec::new()));
        }

        let mut stats = Vec::with_capacity(keys.len());
        let mut live = Vec::with_capacity(keys.len());
        for key in keys.iter() {
            match cache.get(key).await? {
                Some(value) => {
                    stats.push(value);
                    live.push(key.clone());
                }
                None => debug!(key = %key, "Pruning expired stat key"),
            }
        }

        self.write_index(cache.as_ref(), &live).await?;
        debug!(
            pattern = %pattern,
            found = stats.len(),
            pruned = keys.len() - live.len(),
            "Collected cluster stats"
        );
        Ok(Some(stats))
    }

    /// The current index, or `None` without a cache
    pub async fn stat_keys(&self) -> Result<Option<Vec<String>>, BrokerError> {
        match &self.cache {
            Some(cache) => Ok(Some(self.read_index(cache.as_ref()).await?)),
            None => Ok(None),
        }
    }

    async fn read_index(&self, cache: &dyn CacheProvider) -> Result<Vec<String>, BrokerError> {
        let raw = match cache.get(&self.index_key).await? {
            Some(raw) => raw,
            None => return Ok(Vec::new()),
        };

        match serde_json::from_value::<Vec<String>>(raw) {
            Ok(keys) => Ok(keys),
            Err(e) => {
                warn!(
                    index = %self.index_key,
                    error = %e,
                    "Stat key index is malformed; treating it as empty"
                );
                Ok(Vec::new())
            }
        }
    }

    async fn write_index(
        &self,
        cache: &dyn CacheProvider,
        keys: &[String],
    ) -> Result<(), BrokerError> {
        let value = serde_json::to_value(keys)?;
        cache.set(&self.index_key, value, None).await?;
        Ok(())
    }
}

impl std::fmt::Debug for StatsTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatsTracker")
            .field("cache", &self.cache.as_ref().map(|c| c.name().to_string()))
            .field("index_key", &self.index_key)
            .finish()
    }
}
