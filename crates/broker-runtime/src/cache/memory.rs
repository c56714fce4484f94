//! In-memory cache provider for testing and single-process deployments.

use super::CacheProvider;
use crate::error::CacheError;
use crate::message::Timestamp;
use async_trait::async_trait;
use chrono::Duration;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

/// A cached value with its expiry
#[derive(Clone)]
struct CacheEntry {
    value: Value,
    expires_at: Option<Timestamp>,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(ref expires_at) => Timestamp::now() >= *expires_at,
            None => false,
        }
    }
}

/// Thread-safe in-process cache
///
/// Clones share the same storage, so one instance can be handed to several
/// brokers (or registered under several names) and they all observe the same
/// values.
#[derive(Clone)]
pub struct InMemoryCache {
    name: String,
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

impl InMemoryCache {
    /// Create an empty cache
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of live (unexpired) entries
    pub fn len(&self) -> usize {
        self.read()
            .map(|entries| entries.values().filter(|e| !e.is_expired()).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, CacheEntry>>, CacheError> {
        self.entries.read().map_err(|_| self.poisoned())
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, CacheEntry>>, CacheError> {
        self.entries.write().map_err(|_| self.poisoned())
    }

    fn poisoned(&self) -> CacheError {
        CacheError::Unavailable {
            cache: self.name.clone(),
            message: "cache lock poisoned".to_string(),
        }
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new("default")
    }
}

#[async_trait]
impl CacheProvider for InMemoryCache {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        {
            let entries = self.read()?;
            match entries.get(key) {
                None => return Ok(None),
                Some(entry) if !entry.is_expired() => return Ok(Some(entry.value.clone())),
                Some(_) => {}
            }
        }

        // Expired; drop it so the map does not grow without bound
        let mut entries = self.write()?;
        if entries.get(key).is_some_and(|e| e.is_expired()) {
            entries.remove(key);
        }
        Ok(None)
    }

    async fn set(
        &self,
        key: &str,
        value: Value,
        timeout: Option<Duration>,
    ) -> Result<(), CacheError> {
        let mut entries = self.write()?;

        if timeout.is_some_and(|t| t <= Duration::zero()) {
            entries.remove(key);
            return Ok(());
        }

        let expires_at =
            timeout.map(|t| Timestamp::from_datetime(Timestamp::now().as_datetime() + t));
        entries.insert(key.to_string(), CacheEntry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.write()?.remove(key);
        Ok(())
    }
}
