//! Redis-backed cache provider.
//!
//! Values are stored as JSON strings. Timeouts map to `SET ... EX`, rounded
//! up to whole seconds since that is the resolution Redis offers.

use super::CacheProvider;
use crate::connection::{cache_error, PoolConfig, RedisConnection, RedisPool};
use crate::error::{BrokerError, CacheError};
use ::redis::AsyncCommands;
use async_trait::async_trait;
use chrono::Duration;
use serde_json::Value;

#[cfg(test)]
#[path = "redis_tests.rs"]
mod tests;

/// Cache provider storing values in Redis
#[derive(Debug)]
pub struct RedisCache {
    name: String,
    pool: RedisPool,
}

impl RedisCache {
    /// Create the provider; the pool connects on first use
    pub fn new(name: impl Into<String>, url: &str, config: PoolConfig) -> Result<Self, BrokerError> {
        Ok(Self {
            name: name.into(),
            pool: RedisPool::open(url, config)?,
        })
    }

    async fn connection(&self) -> Result<RedisConnection<'_>, CacheError> {
        self.pool.get().await.map_err(|e| cache_error(&self.name, e))
    }
}

/// Whole seconds for `SET EX`, never less than one
fn expiry_seconds(timeout: Duration) -> u64 {
    let millis = timeout.num_milliseconds().max(1) as u64;
    millis.div_ceil(1000)
}

#[async_trait]
impl CacheProvider for RedisCache {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = conn
            .get(key)
            .await
            .map_err(|e| cache_error(&self.name, e))?;

        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn set(
        &self,
        key: &str,
        value: Value,
        timeout: Option<Duration>,
    ) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let encoded = serde_json::to_string(&value)?;

        match timeout {
            Some(timeout) if timeout <= Duration::zero() => {
                let _: i64 = conn
                    .del(key)
                    .await
                    .map_err(|e| cache_error(&self.name, e))?;
            }
            Some(timeout) => {
                let _: () = conn
                    .set_ex(key, encoded, expiry_seconds(timeout))
                    .await
                    .map_err(|e| cache_error(&self.name, e))?;
            }
            None => {
                let _: () = conn
                    .set(key, encoded)
                    .await
                    .map_err(|e| cache_error(&self.name, e))?;
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let _: i64 = conn
            .del(key)
            .await
            .map_err(|e| cache_error(&self.name, e))?;
        Ok(())
    }
}
