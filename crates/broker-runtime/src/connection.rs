//! Pooled Redis connections shared by the Redis backend and cache.
//!
//! The pool is built on first use, so constructing a backend never touches
//! the network. Connections are checked with `PING` as they are handed out;
//! one the server has dropped is discarded and replaced by a fresh
//! connection instead of failing every later call.

use crate::error::{BrokerError, CacheError, ConfigurationError};
use ::redis::RedisError;
use bb8_redis::bb8::{ErrorSink, Pool, PooledConnection, RunError};
use bb8_redis::RedisConnectionManager;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

#[cfg(test)]
#[path = "connection_tests.rs"]
mod tests;

/// A connection checked out of a [`RedisPool`]
pub type RedisConnection<'a> = PooledConnection<'a, RedisConnectionManager>;

/// Sizing and timeouts for a [`RedisPool`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Maximum number of open connections
    pub max_size: u32,
    /// How long a caller waits for a usable connection
    pub connection_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 10,
            connection_timeout: Duration::from_secs(5),
        }
    }
}

/// A Redis connection pool built on first use
pub struct RedisPool {
    manager: RedisConnectionManager,
    config: PoolConfig,
    url: String,
    pool: OnceCell<Pool<RedisConnectionManager>>,
}

impl RedisPool {
    /// Parse the URL without connecting
    pub fn open(url: &str, config: PoolConfig) -> Result<Self, ConfigurationError> {
        if config.max_size == 0 {
            return Err(ConfigurationError::Invalid {
                message: "redis pool size must be greater than zero".to_string(),
            });
        }

        let manager = RedisConnectionManager::new(url).map_err(|e| ConfigurationError::Invalid {
            message: format!("invalid redis url: {} - {}", redacted(url), e),
        })?;

        Ok(Self {
            manager,
            config,
            url: redacted(url),
            pool: OnceCell::new(),
        })
    }

    /// Connection URL with credentials masked
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn config(&self) -> PoolConfig {
        self.config
    }

    /// Whether the pool has been built yet
    pub fn is_started(&self) -> bool {
        self.pool.initialized()
    }

    /// Check out a connection, building the pool if needed
    pub async fn get(&self) -> Result<RedisConnection<'_>, RunError<RedisError>> {
        let pool = self
            .pool
            .get_or_try_init(|| async {
                debug!(
                    url = %self.url,
                    max_size = self.config.max_size,
                    "Building Redis connection pool"
                );
                Pool::builder()
                    .max_size(self.config.max_size)
                    .connection_timeout(self.config.connection_timeout)
                    .test_on_check_out(true)
                    .error_sink(Box::new(LogErrorSink {
                        url: self.url.clone(),
                    }))
                    .build(self.manager.clone())
                    .await
            })
            .await
            .map_err(RunError::User)?;

        pool.get().await
    }
}

impl std::fmt::Debug for RedisPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisPool")
            .field("url", &self.url)
            .field("config", &self.config)
            .field("started", &self.is_started())
            .finish()
    }
}

/// Logs connection failures the pool retries internally
#[derive(Debug, Clone)]
struct LogErrorSink {
    url: String,
}

impl ErrorSink<RedisError> for LogErrorSink {
    fn sink(&self, error: RedisError) {
        warn!(url = %self.url, error = %error, "Redis connection error");
    }

    fn boxed_clone(&self) -> Box<dyn ErrorSink<RedisError>> {
        Box::new(self.clone())
    }
}

/// Map a Redis error onto the broker error kinds
pub fn broker_error(err: RedisError) -> BrokerError {
    if err.is_connection_refusal() || err.is_connection_dropped() || err.is_io_error() {
        BrokerError::ConnectionFailed {
            message: err.to_string(),
        }
    } else if err.is_timeout() {
        BrokerError::Timeout {
            duration: chrono::Duration::zero(),
        }
    } else if err.kind() == ::redis::ErrorKind::AuthenticationFailed {
        BrokerError::AuthenticationFailed {
            message: err.to_string(),
        }
    } else {
        BrokerError::BackendError {
            backend: "redis".to_string(),
            code: format!("{:?}", err.kind()),
            message: err.to_string(),
        }
    }
}

/// Map a failed checkout onto the broker error kinds
///
/// The pool keeps retrying refused connections until its timeout, so a
/// timed-out checkout means the server could not be reached.
pub fn checkout_error(err: RunError<RedisError>) -> BrokerError {
    match err {
        RunError::User(e) => broker_error(e),
        RunError::TimedOut => BrokerError::ConnectionFailed {
            message: "timed out waiting for a Redis connection".to_string(),
        },
    }
}

/// Map a Redis or checkout error onto a cache error
pub fn cache_error(cache: &str, err: impl std::fmt::Display) -> CacheError {
    CacheError::Unavailable {
        cache: cache.to_string(),
        message: err.to_string(),
    }
}

/// Redact credentials in logs
pub fn redacted(url: &str) -> String {
    if let Some(idx) = url.find('@') {
        let head = &url[..idx];
        if let Some(scheme_end) = head.find("://") {
            let scheme_end = scheme_end + 3;
            return format!("{}***:***{}", &url[..scheme_end], &url[idx..]);
        }
    }
    url.to_string()
}
