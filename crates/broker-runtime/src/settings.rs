//! Broker configuration.
//!
//! [`BrokerSettings`] is the explicit configuration passed to the
//! [`BrokerFactory`](crate::factory::BrokerFactory) and from there into every
//! backend constructor. All fields carry serde defaults, so an empty source
//! produces a usable configuration that selects the Redis backend.
//!
//! Settings are loaded with the `config` crate. Sources are applied in order,
//! later sources overriding earlier ones:
//!
//! 1. An optional file (TOML, YAML or JSON, chosen by extension)
//! 2. Environment variables prefixed `BROKER__` with `__` as the nesting
//!    separator, e.g. `BROKER__SQS__AWS_REGION=eu-west-1`

use crate::error::{ConfigurationError, ValidationError};
use crate::message::QueueName;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "BROKER";

/// Longest long-poll wait SQS accepts, in seconds
pub const SQS_MAX_WAIT_SECONDS: u32 = 20;

/// Top-level broker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerSettings {
    /// Default queue name when none is supplied
    pub cluster_name: String,

    /// Registry name of a custom backend; overrides every other selection
    pub broker_class: Option<String>,

    /// IronMQ backend block
    pub iron_mq: Option<IronMqSettings>,

    /// AWS SQS backend block
    pub sqs: Option<SqsSettings>,

    /// Database alias for the ORM-backed queue
    pub orm: Option<String>,

    /// MongoDB backend block
    pub mongo: Option<MongoSettings>,

    /// Google Cloud Pub/Sub backend block
    pub pubsub: Option<PubSubSettings>,

    /// Redis backend settings, used when no other backend is selected
    pub redis: RedisSettings,

    /// Name of the cache provider backing cluster statistics
    pub cache: Option<String>,

    /// Named cache providers
    pub caches: HashMap<String, CacheSettings>,

    /// Cache key holding the stat key index
    pub q_stat: Option<String>,

    /// Lease/visibility timeout for dequeued tasks, in seconds
    pub retry: u64,

    /// Number of tasks a worker asks for per dequeue
    pub bulk: u32,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            cluster_name: "default".to_string(),
            broker_class: None,
            iron_mq: None,
            sqs: None,
            orm: None,
            mongo: None,
            pubsub: None,
            redis: RedisSettings::default(),
            cache: Some("default".to_string()),
            caches: HashMap::new(),
            q_stat: None,
            retry: 60,
            bulk: 1,
        }
    }
}

impl BrokerSettings {
    /// Load settings from an optional file and `BROKER__*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigurationError> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigurationError::Parsing {
                message: e.to_string(),
            })?;

        let settings: Self =
            config
                .try_deserialize()
                .map_err(|e| ConfigurationError::Parsing {
                    message: e.to_string(),
                })?;

        settings.validate()?;
        Ok(settings)
    }

    /// Check values the type system cannot enforce
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.default_queue()
            .map_err(|e| ConfigurationError::Invalid {
                message: format!("cluster_name: {}", e),
            })?;

        if self.retry == 0 {
            return Err(ConfigurationError::Invalid {
                message: "retry must be greater than zero".to_string(),
            });
        }

        if self.bulk == 0 {
            return Err(ConfigurationError::Invalid {
                message: "bulk must be greater than zero".to_string(),
            });
        }

        if self.redis.pool_size == 0 {
            return Err(ConfigurationError::Invalid {
                message: "redis.pool_size must be greater than zero".to_string(),
            });
        }

        if let Some(sqs) = &self.sqs {
            sqs.validate()?;
        }

        Ok(())
    }

    /// Queue name used when the caller does not name one
    pub fn default_queue(&self) -> Result<QueueName, ValidationError> {
        QueueName::new(self.cluster_name.clone())
    }

    /// Cache key under which the stat key index is stored
    pub fn q_stat(&self) -> String {
        self.q_stat
            .clone()
            .unwrap_or_else(|| format!("broker:{}:cluster", self.cluster_name))
    }
}

/// IronMQ connection block
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IronMqSettings {
    pub host: Option<String>,
    pub token: Option<String>,
    pub project_id: Option<String>,
}

/// AWS SQS connection block
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SqsSettings {
    pub aws_region: String,
    pub aws_access_key_id: Option<String>,
    pub aws_secret_access_key: Option<String>,
    /// Overrides `https://sqs.{region}.amazonaws.com` (LocalStack, ElasticMQ)
    pub endpoint_url: Option<String>,
    /// Long-poll wait for receives; SQS caps this at 20 seconds
    pub receive_message_wait_time_seconds: Option<u32>,
}

impl Default for SqsSettings {
    fn default() -> Self {
        Self {
            aws_region: "us-east-1".to_string(),
            aws_access_key_id: None,
            aws_secret_access_key: None,
            endpoint_url: None,
            receive_message_wait_time_seconds: None,
        }
    }
}

impl SqsSettings {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.aws_region.is_empty() {
            return Err(ConfigurationError::Invalid {
                message: "sqs.aws_region cannot be empty".to_string(),
            });
        }

        if let Some(wait) = self.receive_message_wait_time_seconds {
            if wait > SQS_MAX_WAIT_SECONDS {
                return Err(ConfigurationError::Invalid {
                    message: format!(
                        "sqs.receive_message_wait_time_seconds must be at most {} (got {})",
                        SQS_MAX_WAIT_SECONDS, wait
                    ),
                });
            }
        }

        Ok(())
    }
}

impl fmt::Debug for SqsSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqsSettings")
            .field("aws_region", &self.aws_region)
            .field("aws_access_key_id", &self.aws_access_key_id)
            .field(
                "aws_secret_access_key",
                &self.aws_secret_access_key.as_ref().map(|_| "<redacted>"),
            )
            .field("endpoint_url", &self.endpoint_url)
            .field(
                "receive_message_wait_time_seconds",
                &self.receive_message_wait_time_seconds,
            )
            .finish()
    }
}

/// MongoDB connection block
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MongoSettings {
    pub uri: Option<String>,
    pub database: Option<String>,
}

/// Google Cloud Pub/Sub connection block
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PubSubSettings {
    pub project_id: Option<String>,
    pub credentials_path: Option<String>,
}

/// Redis backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisSettings {
    pub url: String,
    /// Prefix of the list key, which is `{key_prefix}:{queue}:q`
    pub key_prefix: String,
    /// Maximum open connections per backend
    pub pool_size: u32,
    /// How long an operation waits for a usable connection, in milliseconds
    pub connection_timeout_ms: u64,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379/0".to_string(),
            key_prefix: "broker".to_string(),
            pool_size: 10,
            connection_timeout_ms: 5_000,
        }
    }
}

#[cfg(feature = "redis")]
impl RedisSettings {
    /// Pool sizing derived from these settings
    pub fn pool_config(&self) -> crate::connection::PoolConfig {
        crate::connection::PoolConfig {
            max_size: self.pool_size,
            connection_timeout: std::time::Duration::from_millis(self.connection_timeout_ms),
        }
    }
}

/// A named cache provider definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum CacheSettings {
    /// Process-local cache
    Memory,
    /// Redis-backed cache
    Redis { url: String },
}

#[cfg(test)]
#[path = "settings_tests.rs"]
mod tests;
