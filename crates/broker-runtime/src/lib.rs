//! # Broker Runtime
//!
//! Multi-backend task broker with cluster statistics. A broker is bound to
//! one named queue and exposes the same operations whatever transport sits
//! behind it: Redis lists, AWS SQS, an in-memory store, or any backend
//! registered by the application.
//!
//! This library provides:
//! - The broker contract every backend implements
//! - A factory choosing the backend from settings with a fixed precedence
//! - Cluster statistics published through a named cache
//! - Snapshots for rebuilding a broker on the far side of a process boundary
//!
//! ## Module Organization
//!
//! - [`backend`] - The [`BrokerBackend`] trait and backend selection
//! - [`backends`] - Built-in memory, Redis and SQS backends
//! - [`broker`] - [`Broker`] and [`BrokerSnapshot`]
//! - [`cache`] - Cache providers backing statistics
//! - [`factory`] - [`BrokerFactory`]
//! - [`registry`] - Backend constructors keyed by name
//! - [`settings`] - [`BrokerSettings`] and loading from file and environment
//! - [`stats`] - The [`StatsTracker`]
//! - [`error`] - Error types for all broker operations
//!
//! ## Example
//!
//! ```no_run
//! use broker_runtime::{BrokerFactory, BrokerSettings};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let factory = BrokerFactory::from_settings(BrokerSettings::default())?;
//! let broker = factory.get_broker(Some("emails"))?;
//!
//! broker.enqueue("{\"to\":\"ops@example.com\"}").await?;
//! if let Some(task) = broker.dequeue().await? {
//!     // ... process task.message ...
//!     if let Some(task_id) = &task.task_id {
//!         broker.acknowledge(task_id).await?;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod backends;
pub mod broker;
pub mod cache;
#[cfg(feature = "redis")]
pub mod connection;
pub mod error;
pub mod factory;
pub mod message;
pub mod registry;
pub mod settings;
pub mod stats;

// Re-export commonly used types at crate root for convenience
pub use backend::{BackendKind, BrokerBackend};
pub use backends::{MemoryBackend, MemoryStore};
#[cfg(feature = "redis")]
pub use backends::RedisBackend;
#[cfg(feature = "sqs")]
pub use backends::SqsBackend;
pub use broker::{Broker, BrokerSnapshot};
pub use cache::{CacheProvider, CacheRegistry, InMemoryCache};
#[cfg(feature = "redis")]
pub use cache::RedisCache;
pub use error::{BrokerError, CacheError, ConfigurationError, ErrorKind, ValidationError};
pub use factory::BrokerFactory;
pub use message::{DequeuedTask, QueueName, TaskId, Timestamp};
pub use registry::{BackendConstructor, BackendRegistry};
pub use settings::{
    BrokerSettings, CacheSettings, IronMqSettings, MongoSettings, PubSubSettings, RedisSettings,
    SqsSettings,
};
pub use stats::StatsTracker;

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
