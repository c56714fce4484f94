//! Built-in broker backends.
//!
//! - [`memory`]: process-local queues for tests and single-process use
//! - [`redis`]: Redis lists (feature `redis`)
//! - [`sqs`]: AWS SQS over the HTTP query API (feature `sqs`)

pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;
#[cfg(feature = "sqs")]
pub mod sqs;

pub use self::memory::{MemoryBackend, MemoryStore};
#[cfg(feature = "redis")]
pub use self::redis::RedisBackend;
#[cfg(feature = "sqs")]
pub use self::sqs::SqsBackend;
