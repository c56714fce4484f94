//! A broker bound to one queue.
//!
//! [`Broker`] pairs a backend with the queue name it serves and the stats
//! tracker for the cluster. Queue operations go straight to the backend;
//! stats go to the cache. Neither the connection nor the cache handle can
//! leave the process: [`Broker::snapshot`] captures what is needed to build
//! an equivalent broker elsewhere with
//! [`BrokerFactory::rehydrate`](crate::factory::BrokerFactory::rehydrate).

use crate::backend::BrokerBackend;
use crate::error::BrokerError;
use crate::message::{DequeuedTask, QueueName, TaskId};
use crate::stats::StatsTracker;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

#[cfg(test)]
#[path = "broker_tests.rs"]
mod tests;

/// Serializable state of a [`Broker`]
///
/// The only part of a broker that crosses a process or worker boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerSnapshot {
    pub list_key: QueueName,
    pub info: Option<String>,
}

/// Queue operations and cluster stats for one queue
pub struct Broker {
    list_key: QueueName,
    backend: Box<dyn BrokerBackend>,
    stats: StatsTracker,
    info: Option<String>,
}

impl Broker {
    /// Bind a backend to its queue; `info` is read from the backend once
    pub fn new(list_key: QueueName, backend: Box<dyn BrokerBackend>, stats: StatsTracker) -> Self {
        let info = backend.info();
        Self {
            list_key,
            backend,
            stats,
            info,
        }
    }

    /// Rebuild from a snapshot, keeping the snapshot's `info`
    pub(crate) fn from_snapshot(
        snapshot: BrokerSnapshot,
        backend: Box<dyn BrokerBackend>,
        stats: StatsTracker,
    ) -> Self {
        Self {
            list_key: snapshot.list_key,
            backend,
            stats,
            info: snapshot.info,
        }
    }

    /// Name of the queue this broker serves
    pub fn list_key(&self) -> &QueueName {
        &self.list_key
    }

    /// Backend name, e.g. `redis`
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn backend(&self) -> &dyn BrokerBackend {
        self.backend.as_ref()
    }

    pub fn stats(&self) -> &StatsTracker {
        &self.stats
    }

    /// Capture the state needed to rebuild this broker elsewhere
    pub fn snapshot(&self) -> BrokerSnapshot {
        BrokerSnapshot {
            list_key: self.list_key.clone(),
            info: self.info.clone(),
        }
    }

    // ------------------------------------------------------------------------
    // Queue operations
    // ------------------------------------------------------------------------

    #[instrument(skip(self, message), fields(queue = %self.list_key, backend = self.backend.name()))]
    pub async fn enqueue(&self, message: &str) -> Result<TaskId, BrokerError> {
        let task_id = self.backend.enqueue(message).await?;
        debug!(task_id = %task_id, "Task enqueued");
        Ok(task_id)
    }

    #[instrument(skip(self), fields(queue = %self.list_key, backend = self.backend.name()))]
    pub async fn dequeue(&self) -> Result<Option<DequeuedTask>, BrokerError> {
        self.backend.dequeue().await
    }

    /// Take up to `max` tasks in one call
    pub async fn dequeue_batch(&self, max: u32) -> Result<Vec<DequeuedTask>, BrokerError> {
        self.backend.dequeue_batch(max).await
    }

    pub async fn queue_size(&self) -> Result<u64, BrokerError> {
        self.backend.queue_size().await
    }

    pub async fn lock_size(&self) -> Result<u64, BrokerError> {
        self.backend.lock_size().await
    }

    /// Destroy the queue and everything in it
    #[instrument(skip(self), fields(queue = %self.list_key, backend = self.backend.name()))]
    pub async fn delete_queue(&self) -> Result<(), BrokerError> {
        self.backend.delete_queue().await
    }

    #[instrument(skip(self), fields(queue = %self.list_key, backend = self.backend.name()))]
    pub async fn purge_queue(&self) -> Result<(), BrokerError> {
        self.backend.purge_queue().await
    }

    pub async fn delete(&self, task_id: &TaskId) -> Result<(), BrokerError> {
        self.backend.delete(task_id).await
    }

    pub async fn acknowledge(&self, task_id: &TaskId) -> Result<(), BrokerError> {
        self.backend.acknowledge(task_id).await
    }

    pub async fn fail(&self, task_id: &TaskId) -> Result<(), BrokerError> {
        self.backend.fail(task_id).await
    }

    /// Whether the backend is reachable; never fails
    pub async fn ping(&self) -> bool {
        self.backend.ping().await
    }

    /// Backend description captured at construction
    pub fn info(&self) -> Option<&str> {
        self.info.as_deref()
    }

    // ------------------------------------------------------------------------
    // Cluster stats
    // ------------------------------------------------------------------------

    pub async fn set_stat(
        &self,
        key: &str,
        value: Value,
        timeout: Option<Duration>,
    ) -> Result<(), BrokerError> {
        self.stats.set_stat(key, value, timeout).await
    }

    pub async fn get_stat(&self, key: &str) -> Result<Option<Value>, BrokerError> {
        self.stats.get_stat(key).await
    }

    pub async fn get_stats(&self, pattern: &str) -> Result<Option<Vec<Value>>, BrokerError> {
        self.stats.get_stats(pattern).await
    }
}

impl std::fmt::Debug for Broker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broker")
            .field("list_key", &self.list_key)
            .field("backend", &self.backend.name())
            .field("stats", &self.stats)
            .field("info", &self.info)
            .finish()
    }
}
