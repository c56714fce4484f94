//! In-memory broker backend for testing and development.
//!
//! Queues live in a [`MemoryStore`] shared by every backend built from it, so
//! two brokers on the same queue name see the same tasks. The backend
//! implements the full contract:
//!
//! - FIFO delivery of pending tasks
//! - a lease of `retry` seconds on every dequeued task; expired leases make
//!   the task visible again at the head of the queue
//! - a dead letter list for failed tasks
//!
//! The store can be switched off with [`MemoryStore::disconnect`] to exercise
//! connection failure handling in callers.

use crate::backend::BrokerBackend;
use crate::error::BrokerError;
use crate::message::{DequeuedTask, QueueName, TaskId, Timestamp};
use async_trait::async_trait;
use chrono::Duration;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockWriteGuard};
use tracing::{debug, warn};

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

const BACKEND_NAME: &str = "memory";

// ============================================================================
// Internal Storage Structures
// ============================================================================

/// A task stored in the queue
#[derive(Clone)]
struct StoredTask {
    task_id: TaskId,
    message: String,
    delivery_count: u32,
}

/// A task handed out and not yet acknowledged
struct InFlightTask {
    task: StoredTask,
    lease_expires_at: Timestamp,
}

impl InFlightTask {
    fn is_expired(&self) -> bool {
        Timestamp::now() >= self.lease_expires_at
    }
}

/// Internal state for a single queue
#[derive(Default)]
struct MemoryQueue {
    pending: VecDeque<StoredTask>,
    in_flight: HashMap<TaskId, InFlightTask>,
    dead_letter: VecDeque<StoredTask>,
}

impl MemoryQueue {
    /// Return tasks with expired leases to the head of the queue
    fn release_expired(&mut self) {
        let expired_ids: Vec<TaskId> = self
            .in_flight
            .iter()
            .filter(|(_, entry)| entry.is_expired())
            .map(|(task_id, _)| task_id.clone())
            .collect();
        let mut expired: Vec<InFlightTask> = expired_ids
            .iter()
            .filter_map(|task_id| self.in_flight.remove(task_id))
            .collect();

        // Oldest lease ends up first
        expired.sort_by(|a, b| b.lease_expires_at.cmp(&a.lease_expires_at));
        for entry in expired {
            debug!(task_id = %entry.task.task_id, "Lease expired; task is visible again");
            self.pending.push_front(entry.task);
        }
    }

    fn active_leases(&self) -> usize {
        self.in_flight.values().filter(|e| !e.is_expired()).count()
    }
}

// ============================================================================
// MemoryStore
// ============================================================================

/// Shared storage for in-memory queues
///
/// Cloning the store is cheap; clones share queues and connection state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    queues: Arc<RwLock<HashMap<QueueName, MemoryQueue>>>,
    disconnected: Arc<AtomicBool>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail as if the transport went away
    pub fn disconnect(&self) {
        warn!("Memory store disconnected");
        self.disconnected.store(true, Ordering::SeqCst);
    }

    /// Undo [`MemoryStore::disconnect`]
    pub fn reconnect(&self) {
        debug!("Memory store reconnected");
        self.disconnected.store(false, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        !self.disconnected.load(Ordering::SeqCst)
    }

    /// Names of queues that currently exist
    pub fn queue_names(&self) -> Vec<QueueName> {
        self.queues
            .read()
            .map(|queues| queues.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<QueueName, MemoryQueue>>, BrokerError> {
        if !self.is_connected() {
            return Err(BrokerError::ConnectionFailed {
                message: "memory store is disconnected".to_string(),
            });
        }

        self.queues.write().map_err(|_| BrokerError::BackendError {
            backend: BACKEND_NAME.to_string(),
            code: "LockPoisoned".to_string(),
            message: "memory store lock was poisoned".to_string(),
        })
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("queues", &self.queue_names().len())
            .field("connected", &self.is_connected())
            .finish()
    }
}

// ============================================================================
// MemoryBackend
// ============================================================================

/// Broker backend over a [`MemoryStore`]
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    queue: QueueName,
    store: MemoryStore,
    lease: Duration,
}

impl MemoryBackend {
    /// Create a backend for one queue; `lease` is how long a dequeued task
    /// stays invisible before it is delivered again
    pub fn new(queue: QueueName, store: MemoryStore, lease: Duration) -> Self {
        Self { queue, store, lease }
    }

    pub fn queue(&self) -> &QueueName {
        &self.queue
    }

    /// Number of failed tasks kept in the dead letter list
    pub fn dead_letter_size(&self) -> Result<u64, BrokerError> {
        self.with_queue(|queue| Ok(queue.dead_letter.len() as u64))
    }

    /// Run `f` against this backend's queue, creating it on first use
    fn with_queue<T>(
        &self,
        f: impl FnOnce(&mut MemoryQueue) -> Result<T, BrokerError>,
    ) -> Result<T, BrokerError> {
        let mut queues = self.store.write()?;
        let queue = queues.entry(self.queue.clone()).or_default();
        queue.release_expired();
        f(queue)
    }

    fn task_not_found(task_id: &TaskId) -> BrokerError {
        BrokerError::TaskNotFound {
            task_id: task_id.to_string(),
        }
    }
}

#[async_trait]
impl BrokerBackend for MemoryBackend {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    async fn enqueue(&self, message: &str) -> Result<TaskId, BrokerError> {
        self.with_queue(|queue| {
            let task_id = TaskId::generate();
            queue.pending.push_back(StoredTask {
                task_id: task_id.clone(),
                message: message.to_string(),
                delivery_count: 0,
            });
            debug!(queue = %self.queue, task_id = %task_id, "Enqueued task");
            Ok(task_id)
        })
    }

    async fn dequeue(&self) -> Result<Option<DequeuedTask>, BrokerError> {
        self.with_queue(|queue| {
            let mut task = match queue.pending.pop_front() {
                Some(task) => task,
                None => return Ok(None),
            };

            task.delivery_count += 1;
            let lease_expires_at =
                Timestamp::from_datetime(Timestamp::now().as_datetime() + self.lease);
            let dequeued = DequeuedTask::new(Some(task.task_id.clone()), task.message.clone());

            debug!(
                queue = %self.queue,
                task_id = %task.task_id,
                delivery_count = task.delivery_count,
                "Dequeued task"
            );
            queue.in_flight.insert(
                task.task_id.clone(),
                InFlightTask {
                    task,
                    lease_expires_at,
                },
            );
            Ok(Some(dequeued))
        })
    }

    async fn queue_size(&self) -> Result<u64, BrokerError> {
        self.with_queue(|queue| Ok(queue.pending.len() as u64))
    }

    async fn lock_size(&self) -> Result<u64, BrokerError> {
        self.with_queue(|queue| Ok(queue.active_leases() as u64))
    }

    async fn delete_queue(&self) -> Result<(), BrokerError> {
        let mut queues = self.store.write()?;
        queues.remove(&self.queue);
        debug!(queue = %self.queue, "Deleted queue");
        Ok(())
    }

    async fn purge_queue(&self) -> Result<(), BrokerError> {
        self.with_queue(|queue| {
            let purged = queue.pending.len();
            queue.pending.clear();
            debug!(queue = %self.queue, purged, "Purged queue");
            Ok(())
        })
    }

    async fn delete(&self, task_id: &TaskId) -> Result<(), BrokerError> {
        self.with_queue(|queue| {
            if queue.in_flight.remove(task_id).is_some() {
                return Ok(());
            }

            let before = queue.pending.len();
            queue.pending.retain(|task| &task.task_id != task_id);
            if queue.pending.len() < before {
                Ok(())
            } else {
                Err(Self::task_not_found(task_id))
            }
        })
    }

    async fn acknowledge(&self, task_id: &TaskId) -> Result<(), BrokerError> {
        self.with_queue(|queue| match queue.in_flight.remove(task_id) {
            Some(_) => Ok(()),
            None => Err(Self::task_not_found(task_id)),
        })
    }

    async fn fail(&self, task_id: &TaskId) -> Result<(), BrokerError> {
        self.with_queue(|queue| match queue.in_flight.remove(task_id) {
            Some(entry) => {
                warn!(
                    queue = %self.queue,
                    task_id = %task_id,
                    delivery_count = entry.task.delivery_count,
                    "Task failed; moved to dead letter list"
                );
                queue.dead_letter.push_back(entry.task);
                Ok(())
            }
            None => Err(Self::task_not_found(task_id)),
        })
    }

    async fn ping(&self) -> bool {
        self.store.is_connected()
    }

    fn info(&self) -> Option<String> {
        Some("Memory".to_string())
    }
}
