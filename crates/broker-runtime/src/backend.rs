//! The broker contract implemented by every queue backend.
//!
//! A backend owns the transport-specific connection for one queue. Operations
//! a backend does not override fail with [`BrokerError::NotImplemented`] so a
//! partially implemented backend can never report success for work it did not
//! do.

use crate::error::BrokerError;
use crate::message::{DequeuedTask, TaskId};
use crate::settings::BrokerSettings;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[cfg(test)]
#[path = "backend_tests.rs"]
mod tests;

/// Interface implemented by specific queue backends (Redis, SQS, etc.)
#[async_trait]
pub trait BrokerBackend: Send + Sync {
    /// Short backend name used in logs and errors
    fn name(&self) -> &str;

    /// Put a task on the queue
    async fn enqueue(&self, _message: &str) -> Result<TaskId, BrokerError> {
        Err(BrokerError::not_implemented("enqueue", self.name()))
    }

    /// Take the next task, if any, without waiting for one to arrive
    async fn dequeue(&self) -> Result<Option<DequeuedTask>, BrokerError> {
        Err(BrokerError::not_implemented("dequeue", self.name()))
    }

    /// Take up to `max` tasks
    ///
    /// The default polls `dequeue` until the queue is empty or `max` tasks
    /// were collected.
    async fn dequeue_batch(&self, max: u32) -> Result<Vec<DequeuedTask>, BrokerError> {
        let mut tasks = Vec::new();
        while tasks.len() < max as usize {
            match self.dequeue().await? {
                Some(task) => tasks.push(task),
                None => break,
            }
        }
        Ok(tasks)
    }

    /// Number of tasks waiting to be dequeued
    async fn queue_size(&self) -> Result<u64, BrokerError> {
        Err(BrokerError::not_implemented("queue_size", self.name()))
    }

    /// Number of dequeued tasks awaiting acknowledgement
    async fn lock_size(&self) -> Result<u64, BrokerError> {
        Err(BrokerError::not_implemented("lock_size", self.name()))
    }

    /// Destroy the queue and its backlog
    async fn delete_queue(&self) -> Result<(), BrokerError> {
        Err(BrokerError::not_implemented("delete_queue", self.name()))
    }

    /// Drop all pending tasks, keeping the queue
    async fn purge_queue(&self) -> Result<(), BrokerError> {
        Err(BrokerError::not_implemented("purge_queue", self.name()))
    }

    /// Remove a task whether or not it is locked
    async fn delete(&self, _task_id: &TaskId) -> Result<(), BrokerError> {
        Err(BrokerError::not_implemented("delete", self.name()))
    }

    /// Confirm a task was processed and release its lock
    async fn acknowledge(&self, _task_id: &TaskId) -> Result<(), BrokerError> {
        Err(BrokerError::not_implemented("acknowledge", self.name()))
    }

    /// Mark a dequeued task as failed
    async fn fail(&self, _task_id: &TaskId) -> Result<(), BrokerError> {
        Err(BrokerError::not_implemented("fail", self.name()))
    }

    /// Check that the underlying connection is usable.
    ///
    /// Must not propagate errors; every failure is reported as `false`.
    async fn ping(&self) -> bool;

    /// Human-readable backend description
    fn info(&self) -> Option<String> {
        None
    }
}

impl std::fmt::Debug for dyn BrokerBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerBackend")
            .field("name", &self.name())
            .field("info", &self.info())
            .finish()
    }
}

/// The backend a configuration selects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendKind {
    /// A backend registered under a custom name
    Custom(String),
    IronMq,
    Sqs,
    Orm,
    Mongo,
    PubSub,
    Redis,
}

impl BackendKind {
    /// Resolve the backend for a configuration.
    ///
    /// The first matching rule wins: custom name, IronMQ, SQS, ORM, Mongo,
    /// Pub/Sub, then Redis as the default.
    pub fn select(settings: &BrokerSettings) -> Self {
        if let Some(name) = &settings.broker_class {
            Self::Custom(name.clone())
        } else if settings.iron_mq.is_some() {
            Self::IronMq
        } else if settings.sqs.is_some() {
            Self::Sqs
        } else if settings.orm.is_some() {
            Self::Orm
        } else if settings.mongo.is_some() {
            Self::Mongo
        } else if settings.pubsub.is_some() {
            Self::PubSub
        } else {
            Self::Redis
        }
    }

    /// Name under which the backend's constructor is registered
    pub fn registry_name(&self) -> &str {
        match self {
            Self::Custom(name) => name,
            Self::IronMq => "ironmq",
            Self::Sqs => "sqs",
            Self::Orm => "orm",
            Self::Mongo => "mongo",
            Self::PubSub => "pubsub",
            Self::Redis => "redis",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.registry_name())
    }
}
