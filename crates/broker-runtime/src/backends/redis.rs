//! Redis list backend.
//!
//! Each queue is a Redis list under `{key_prefix}:{queue}:q`. Tasks are
//! appended with `RPUSH` and taken with `LPOP`, which removes them outright:
//! there is no lease, so a dequeued task has nothing left to acknowledge and
//! no per-task identity to delete or fail.

use crate::backend::BrokerBackend;
use crate::connection::{broker_error, checkout_error, RedisConnection, RedisPool};
use crate::error::BrokerError;
use crate::message::{DequeuedTask, QueueName, TaskId};
use crate::settings::RedisSettings;
use ::redis::AsyncCommands;
use async_trait::async_trait;
use tracing::{debug, warn};

#[cfg(test)]
#[path = "redis_tests.rs"]
mod tests;

const BACKEND_NAME: &str = "redis";

/// Broker backend storing tasks in a Redis list
#[derive(Debug)]
pub struct RedisBackend {
    queue: QueueName,
    list_key: String,
    pool: RedisPool,
}

impl RedisBackend {
    /// Create the backend; no connection is made until the first operation
    pub fn new(queue: QueueName, settings: &RedisSettings) -> Result<Self, BrokerError> {
        let pool = RedisPool::open(&settings.url, settings.pool_config())?;
        let list_key = list_key(&settings.key_prefix, &queue);
        debug!(queue = %queue, list_key = %list_key, url = %pool.url(), "Created Redis backend");

        Ok(Self {
            queue,
            list_key,
            pool,
        })
    }

    pub fn queue(&self) -> &QueueName {
        &self.queue
    }

    /// Redis key of the list holding this queue
    pub fn list_key(&self) -> &str {
        &self.list_key
    }

    async fn connection(&self) -> Result<RedisConnection<'_>, BrokerError> {
        self.pool.get().await.map_err(checkout_error)
    }
}

/// Redis key for a queue's list
pub fn list_key(prefix: &str, queue: &QueueName) -> String {
    format!("{}:{}:q", prefix, queue)
}

#[async_trait]
impl BrokerBackend for RedisBackend {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    async fn enqueue(&self, message: &str) -> Result<TaskId, BrokerError> {
        let mut conn = self.connection().await?;
        let length: u64 = conn
            .rpush(&self.list_key, message)
            .await
            .map_err(broker_error)?;
        Ok(TaskId::from(length))
    }

    async fn dequeue(&self) -> Result<Option<DequeuedTask>, BrokerError> {
        let mut conn = self.connection().await?;
        let message: Option<String> = conn
            .lpop(&self.list_key, None)
            .await
            .map_err(broker_error)?;
        Ok(message.map(|message| DequeuedTask::new(None, message)))
    }

    async fn queue_size(&self) -> Result<u64, BrokerError> {
        let mut conn = self.connection().await?;
        conn.llen(&self.list_key).await.map_err(broker_error)
    }

    async fn delete_queue(&self) -> Result<(), BrokerError> {
        let mut conn = self.connection().await?;
        let _: u64 = conn.del(&self.list_key).await.map_err(broker_error)?;
        debug!(queue = %self.queue, list_key = %self.list_key, "Deleted queue");
        Ok(())
    }

    async fn purge_queue(&self) -> Result<(), BrokerError> {
        let mut conn = self.connection().await?;
        let _: () = conn
            .ltrim(&self.list_key, 1, 0)
            .await
            .map_err(broker_error)?;
        debug!(queue = %self.queue, list_key = %self.list_key, "Purged queue");
        Ok(())
    }

    async fn acknowledge(&self, _task_id: &TaskId) -> Result<(), BrokerError> {
        // LPOP already removed the task
        Ok(())
    }

    async fn ping(&self) -> bool {
        let mut conn = match self.connection().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(url = %self.pool.url(), error = %e, "Redis ping failed");
                return false;
            }
        };

        let pong: Result<String, ::redis::RedisError> =
            ::redis::cmd("PING").query_async(&mut *conn).await;
        match pong {
            Ok(_) => true,
            Err(e) => {
                warn!(url = %self.pool.url(), error = %e, "Redis ping failed");
                false
            }
        }
    }

    fn info(&self) -> Option<String> {
        Some("Redis".to_string())
    }
}
