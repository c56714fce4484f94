//! Tests for the in-memory broker backend.

use super::*;
use crate::error::ErrorKind;

fn queue(name: &str) -> QueueName {
    QueueName::new(name.to_string()).unwrap()
}

fn backend(store: &MemoryStore) -> MemoryBackend {
    MemoryBackend::new(queue("default"), store.clone(), Duration::seconds(60))
}

mod delivery {
    use super::*;

    #[tokio::test]
    async fn test_tasks_are_delivered_in_fifo_order() {
        let backend = backend(&MemoryStore::new());

        backend.enqueue("first").await.unwrap();
        backend.enqueue("second").await.unwrap();
        backend.enqueue("third").await.unwrap();

        let mut received = Vec::new();
        while let Some(task) = backend.dequeue().await.unwrap() {
            received.push(task.message);
        }
        assert_eq!(received, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_dequeue_on_empty_queue_is_none() {
        let backend = backend(&MemoryStore::new());
        assert!(backend.dequeue().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_dequeued_task_carries_enqueue_id() {
        let backend = backend(&MemoryStore::new());

        let task_id = backend.enqueue("payload").await.unwrap();
        let task = backend.dequeue().await.unwrap().unwrap();

        assert_eq!(task.task_id, Some(task_id));
        assert_eq!(task.message, "payload");
    }

    #[tokio::test]
    async fn test_dequeue_batch_stops_at_max() {
        let backend = backend(&MemoryStore::new());
        for i in 0..5 {
            backend.enqueue(&format!("task-{}", i)).await.unwrap();
        }

        let batch = backend.dequeue_batch(3).await.unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(backend.queue_size().await.unwrap(), 2);
        assert_eq!(backend.lock_size().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_brokers_on_same_store_share_queue() {
        let store = MemoryStore::new();
        let producer = backend(&store);
        let consumer = backend(&store);

        producer.enqueue("shared").await.unwrap();
        let task = consumer.dequeue().await.unwrap().unwrap();
        assert_eq!(task.message, "shared");
    }

    #[tokio::test]
    async fn test_queues_are_independent() {
        let store = MemoryStore::new();
        let a = MemoryBackend::new(queue("a"), store.clone(), Duration::seconds(60));
        let b = MemoryBackend::new(queue("b"), store.clone(), Duration::seconds(60));

        a.enqueue("for-a").await.unwrap();
        assert_eq!(a.queue_size().await.unwrap(), 1);
        assert_eq!(b.queue_size().await.unwrap(), 0);
    }
}

mod leases {
    use super::*;

    #[tokio::test]
    async fn test_acknowledge_releases_lock() {
        let backend = backend(&MemoryStore::new());
        backend.enqueue("job").await.unwrap();

        let task = backend.dequeue().await.unwrap().unwrap();
        assert_eq!(backend.queue_size().await.unwrap(), 0);
        assert_eq!(backend.lock_size().await.unwrap(), 1);

        backend
            .acknowledge(task.task_id.as_ref().unwrap())
            .await
            .unwrap();
        assert_eq!(backend.lock_size().await.unwrap(), 0);
        assert!(backend.dequeue().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_lease_redelivers_at_head() {
        let store = MemoryStore::new();
        let backend = MemoryBackend::new(queue("default"), store, Duration::zero());

        backend.enqueue("first").await.unwrap();
        backend.enqueue("second").await.unwrap();

        let first = backend.dequeue().await.unwrap().unwrap();
        assert_eq!(first.message, "first");

        // Zero lease: already expired on the next call
        assert_eq!(backend.lock_size().await.unwrap(), 0);
        let again = backend.dequeue().await.unwrap().unwrap();
        assert_eq!(again.message, "first");
        assert_eq!(again.task_id, first.task_id);
    }

    #[tokio::test]
    async fn test_acknowledge_after_expiry_is_not_found() {
        let backend = MemoryBackend::new(queue("default"), MemoryStore::new(), Duration::zero());
        backend.enqueue("job").await.unwrap();
        let task = backend.dequeue().await.unwrap().unwrap();

        let err = backend
            .acknowledge(task.task_id.as_ref().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::TaskNotFound { .. }));
        assert_eq!(backend.queue_size().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_fail_moves_task_to_dead_letter() {
        let backend = backend(&MemoryStore::new());
        backend.enqueue("bad").await.unwrap();
        let task = backend.dequeue().await.unwrap().unwrap();

        backend.fail(task.task_id.as_ref().unwrap()).await.unwrap();

        assert_eq!(backend.lock_size().await.unwrap(), 0);
        assert_eq!(backend.queue_size().await.unwrap(), 0);
        assert_eq!(backend.dead_letter_size().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_removes_pending_and_locked_tasks() {
        let backend = backend(&MemoryStore::new());
        let locked = backend.enqueue("locked").await.unwrap();
        let pending = backend.enqueue("pending").await.unwrap();
        backend.dequeue().await.unwrap();

        backend.delete(&pending).await.unwrap();
        backend.delete(&locked).await.unwrap();

        assert_eq!(backend.queue_size().await.unwrap(), 0);
        assert_eq!(backend.lock_size().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unknown_task_ids_are_not_found() {
        let backend = backend(&MemoryStore::new());
        let unknown = TaskId::generate();

        for err in [
            backend.acknowledge(&unknown).await.unwrap_err(),
            backend.fail(&unknown).await.unwrap_err(),
            backend.delete(&unknown).await.unwrap_err(),
        ] {
            assert_eq!(err.kind(), ErrorKind::NotFound);
        }
    }
}

mod queue_management {
    use super::*;

    #[tokio::test]
    async fn test_purge_keeps_queue_and_locks() {
        let store = MemoryStore::new();
        let backend = backend(&store);
        backend.enqueue("a").await.unwrap();
        backend.enqueue("b").await.unwrap();
        backend.dequeue().await.unwrap();

        backend.purge_queue().await.unwrap();

        assert_eq!(backend.queue_size().await.unwrap(), 0);
        assert_eq!(backend.lock_size().await.unwrap(), 1);
        assert_eq!(store.queue_names(), vec![queue("default")]);
    }

    #[tokio::test]
    async fn test_delete_queue_removes_everything() {
        let store = MemoryStore::new();
        let backend = backend(&store);
        backend.enqueue("a").await.unwrap();
        backend.dequeue().await.unwrap();

        backend.delete_queue().await.unwrap();

        assert!(store.queue_names().is_empty());
        assert_eq!(backend.queue_size().await.unwrap(), 0);
        assert_eq!(backend.lock_size().await.unwrap(), 0);
    }
}

mod connectivity {
    use super::*;

    #[tokio::test]
    async fn test_disconnected_store_fails_operations() {
        let store = MemoryStore::new();
        let backend = backend(&store);
        store.disconnect();

        assert!(!backend.ping().await);
        let err = backend.enqueue("x").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
        assert!(backend.queue_size().await.is_err());
        assert!(backend.delete_queue().await.is_err());
    }

    #[tokio::test]
    async fn test_reconnect_restores_service() {
        let store = MemoryStore::new();
        let backend = backend(&store);
        backend.enqueue("kept").await.unwrap();

        store.disconnect();
        store.reconnect();

        assert!(backend.ping().await);
        assert_eq!(backend.queue_size().await.unwrap(), 1);
    }

    #[test]
    fn test_info_is_static() {
        let backend = backend(&MemoryStore::new());
        assert_eq!(backend.info(), Some("Memory".to_string()));
        assert_eq!(backend.name(), "memory");
    }
}
