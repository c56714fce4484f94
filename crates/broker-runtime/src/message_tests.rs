//! Tests for task types and identifiers.

use super::*;

mod queue_name_tests {
    use super::*;

    #[test]
    fn test_valid_queue_names() {
        assert!(QueueName::new("default".to_string()).is_ok());
        assert!(QueueName::new("orders_high-priority".to_string()).is_ok());
        assert!(QueueName::new("cluster:shard.1".to_string()).is_ok());
        assert!(QueueName::new("a".repeat(256)).is_ok());
    }

    #[test]
    fn test_length_limit_counts_characters() {
        // 256 characters, 512 bytes
        assert!(QueueName::new("é".repeat(256)).is_ok());
        assert!(QueueName::new("é".repeat(257)).is_err());
    }

    #[test]
    fn test_invalid_queue_names() {
        assert!(QueueName::new("".to_string()).is_err());
        assert!(QueueName::new("a".repeat(257)).is_err());
        assert!(QueueName::new("has space".to_string()).is_err());
        assert!(QueueName::new("tab\tname".to_string()).is_err());
        assert!(QueueName::new("control\x00char".to_string()).is_err());
    }

    #[test]
    fn test_queue_name_serde_validates() {
        let name: QueueName = serde_json::from_str("\"reports\"").unwrap();
        assert_eq!(name.as_str(), "reports");

        let invalid: Result<QueueName, _> = serde_json::from_str("\"\"");
        assert!(invalid.is_err());
    }

    #[test]
    fn test_queue_name_display() {
        let name: QueueName = "reports".parse().unwrap();
        assert_eq!(name.to_string(), "reports");
    }
}

mod task_id_tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_unique() {
        let id1 = TaskId::generate();
        let id2 = TaskId::generate();
        assert_ne!(id1, id2);
        assert!(!id1.as_str().is_empty());
    }

    #[test]
    fn test_task_id_from_str() {
        let id: TaskId = "receipt-abc".parse().unwrap();
        assert_eq!(id.as_str(), "receipt-abc");
        assert!("".parse::<TaskId>().is_err());
    }

    #[test]
    fn test_task_id_from_counter() {
        assert_eq!(TaskId::from(7).as_str(), "7");
    }
}

#[test]
fn test_dequeued_task_without_id() {
    let task = DequeuedTask::new(None, "payload");
    assert!(task.task_id.is_none());
    assert_eq!(task.message, "payload");
}
