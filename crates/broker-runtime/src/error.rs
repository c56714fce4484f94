//! Error types for broker operations.

use chrono::Duration;
use thiserror::Error;

/// Comprehensive error type for all broker operations
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Queue not found: {queue_name}")]
    QueueNotFound { queue_name: String },

    #[error("Task not found: {task_id}")]
    TaskNotFound { task_id: String },

    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Permission denied for operation: {operation}")]
    PermissionDenied { operation: String },

    #[error("Operation '{operation}' is not implemented by the {backend} backend")]
    NotImplemented { operation: String, backend: String },

    #[error("Backend error ({backend}): {code} - {message}")]
    BackendError {
        backend: String,
        code: String,
        message: String,
    },

    #[error("Serialization failed: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Cache error: {0}")]
    CacheError(#[from] CacheError),

    #[error("Configuration error: {0}")]
    ConfigurationError(#[from] ConfigurationError),

    #[error("Validation error: {0}")]
    ValidationError(#[from] ValidationError),
}

/// Broad classification of a [`BrokerError`].
///
/// Callers branch on the kind rather than on individual variants so that
/// backends are free to add detail without breaking error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Connection,
    NotFound,
    Permission,
    NotImplemented,
    Timeout,
    Backend,
    Serialization,
    Configuration,
    Validation,
}

impl BrokerError {
    /// Shorthand for an operation the backend does not support
    pub fn not_implemented(operation: &str, backend: &str) -> Self {
        Self::NotImplemented {
            operation: operation.to_string(),
            backend: backend.to_string(),
        }
    }

    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::QueueNotFound { .. } => ErrorKind::NotFound,
            Self::TaskNotFound { .. } => ErrorKind::NotFound,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::ConnectionFailed { .. } => ErrorKind::Connection,
            Self::AuthenticationFailed { .. } => ErrorKind::Permission,
            Self::PermissionDenied { .. } => ErrorKind::Permission,
            Self::NotImplemented { .. } => ErrorKind::NotImplemented,
            Self::BackendError { .. } => ErrorKind::Backend,
            Self::SerializationError(_) => ErrorKind::Serialization,
            Self::CacheError(CacheError::Unavailable { .. }) => ErrorKind::Connection,
            Self::CacheError(CacheError::Serialization(_)) => ErrorKind::Serialization,
            Self::ConfigurationError(_) => ErrorKind::Configuration,
            Self::ValidationError(_) => ErrorKind::Validation,
        }
    }

    /// Check if error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Connection | ErrorKind::Timeout | ErrorKind::Backend
        )
    }

    /// Get suggested retry delay
    pub fn retry_after(&self) -> Option<Duration> {
        match self.kind() {
            ErrorKind::Timeout => Some(Duration::seconds(1)),
            ErrorKind::Connection => Some(Duration::seconds(5)),
            _ => None,
        }
    }
}

/// Errors raised by cache providers
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache '{cache}' unavailable: {message}")]
    Unavailable { cache: String, message: String },

    #[error("Cached value could not be (de)serialized: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {key}")]
    Missing { key: String },

    #[error("Configuration parsing failed: {message}")]
    Parsing { message: String },

    #[error("No backend registered under '{name}'")]
    UnknownBackend { name: String },
}

/// Validation errors
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    Required { field: String },

    #[error("Invalid format for {field}: {message}")]
    InvalidFormat { field: String, message: String },

    #[error("Value out of range for {field}: {message}")]
    OutOfRange { field: String, message: String },
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
