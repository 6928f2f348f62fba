//! Error types for queue operations.

use thiserror::Error;

/// Comprehensive error type for all queue operations
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue '{queue_name}' is not opened")]
    NotOpened { queue_name: String },

    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Subscription failed for queue '{queue_name}': {message}")]
    Subscription { queue_name: String, message: String },

    #[error("Internal queue fault: {message}")]
    Internal { message: String },

    #[error("Serialization failed: {0}")]
    Serialization(#[from] SerializationError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl QueueError {
    /// Check if error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        match self {
            Self::NotOpened { .. } => false,
            Self::ConnectionFailed { .. } => true,
            Self::Subscription { .. } => true,
            Self::Internal { .. } => false,
            Self::Serialization(_) => false,
            Self::Configuration(_) => false,
            Self::Validation(_) => false,
        }
    }

    /// Check if error should be retried
    pub fn should_retry(&self) -> bool {
        self.is_transient()
    }

    pub(crate) fn not_opened(queue_name: impl Into<String>) -> Self {
        Self::NotOpened {
            queue_name: queue_name.into(),
        }
    }

    /// Wrap a poisoned mutex into an internal fault.
    pub(crate) fn poisoned<T>(_err: std::sync::PoisonError<T>) -> Self {
        Self::Internal {
            message: "queue state lock poisoned".to_string(),
        }
    }
}

/// Errors during payload serialization/deserialization
#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("JSON serialization failed: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Message body is not valid UTF-8")]
    InvalidUtf8,
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
}

impl From<config::ConfigError> for ConfigurationError {
    fn from(err: config::ConfigError) -> Self {
        Self::Parsing {
            message: err.to_string(),
        }
    }
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
