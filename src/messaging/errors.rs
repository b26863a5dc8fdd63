//! # Messaging Error Types
//!
//! Structured errors for queue transport and envelope handling using thiserror.

use thiserror::Error;

/// Errors returned by a [`QueueTransport`](super::QueueTransport)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MessagingError {
    #[error("Queue operation failed: {queue_name}: {operation}: {message}")]
    QueueOperation {
        queue_name: String,
        operation: String,
        message: String,
    },

    #[error("Queue not found: {queue_name}")]
    QueueNotFound { queue_name: String },

    #[error("Message not found: {message_id}")]
    MessageNotFound { message_id: String },

    #[error("Backend connection error: {message}")]
    Connection { message: String },

    #[error("Network timeout: operation {operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("Unsupported destination: {queue_name}: {reason}")]
    UnsupportedDestination { queue_name: String, reason: String },

    #[error("Internal messaging error: {message}")]
    Internal { message: String },
}

impl MessagingError {
    /// Create a queue operation error
    pub fn queue_operation(
        queue_name: impl Into<String>,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::QueueOperation {
            queue_name: queue_name.into(),
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a queue not found error
    pub fn queue_not_found(queue_name: impl Into<String>) -> Self {
        Self::QueueNotFound {
            queue_name: queue_name.into(),
        }
    }

    /// Create a message not found error
    pub fn message_not_found(message_id: impl Into<String>) -> Self {
        Self::MessageNotFound {
            message_id: message_id.into(),
        }
    }

    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Create an unsupported destination error
    pub fn unsupported_destination(
        queue_name: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::UnsupportedDestination {
            queue_name: queue_name.into(),
            reason: reason.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether retrying the operation on a later poll cycle can succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::QueueOperation { .. } | Self::Connection { .. } | Self::Timeout { .. }
        )
    }
}

/// Failure to decode a raw queue message into a [`MessageEnvelope`](super::MessageEnvelope)
///
/// Never transient: the same bytes will fail the same way on every delivery.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("Malformed envelope: {message}")]
    Malformed { message: String },

    #[error("Envelope is missing a consumer identifier")]
    MissingConsumerId,
}

impl DecodeError {
    /// Create a malformed envelope error
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for DecodeError {
    fn from(err: serde_json::Error) -> Self {
        DecodeError::malformed(err.to_string())
    }
}

/// Result type alias for messaging operations
pub type MessagingResult<T> = Result<T, MessagingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(MessagingError::connection("reset by peer").is_transient());
        assert!(MessagingError::timeout("dequeue", 5_000).is_transient());
        assert!(MessagingError::queue_operation("shared", "delete", "busy").is_transient());

        assert!(!MessagingError::queue_not_found("shared").is_transient());
        assert!(!MessagingError::message_not_found("42").is_transient());
        assert!(!MessagingError::unsupported_destination("poison", "restricted").is_transient());
    }

    #[test]
    fn test_error_display() {
        let err = MessagingError::queue_operation("my_queue", "copy", "Copy failed");
        let display_str = format!("{err}");
        assert!(display_str.contains("Queue operation failed"));
        assert!(display_str.contains("my_queue"));
        assert!(display_str.contains("copy"));
        assert!(display_str.contains("Copy failed"));
    }

    #[test]
    fn test_decode_error_from_json() {
        let json_err = serde_json::from_slice::<serde_json::Value>(b"{invalid").unwrap_err();
        let decode_err: DecodeError = json_err.into();
        assert!(matches!(decode_err, DecodeError::Malformed { .. }));
    }
}
