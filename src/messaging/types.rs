//! # Messaging Types
//!
//! Queue references, message identifiers and the raw message shape produced by a
//! transport.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a queued message
///
/// The format is transport-specific; the in-memory transport uses a decimal counter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    /// Create a new message ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for MessageId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for MessageId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for MessageId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A queue in a particular backend scope
///
/// `scope` names the storage account (or namespace, or connection) the queue lives in.
/// Poison messages are only routed to a consumer-specific queue when it shares the
/// scope of the queue the message came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueRef {
    pub scope: String,
    pub name: String,
}

impl QueueRef {
    pub fn new(scope: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            name: name.into(),
        }
    }

    /// Whether both queues live in the same backend scope
    pub fn is_colocated_with(&self, other: &QueueRef) -> bool {
        self.scope == other.scope
    }
}

impl std::fmt::Display for QueueRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.scope, self.name)
    }
}

/// A message as dequeued from the transport, before envelope decoding
#[derive(Debug, Clone, PartialEq)]
pub struct RawMessage {
    /// Transport-assigned identifier
    pub id: MessageId,
    /// Encoded envelope bytes
    pub body: Vec<u8>,
    /// Number of times this message has been dequeued, including the current delivery
    pub dequeue_count: u32,
    /// When the message was originally enqueued
    pub enqueued_at: DateTime<Utc>,
}

impl RawMessage {
    pub fn new(
        id: impl Into<MessageId>,
        body: Vec<u8>,
        dequeue_count: u32,
        enqueued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            body,
            dequeue_count,
            enqueued_at,
        }
    }
}
