//! # Queue Transport Trait
//!
//! The primitives the listener needs from a physical queue backend. The trait is object
//! safe so the listener can hold an `Arc<dyn QueueTransport>` chosen at startup.

use std::time::Duration;

use async_trait::async_trait;

use super::errors::MessagingResult;
use super::types::{MessageId, QueueRef, RawMessage};

/// Physical queue backend capability
///
/// Implementations are expected to provide at-least-once delivery with a visibility
/// timeout: a dequeued message that is not deleted becomes visible again once the
/// timeout expires, with its dequeue count incremented on the next delivery.
#[async_trait]
pub trait QueueTransport: Send + Sync + 'static {
    /// Append a message body to a queue, returning its identifier
    async fn enqueue(&self, queue: &QueueRef, body: Vec<u8>) -> MessagingResult<MessageId>;

    /// Dequeue up to `max_messages` visible messages, hiding them for `visibility_timeout`
    async fn dequeue_batch(
        &self,
        queue: &QueueRef,
        max_messages: usize,
        visibility_timeout: Duration,
    ) -> MessagingResult<Vec<RawMessage>>;

    /// Permanently remove a message from a queue
    async fn delete(&self, queue: &QueueRef, message: &RawMessage) -> MessagingResult<()>;

    /// Write a copy of a message's body into another queue
    async fn copy_to(&self, destination: &QueueRef, message: &RawMessage) -> MessagingResult<()>;

    /// Whether this backend can write to the given destination
    ///
    /// Restricted backends (e.g. accounts without queue-creation rights) return `false`
    /// for destinations they cannot reach, which makes poison routing fall back to the
    /// listener-wide default.
    fn supports_destination(&self, _destination: &QueueRef) -> bool {
        true
    }

    /// Transport name for logging
    fn provider_name(&self) -> &'static str;
}
