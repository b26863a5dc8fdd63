//! # In-Memory Queue Transport
//!
//! Thread-safe in-memory [`QueueTransport`] for testing and development.
//!
//! ## Features
//!
//! - **Visibility Timeout**: Dequeued messages are hidden until the timeout expires, then
//!   redelivered with an incremented dequeue count
//! - **Multiple Scopes**: Queues are keyed by [`QueueRef`], so several backend accounts
//!   can be simulated side by side
//! - **Restricted Scopes**: Destinations in a restricted scope are reported as
//!   unsupported, exercising the poison fallback path
//! - **Failure Injection**: The next N dequeue/delete/copy calls can be made to fail
//! - **Wake Notifiers**: Enqueueing to a queue signals every notifier attached to it
//!
//! Visibility uses `tokio::time::Instant`, so tests running with paused time see
//! redelivery as soon as they advance the clock.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

use super::errors::{MessagingError, MessagingResult};
use super::transport::QueueTransport;
use super::types::{MessageId, QueueRef, RawMessage};
use crate::listener::WakeNotifier;

/// Transport operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportOperation {
    Dequeue,
    Delete,
    CopyTo,
}

/// In-memory message with visibility tracking
#[derive(Debug, Clone)]
struct InMemoryQueuedMessage {
    id: u64,
    body: Vec<u8>,
    enqueued_at: DateTime<Utc>,
    /// When the message becomes visible again (None = visible now)
    visible_at: Option<Instant>,
    dequeue_count: u32,
}

#[derive(Debug, Default)]
struct InMemoryQueue {
    messages: VecDeque<InMemoryQueuedMessage>,
}

/// In-memory queue transport
#[derive(Debug, Default)]
pub struct InMemoryQueueTransport {
    queues: RwLock<HashMap<QueueRef, InMemoryQueue>>,
    next_id: parking_lot::Mutex<u64>,
    restricted_scopes: parking_lot::RwLock<HashSet<String>>,
    injected_failures: parking_lot::Mutex<HashMap<TransportOperation, u32>>,
    notifiers: parking_lot::RwLock<HashMap<QueueRef, Vec<WakeNotifier>>>,
}

impl InMemoryQueueTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the queue if it doesn't exist
    pub async fn ensure_queue(&self, queue: &QueueRef) {
        let mut queues = self.queues.write().await;
        queues.entry(queue.clone()).or_default();
    }

    /// Mark a scope as unable to accept copied messages
    pub fn restrict_scope(&self, scope: impl Into<String>) {
        self.restricted_scopes.write().insert(scope.into());
    }

    /// Make the next `count` calls of `operation` fail with a transient error
    pub fn fail_next(&self, operation: TransportOperation, count: u32) {
        self.injected_failures.lock().insert(operation, count);
    }

    /// Signal `notifier` whenever a message is enqueued to `queue`
    pub fn attach_notifier(&self, queue: &QueueRef, notifier: WakeNotifier) {
        self.notifiers
            .write()
            .entry(queue.clone())
            .or_default()
            .push(notifier);
    }

    /// Number of messages in a queue, visible or not
    pub async fn queue_length(&self, queue: &QueueRef) -> usize {
        let queues = self.queues.read().await;
        queues.get(queue).map(|q| q.messages.len()).unwrap_or(0)
    }

    /// Bodies of every message in a queue, in FIFO order
    pub async fn peek_bodies(&self, queue: &QueueRef) -> Vec<Vec<u8>> {
        let queues = self.queues.read().await;
        queues
            .get(queue)
            .map(|q| q.messages.iter().map(|m| m.body.clone()).collect())
            .unwrap_or_default()
    }

    /// Enqueue a message that appears to have already been delivered `dequeue_count` times
    pub async fn enqueue_with_dequeue_count(
        &self,
        queue: &QueueRef,
        body: Vec<u8>,
        dequeue_count: u32,
    ) -> MessageId {
        let id = self.allocate_id();
        let mut queues = self.queues.write().await;
        queues
            .entry(queue.clone())
            .or_default()
            .messages
            .push_back(InMemoryQueuedMessage {
                id,
                body,
                enqueued_at: Utc::now(),
                visible_at: None,
                dequeue_count,
            });
        MessageId::from(id)
    }

    fn allocate_id(&self) -> u64 {
        let mut next = self.next_id.lock();
        *next += 1;
        *next
    }

    fn take_injected_failure(
        &self,
        operation: TransportOperation,
        queue: &QueueRef,
    ) -> MessagingResult<()> {
        let mut failures = self.injected_failures.lock();
        match failures.get_mut(&operation) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(MessagingError::queue_operation(
                    queue.to_string(),
                    format!("{operation:?}"),
                    "injected failure",
                ))
            }
            _ => Ok(()),
        }
    }

    fn parse_id(message: &RawMessage) -> MessagingResult<u64> {
        message
            .id
            .as_str()
            .parse()
            .map_err(|_| MessagingError::message_not_found(message.id.as_str()))
    }
}

#[async_trait]
impl QueueTransport for InMemoryQueueTransport {
    async fn enqueue(&self, queue: &QueueRef, body: Vec<u8>) -> MessagingResult<MessageId> {
        let id = self.enqueue_with_dequeue_count(queue, body, 0).await;

        if let Some(notifiers) = self.notifiers.read().get(queue) {
            for notifier in notifiers {
                notifier.notify();
            }
        }

        Ok(id)
    }

    async fn dequeue_batch(
        &self,
        queue: &QueueRef,
        max_messages: usize,
        visibility_timeout: Duration,
    ) -> MessagingResult<Vec<RawMessage>> {
        self.take_injected_failure(TransportOperation::Dequeue, queue)?;

        let mut queues = self.queues.write().await;
        let Some(queue_state) = queues.get_mut(queue) else {
            return Ok(Vec::new());
        };

        let now = Instant::now();
        let mut received = Vec::new();

        for msg in queue_state.messages.iter_mut() {
            if received.len() >= max_messages {
                break;
            }

            let is_visible = msg.visible_at.map(|vt| vt <= now).unwrap_or(true);
            if is_visible {
                msg.visible_at = Some(now + visibility_timeout);
                msg.dequeue_count += 1;
                received.push(RawMessage::new(
                    msg.id,
                    msg.body.clone(),
                    msg.dequeue_count,
                    msg.enqueued_at,
                ));
            }
        }

        debug!(queue = %queue, count = received.len(), "In-memory dequeue");
        Ok(received)
    }

    async fn delete(&self, queue: &QueueRef, message: &RawMessage) -> MessagingResult<()> {
        self.take_injected_failure(TransportOperation::Delete, queue)?;
        let message_id = Self::parse_id(message)?;

        let mut queues = self.queues.write().await;
        let queue_state = queues
            .get_mut(queue)
            .ok_or_else(|| MessagingError::queue_not_found(queue.to_string()))?;

        if let Some(pos) = queue_state.messages.iter().position(|m| m.id == message_id) {
            queue_state.messages.remove(pos);
            Ok(())
        } else {
            Err(MessagingError::message_not_found(message_id.to_string()))
        }
    }

    async fn copy_to(&self, destination: &QueueRef, message: &RawMessage) -> MessagingResult<()> {
        self.take_injected_failure(TransportOperation::CopyTo, destination)?;

        if !self.supports_destination(destination) {
            return Err(MessagingError::unsupported_destination(
                destination.to_string(),
                "scope is restricted",
            ));
        }

        let id = self.allocate_id();
        let mut queues = self.queues.write().await;
        queues
            .entry(destination.clone())
            .or_default()
            .messages
            .push_back(InMemoryQueuedMessage {
                id,
                body: message.body.clone(),
                enqueued_at: Utc::now(),
                visible_at: None,
                dequeue_count: 0,
            });
        Ok(())
    }

    fn supports_destination(&self, destination: &QueueRef) -> bool {
        !self.restricted_scopes.read().contains(&destination.scope)
    }

    fn provider_name(&self) -> &'static str {
        "in_memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::WakeSignal;

    fn shared_queue() -> QueueRef {
        QueueRef::new("primary", "shared")
    }

    #[tokio::test]
    async fn test_enqueue_and_dequeue() {
        let transport = InMemoryQueueTransport::new();
        let queue = shared_queue();

        let id = transport.enqueue(&queue, b"hello".to_vec()).await.unwrap();
        let received = transport
            .dequeue_batch(&queue, 10, Duration::from_secs(30))
            .await
            .unwrap();

        assert_eq!(received.len(), 1);
        assert_eq!(received[0].id, id);
        assert_eq!(received[0].body, b"hello".to_vec());
        assert_eq!(received[0].dequeue_count, 1);
    }

    #[tokio::test]
    async fn test_dequeue_missing_queue_is_empty() {
        let transport = InMemoryQueueTransport::new();
        let received = transport
            .dequeue_batch(&shared_queue(), 10, Duration::from_secs(30))
            .await
            .unwrap();
        assert!(received.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_visibility_timeout_redelivers_with_higher_count() {
        let transport = InMemoryQueueTransport::new();
        let queue = shared_queue();
        transport.enqueue(&queue, b"retry".to_vec()).await.unwrap();

        let first = transport
            .dequeue_batch(&queue, 10, Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(first.len(), 1);

        // Still invisible
        let hidden = transport
            .dequeue_batch(&queue, 10, Duration::from_secs(30))
            .await
            .unwrap();
        assert!(hidden.is_empty());

        tokio::time::advance(Duration::from_secs(31)).await;

        let second = transport
            .dequeue_batch(&queue, 10, Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].dequeue_count, 2);
    }

    #[tokio::test]
    async fn test_batch_limit_respected() {
        let transport = InMemoryQueueTransport::new();
        let queue = shared_queue();
        for i in 0..5 {
            transport
                .enqueue(&queue, format!("m{i}").into_bytes())
                .await
                .unwrap();
        }

        let received = transport
            .dequeue_batch(&queue, 3, Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(received.len(), 3);
        assert_eq!(received[0].body, b"m0".to_vec());
    }

    #[tokio::test]
    async fn test_delete_and_copy() {
        let transport = InMemoryQueueTransport::new();
        let queue = shared_queue();
        let poison = QueueRef::new("primary", "poison");
        transport.enqueue(&queue, b"bad".to_vec()).await.unwrap();

        let received = transport
            .dequeue_batch(&queue, 1, Duration::from_secs(30))
            .await
            .unwrap();
        transport.copy_to(&poison, &received[0]).await.unwrap();
        transport.delete(&queue, &received[0]).await.unwrap();

        assert_eq!(transport.queue_length(&queue).await, 0);
        assert_eq!(transport.peek_bodies(&poison).await, vec![b"bad".to_vec()]);

        // Deleting twice reports the missing message
        let err = transport.delete(&queue, &received[0]).await.unwrap_err();
        assert!(matches!(err, MessagingError::MessageNotFound { .. }));
    }

    #[tokio::test]
    async fn test_restricted_scope_rejects_copy() {
        let transport = InMemoryQueueTransport::new();
        transport.restrict_scope("secondary");
        let destination = QueueRef::new("secondary", "poison");

        assert!(!transport.supports_destination(&destination));
        assert!(transport.supports_destination(&QueueRef::new("primary", "poison")));

        let message = RawMessage::new(1u64, b"x".to_vec(), 1, Utc::now());
        let err = transport.copy_to(&destination, &message).await.unwrap_err();
        assert!(matches!(err, MessagingError::UnsupportedDestination { .. }));
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed() {
        let transport = InMemoryQueueTransport::new();
        let queue = shared_queue();
        transport.fail_next(TransportOperation::Dequeue, 1);

        let err = transport
            .dequeue_batch(&queue, 1, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(err.is_transient());

        assert!(transport
            .dequeue_batch(&queue, 1, Duration::from_secs(1))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_enqueue_signals_attached_notifier() {
        let transport = InMemoryQueueTransport::new();
        let queue = shared_queue();
        let signal = WakeSignal::new();
        transport.attach_notifier(&queue, signal.notifier());

        transport.enqueue(&queue, b"ping".to_vec()).await.unwrap();

        tokio::time::timeout(Duration::from_millis(50), signal.wait())
            .await
            .expect("notifier should have been signalled");
    }
}
