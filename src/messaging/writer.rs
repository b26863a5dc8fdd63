//! # Shared Queue Writer
//!
//! Producer side of the shared queue: wraps a payload in an envelope addressed to a
//! consumer, enqueues it, and signals the listener so it polls without waiting out its
//! current backoff interval.

use std::sync::Arc;

use tracing::debug;

use super::envelope::{EnvelopeCodec, JsonEnvelopeCodec, MessageEnvelope};
use super::errors::MessagingError;
use super::transport::QueueTransport;
use super::types::{MessageId, QueueRef};
use crate::error::{ListenerError, ListenerResult};
use crate::listener::WakeNotifier;

/// Enqueues consumer-addressed messages onto a shared queue
pub struct SharedQueueWriter {
    transport: Arc<dyn QueueTransport>,
    queue: QueueRef,
    codec: Arc<dyn EnvelopeCodec>,
    notifier: Option<WakeNotifier>,
}

impl std::fmt::Debug for SharedQueueWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedQueueWriter")
            .field("queue", &self.queue)
            .field("provider", &self.transport.provider_name())
            .field("has_notifier", &self.notifier.is_some())
            .finish()
    }
}

impl SharedQueueWriter {
    /// Create a writer using the JSON envelope codec
    pub fn new(transport: Arc<dyn QueueTransport>, queue: QueueRef) -> Self {
        Self {
            transport,
            queue,
            codec: Arc::new(JsonEnvelopeCodec),
            notifier: None,
        }
    }

    /// Use a custom envelope codec
    pub fn with_codec(mut self, codec: Arc<dyn EnvelopeCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Signal this notifier after every successful enqueue
    pub fn with_notifier(mut self, notifier: WakeNotifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Enqueue `payload` for the consumer registered as `consumer_id`
    pub async fn enqueue(
        &self,
        consumer_id: &str,
        payload: serde_json::Value,
    ) -> ListenerResult<MessageId> {
        if consumer_id.trim().is_empty() {
            return Err(ListenerError::InvalidConsumerId(consumer_id.to_string()));
        }

        let envelope = MessageEnvelope::new(consumer_id, payload);
        let body = self
            .codec
            .encode(&envelope)
            .map_err(|e| MessagingError::internal(format!("envelope encoding failed: {e}")))?;

        let message_id = self.transport.enqueue(&self.queue, body).await?;

        debug!(
            queue = %self.queue,
            consumer_id = %consumer_id,
            message_id = %message_id,
            "Enqueued shared queue message"
        );

        if let Some(notifier) = &self.notifier {
            notifier.notify();
        }

        Ok(message_id)
    }
}
