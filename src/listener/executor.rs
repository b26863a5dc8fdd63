//! # Trigger Executor
//!
//! Turns one raw message into one handler invocation and reports what happened. The
//! executor never touches the queue; acting on the [`ExecutionOutcome`] (delete, leave
//! for redelivery, or poison) is the listener's job.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tracing::{debug, info, warn};

use super::handler::TriggerContext;
use super::registry::{Registration, RegistrationTable};
use crate::messaging::{DecodeError, EnvelopeCodec, RawMessage};

/// Result of executing one message
#[derive(Debug)]
pub enum ExecutionOutcome {
    /// Handler succeeded; the message should be deleted
    Completed { consumer_id: String },
    /// The body is not a valid envelope; poison without retrying
    Malformed(DecodeError),
    /// No registration for the consumer; delete without poisoning
    Unregistered { consumer_id: String },
    /// Already delivered more times than allowed; poison without invoking the handler,
    /// whether or not the consumer is still registered
    DequeueLimitExceeded {
        consumer_id: String,
        registration: Option<Arc<Registration>>,
    },
    /// Handler returned an error, panicked or timed out
    Failed {
        registration: Arc<Registration>,
        error: String,
        timed_out: bool,
        /// This delivery was the last one permitted, so the message must be poisoned
        exhausted: bool,
    },
}

impl ExecutionOutcome {
    /// Short name for logs and summaries
    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed { .. } => "completed",
            Self::Malformed(_) => "malformed",
            Self::Unregistered { .. } => "unregistered",
            Self::DequeueLimitExceeded { .. } => "dequeue_limit_exceeded",
            Self::Failed { .. } => "failed",
        }
    }

    pub fn consumer_id(&self) -> Option<&str> {
        match self {
            Self::Completed { consumer_id }
            | Self::Unregistered { consumer_id }
            | Self::DequeueLimitExceeded { consumer_id, .. } => Some(consumer_id.as_str()),
            Self::Malformed(_) => None,
            Self::Failed { registration, .. } => Some(registration.consumer_id()),
        }
    }

    /// Whether the message has to leave the live queue through the poison router
    pub fn requires_poison(&self) -> bool {
        match self {
            Self::Malformed(_) | Self::DequeueLimitExceeded { .. } => true,
            Self::Failed { exhausted, .. } => *exhausted,
            Self::Completed { .. } | Self::Unregistered { .. } => false,
        }
    }

    /// The registration whose poison destination applies, if any
    pub fn registration(&self) -> Option<&Registration> {
        match self {
            Self::DequeueLimitExceeded { registration, .. } => registration.as_deref(),
            Self::Failed { registration, .. } => Some(registration.as_ref()),
            _ => None,
        }
    }
}

/// Decodes, resolves and invokes handlers for raw messages
pub struct TriggerExecutor {
    registrations: Arc<RegistrationTable>,
    codec: Arc<dyn EnvelopeCodec>,
    handler_timeout: Duration,
    max_dequeue_count: u32,
}

impl std::fmt::Debug for TriggerExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriggerExecutor")
            .field("registrations", &self.registrations.len())
            .field("handler_timeout", &self.handler_timeout)
            .field("max_dequeue_count", &self.max_dequeue_count)
            .finish()
    }
}

impl TriggerExecutor {
    pub fn new(
        registrations: Arc<RegistrationTable>,
        codec: Arc<dyn EnvelopeCodec>,
        handler_timeout: Duration,
        max_dequeue_count: u32,
    ) -> Self {
        Self {
            registrations,
            codec,
            handler_timeout,
            max_dequeue_count,
        }
    }

    pub fn max_dequeue_count(&self) -> u32 {
        self.max_dequeue_count
    }

    pub async fn execute(&self, message: &RawMessage) -> ExecutionOutcome {
        let envelope = match self.codec.decode(&message.body) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(message_id = %message.id, error = %e, "Failed to decode message envelope");
                return ExecutionOutcome::Malformed(e);
            }
        };

        let registration = self.registrations.lookup(&envelope.consumer_id);

        // Over-limit messages leave the live queue even when their consumer is gone
        if message.dequeue_count > self.max_dequeue_count {
            return ExecutionOutcome::DequeueLimitExceeded {
                consumer_id: envelope.consumer_id,
                registration,
            };
        }

        let Some(registration) = registration else {
            info!(
                message_id = %message.id,
                consumer_id = %envelope.consumer_id,
                "No registration for consumer, discarding message"
            );
            return ExecutionOutcome::Unregistered {
                consumer_id: envelope.consumer_id,
            };
        };

        let context = TriggerContext {
            consumer_id: envelope.consumer_id.clone(),
            message_id: message.id.clone(),
            dequeue_count: message.dequeue_count,
            enqueued_at: message.enqueued_at,
        };

        debug!(
            message_id = %message.id,
            consumer_id = %envelope.consumer_id,
            dequeue_count = message.dequeue_count,
            "Invoking trigger handler"
        );

        let invocation = AssertUnwindSafe(registration.handler().handle(envelope.payload, context))
            .catch_unwind();

        let (error, timed_out) = match tokio::time::timeout(self.handler_timeout, invocation).await
        {
            Ok(Ok(Ok(()))) => {
                return ExecutionOutcome::Completed {
                    consumer_id: envelope.consumer_id,
                };
            }
            Ok(Ok(Err(e))) => (format!("{e:#}"), false),
            Ok(Err(_)) => ("handler panicked".to_string(), false),
            Err(_) => (
                format!(
                    "handler timed out after {}ms",
                    self.handler_timeout.as_millis()
                ),
                true,
            ),
        };

        ExecutionOutcome::Failed {
            exhausted: message.dequeue_count >= self.max_dequeue_count,
            registration,
            error,
            timed_out,
        }
    }
}
