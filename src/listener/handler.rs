//! # Trigger Handlers
//!
//! The callback a consumer supplies when it registers with the listener.

use std::future::Future;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::messaging::MessageId;

/// Delivery details passed to a handler alongside the payload
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerContext {
    pub consumer_id: String,
    pub message_id: MessageId,
    /// Delivery attempt, starting at 1
    pub dequeue_count: u32,
    pub enqueued_at: DateTime<Utc>,
}

/// Consumer processing for messages addressed to one registration
///
/// Returning an error (or exceeding the handler timeout) leaves the message on the
/// queue for redelivery until its dequeue count reaches the poison threshold.
#[async_trait]
pub trait TriggerHandler: Send + Sync + 'static {
    async fn handle(&self, payload: serde_json::Value, context: TriggerContext)
        -> anyhow::Result<()>;
}

/// Adapter turning an async closure into a [`TriggerHandler`]
pub struct FnTriggerHandler<F> {
    f: F,
}

/// Build a handler from an async closure
///
/// ```rust
/// use shared_queue_listener::listener::handler_fn;
///
/// let handler = handler_fn(|payload, context| async move {
///     println!("{} received {payload}", context.consumer_id);
///     anyhow::Ok(())
/// });
/// # let _ = handler;
/// ```
pub fn handler_fn<F, Fut>(f: F) -> FnTriggerHandler<F>
where
    F: Fn(serde_json::Value, TriggerContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    FnTriggerHandler { f }
}

#[async_trait]
impl<F, Fut> TriggerHandler for FnTriggerHandler<F>
where
    F: Fn(serde_json::Value, TriggerContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn handle(
        &self,
        payload: serde_json::Value,
        context: TriggerContext,
    ) -> anyhow::Result<()> {
        (self.f)(payload, context).await
    }
}
