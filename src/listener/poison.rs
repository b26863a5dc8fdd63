//! # Poison Router
//!
//! Moves messages that can no longer be processed off the live shared queue.
//!
//! Destination selection is an ordered two-tier fallback:
//!
//! 1. The registration's own poison destination, when it resolves to a queue in the same
//!    backend scope as the origin queue and the transport can write to it
//! 2. The listener-wide default poison destination
//!
//! Routing copies the message to the destination first and deletes it from the origin
//! only after the copy succeeded. A failed copy leaves the message visible on the live
//! queue so a later cycle can try again.

use std::sync::Arc;

use tracing::{debug, error};

use super::registry::Registration;
use crate::logging::log_poison_routing;
use crate::messaging::{MessagingResult, QueueRef, QueueTransport, RawMessage};

/// Where a poisoned message was (or would be) sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoisonDestination {
    /// The registration's own poison queue
    ConsumerSpecific(QueueRef),
    /// The listener-wide default poison queue
    Default(QueueRef),
}

impl PoisonDestination {
    pub fn queue(&self) -> &QueueRef {
        match self {
            Self::ConsumerSpecific(queue) | Self::Default(queue) => queue,
        }
    }

    pub fn is_consumer_specific(&self) -> bool {
        matches!(self, Self::ConsumerSpecific(_))
    }
}

pub struct PoisonRouter {
    transport: Arc<dyn QueueTransport>,
    default_destination: QueueRef,
}

impl std::fmt::Debug for PoisonRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoisonRouter")
            .field("transport", &self.transport.provider_name())
            .field("default_destination", &self.default_destination)
            .finish()
    }
}

impl PoisonRouter {
    pub fn new(transport: Arc<dyn QueueTransport>, default_destination: QueueRef) -> Self {
        Self {
            transport,
            default_destination,
        }
    }

    pub fn default_destination(&self) -> &QueueRef {
        &self.default_destination
    }

    /// Choose the destination for a message from `origin` without touching any queue
    pub fn resolve_destination(
        &self,
        origin: &QueueRef,
        registration: Option<&Registration>,
    ) -> PoisonDestination {
        let consumer_destination = registration
            .and_then(|registration| registration.resolve_destination())
            .filter(|destination| {
                destination.is_colocated_with(origin)
                    && self.transport.supports_destination(destination)
            });

        match consumer_destination {
            Some(destination) => PoisonDestination::ConsumerSpecific(destination),
            None => {
                if let Some(registration) = registration {
                    debug!(
                        consumer_id = %registration.consumer_id(),
                        origin = %origin,
                        "No usable consumer poison destination, using default"
                    );
                }
                PoisonDestination::Default(self.default_destination.clone())
            }
        }
    }

    /// Copy `message` to its poison destination, then delete it from `origin`
    pub async fn route(
        &self,
        origin: &QueueRef,
        message: &RawMessage,
        registration: Option<&Registration>,
        reason: &str,
    ) -> MessagingResult<PoisonDestination> {
        let destination = self.resolve_destination(origin, registration);

        if let Err(e) = self.transport.copy_to(destination.queue(), message).await {
            error!(
                message_id = %message.id,
                origin = %origin,
                destination = %destination.queue(),
                error = %e,
                "Poison copy failed, message stays on the live queue"
            );
            return Err(e);
        }

        if let Err(e) = self.transport.delete(origin, message).await {
            error!(
                message_id = %message.id,
                origin = %origin,
                destination = %destination.queue(),
                error = %e,
                "Poison copy succeeded but delete from origin failed"
            );
            return Err(e);
        }

        log_poison_routing(
            origin,
            &message.id,
            destination.queue(),
            destination.is_consumer_specific(),
            reason,
        );
        Ok(destination)
    }
}
