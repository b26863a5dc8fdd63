//! # Registration Table
//!
//! Maps consumer identifiers to their [`Registration`]. Every dispatched message is
//! resolved through this table, while consumers subscribe and unsubscribe concurrently
//! with polling, so it is backed by a sharded concurrent map: lookups never wait on
//! unrelated writers.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, info};

use super::handler::TriggerHandler;
use crate::error::{ListenerError, ListenerResult};
use crate::messaging::QueueRef;

/// Source of a consumer-specific poison destination
///
/// Injected at registration time. Resolution runs on the poison path only, so it may
/// consult state that changes over the consumer's lifetime.
pub trait PoisonDestinationResolver: Send + Sync + 'static {
    fn resolve_destination(&self) -> Option<QueueRef>;
}

impl PoisonDestinationResolver for QueueRef {
    fn resolve_destination(&self) -> Option<QueueRef> {
        Some(self.clone())
    }
}

/// Resolver for consumers without a poison queue of their own
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPoisonDestination;

impl PoisonDestinationResolver for NoPoisonDestination {
    fn resolve_destination(&self) -> Option<QueueRef> {
        None
    }
}

/// Adapter turning a closure into a [`PoisonDestinationResolver`]
pub struct ResolverFn<F>(F);

pub fn resolver_fn<F>(f: F) -> ResolverFn<F>
where
    F: Fn() -> Option<QueueRef> + Send + Sync + 'static,
{
    ResolverFn(f)
}

impl<F> PoisonDestinationResolver for ResolverFn<F>
where
    F: Fn() -> Option<QueueRef> + Send + Sync + 'static,
{
    fn resolve_destination(&self) -> Option<QueueRef> {
        (self.0)()
    }
}

/// Binding between a consumer identifier, its handler and its poison destination
#[derive(Clone)]
pub struct Registration {
    consumer_id: String,
    handler: Arc<dyn TriggerHandler>,
    poison_destination: Arc<dyn PoisonDestinationResolver>,
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("consumer_id", &self.consumer_id)
            .field("poison_destination", &self.resolve_destination())
            .finish()
    }
}

impl Registration {
    /// Create a registration without a consumer-specific poison queue
    pub fn new<H: TriggerHandler>(consumer_id: impl Into<String>, handler: H) -> Self {
        Self {
            consumer_id: consumer_id.into(),
            handler: Arc::new(handler),
            poison_destination: Arc::new(NoPoisonDestination),
        }
    }

    /// Poison this consumer's messages into a fixed queue
    pub fn with_poison_queue(mut self, queue: QueueRef) -> Self {
        self.poison_destination = Arc::new(queue);
        self
    }

    /// Poison this consumer's messages into whatever `resolver` yields at the time
    pub fn with_destination_resolver<R: PoisonDestinationResolver>(mut self, resolver: R) -> Self {
        self.poison_destination = Arc::new(resolver);
        self
    }

    pub fn consumer_id(&self) -> &str {
        &self.consumer_id
    }

    pub fn handler(&self) -> &Arc<dyn TriggerHandler> {
        &self.handler
    }

    pub fn resolve_destination(&self) -> Option<QueueRef> {
        self.poison_destination.resolve_destination()
    }
}

/// Concurrent table of registrations keyed by consumer identifier
#[derive(Debug, Default)]
pub struct RegistrationTable {
    registrations: DashMap<String, Arc<Registration>>,
}

impl RegistrationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a registration; identifiers must be non-blank and unique
    pub fn register(&self, registration: Registration) -> ListenerResult<()> {
        let consumer_id = registration.consumer_id().to_string();
        if consumer_id.trim().is_empty() {
            return Err(ListenerError::InvalidConsumerId(consumer_id));
        }

        match self.registrations.entry(consumer_id.clone()) {
            Entry::Occupied(_) => Err(ListenerError::DuplicateRegistration(consumer_id)),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(registration));
                info!(consumer_id = %consumer_id, "Consumer registered");
                Ok(())
            }
        }
    }

    /// Remove a registration, returning it if it existed
    pub fn unregister(&self, consumer_id: &str) -> Option<Arc<Registration>> {
        let removed = self.registrations.remove(consumer_id).map(|(_, r)| r);
        if removed.is_some() {
            info!(consumer_id = %consumer_id, "Consumer unregistered");
        } else {
            debug!(consumer_id = %consumer_id, "Unregister for unknown consumer ignored");
        }
        removed
    }

    /// Find the registration for a consumer; unknown identifiers yield `None`
    pub fn lookup(&self, consumer_id: &str) -> Option<Arc<Registration>> {
        self.registrations
            .get(consumer_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// The consumer-specific poison destination, if the consumer is known and has one
    pub fn resolve_destination(&self, consumer_id: &str) -> Option<QueueRef> {
        self.lookup(consumer_id)
            .and_then(|registration| registration.resolve_destination())
    }

    pub fn contains(&self, consumer_id: &str) -> bool {
        self.registrations.contains_key(consumer_id)
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Registered consumer identifiers, sorted
    pub fn consumer_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .registrations
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        ids.sort();
        ids
    }
}
