//! # Listener Module
//!
//! The shared queue listener and the pieces it is assembled from:
//!
//! - [`delay`] - Poll interval strategy (randomized exponential backoff)
//! - [`registry`] - Consumer registrations and their poison destinations
//! - [`executor`] - Decoding, registration lookup and handler invocation
//! - [`poison`] - Two-tier poison destination selection and routing
//! - [`queue_listener`] - The poll loop, its lifecycle and statistics

pub mod delay;
pub mod executor;
pub mod handler;
pub mod poison;
pub mod queue_listener;
pub mod registry;
pub mod stats;
pub mod wake;

pub use delay::{DelayStrategy, RandomizedExponentialBackoff};
pub use executor::{ExecutionOutcome, TriggerExecutor};
pub use handler::{handler_fn, FnTriggerHandler, TriggerContext, TriggerHandler};
pub use poison::{PoisonDestination, PoisonRouter};
pub use queue_listener::{CycleSummary, ListenerState, QueueListener, QueueListenerBuilder};
pub use registry::{
    resolver_fn, NoPoisonDestination, PoisonDestinationResolver, Registration,
    RegistrationTable, ResolverFn,
};
pub use stats::{ListenerStats, ListenerStatsSnapshot};
pub use wake::{WakeNotifier, WakeSignal};
