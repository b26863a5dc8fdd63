#![allow(clippy::doc_markdown)] // Allow technical terms in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Shared Queue Listener
//!
//! One poll loop serving many logical triggers that share a single physical queue.
//!
//! ## Overview
//!
//! Producers address each message to a consumer identifier. The listener polls the
//! shared queue with a randomized exponential backoff, dispatches every message to the
//! handler registered for its consumer, and moves messages that keep failing into a
//! poison queue. Each consumer can have its own poison queue; when it cannot be used
//! (different backend scope, restricted backend, no destination configured) the
//! listener-wide default poison queue receives the message instead.
//!
//! ## Key Features
//!
//! - **Adaptive Polling**: Backoff grows on empty polls, resets when work arrives, and
//!   can be cut short by a wake notification
//! - **Concurrent Registration**: Consumers subscribe and unsubscribe while the loop runs
//! - **Per-Consumer Poison Routing**: Copy-then-delete, never losing a message on a
//!   failed copy
//! - **Graceful Shutdown**: In-flight dispatch drains within a bounded timeout
//!
//! ## Module Organization
//!
//! - [`listener`] - Poll loop, registrations, executor and poison routing
//! - [`messaging`] - Transport trait, envelope codec, in-memory transport and writer
//! - [`config`] - Listener configuration and layered loading
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use shared_queue_listener::config::ListenerConfig;
//! use shared_queue_listener::listener::{handler_fn, QueueListener, Registration};
//! use shared_queue_listener::messaging::{InMemoryQueueTransport, QueueRef};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = Arc::new(InMemoryQueueTransport::new());
//! let listener = QueueListener::builder()
//!     .config(ListenerConfig::default())
//!     .queue(QueueRef::new("primary", "triggers"))
//!     .default_poison_queue(QueueRef::new("primary", "triggers-poison"))
//!     .transport(transport)
//!     .build()?;
//!
//! listener.registrations().register(
//!     Registration::new(
//!         "orders.process",
//!         handler_fn(|payload, _context| async move {
//!             println!("processing {payload}");
//!             anyhow::Ok(())
//!         }),
//!     )
//!     .with_poison_queue(QueueRef::new("primary", "orders-poison")),
//! )?;
//!
//! listener.start()?;
//! // ...
//! listener.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod listener;
pub mod logging;
pub mod messaging;

pub use config::{ConfigurationError, ListenerConfig};
pub use error::{ListenerError, ListenerResult};
pub use listener::{
    handler_fn, CycleSummary, DelayStrategy, ListenerState, PoisonDestination, QueueListener,
    RandomizedExponentialBackoff, Registration, RegistrationTable, TriggerContext,
    TriggerHandler, WakeNotifier, WakeSignal,
};
pub use logging::init_structured_logging;
pub use messaging::{
    EnvelopeCodec, InMemoryQueueTransport, JsonEnvelopeCodec, MessageEnvelope, MessageId,
    MessagingError, QueueRef, QueueTransport, RawMessage, SharedQueueWriter,
};
