//! # Messaging Module
//!
//! Transport-facing pieces of the shared queue: the [`QueueTransport`] capability the
//! listener is built on, the consumer-addressed [`MessageEnvelope`] and its codec, an
//! in-memory transport, and the producer-side [`SharedQueueWriter`].

pub mod envelope;
pub mod errors;
pub mod in_memory;
pub mod transport;
pub mod types;
pub mod writer;

pub use envelope::{EnvelopeCodec, JsonEnvelopeCodec, MessageEnvelope};
pub use errors::{DecodeError, MessagingError, MessagingResult};
pub use in_memory::{InMemoryQueueTransport, TransportOperation};
pub use transport::QueueTransport;
pub use types::{MessageId, QueueRef, RawMessage};
pub use writer::SharedQueueWriter;
