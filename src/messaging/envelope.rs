//! # Message Envelope
//!
//! Every message on the shared queue wraps its payload in an envelope naming the
//! consumer it is addressed to. The wire format is pluggable through [`EnvelopeCodec`];
//! [`JsonEnvelopeCodec`] is the default.

use serde::{Deserialize, Serialize};

use super::errors::DecodeError;

/// Consumer-addressed payload carried on the shared queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    /// Identifier of the registration this message is addressed to
    pub consumer_id: String,
    /// Opaque payload handed to the consumer's handler
    pub payload: serde_json::Value,
}

impl MessageEnvelope {
    pub fn new(consumer_id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            consumer_id: consumer_id.into(),
            payload,
        }
    }
}

/// Wire encoding for message envelopes
pub trait EnvelopeCodec: Send + Sync + 'static {
    /// Decode raw message bytes into an envelope
    fn decode(&self, bytes: &[u8]) -> Result<MessageEnvelope, DecodeError>;

    /// Encode an envelope into message bytes
    fn encode(&self, envelope: &MessageEnvelope) -> Result<Vec<u8>, DecodeError>;
}

/// JSON envelope encoding: `{"consumer_id": "...", "payload": ...}`
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEnvelopeCodec;

impl EnvelopeCodec for JsonEnvelopeCodec {
    fn decode(&self, bytes: &[u8]) -> Result<MessageEnvelope, DecodeError> {
        let envelope: MessageEnvelope = serde_json::from_slice(bytes)?;
        if envelope.consumer_id.trim().is_empty() {
            return Err(DecodeError::MissingConsumerId);
        }
        Ok(envelope)
    }

    fn encode(&self, envelope: &MessageEnvelope) -> Result<Vec<u8>, DecodeError> {
        Ok(serde_json::to_vec(envelope)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_valid_envelope() {
        let codec = JsonEnvelopeCodec;
        let envelope = codec
            .decode(br#"{"consumer_id": "orders.process", "payload": {"order_id": 1001}}"#)
            .unwrap();

        assert_eq!(envelope.consumer_id, "orders.process");
        assert_eq!(envelope.payload, json!({"order_id": 1001}));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let codec = JsonEnvelopeCodec;
        assert!(matches!(
            codec.decode(b"not an envelope"),
            Err(DecodeError::Malformed { .. })
        ));
        assert!(matches!(
            codec.decode(br#"{"payload": 1}"#),
            Err(DecodeError::Malformed { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_blank_consumer_id() {
        let codec = JsonEnvelopeCodec;
        assert_eq!(
            codec.decode(br#"{"consumer_id": "  ", "payload": null}"#),
            Err(DecodeError::MissingConsumerId)
        );
    }
}
