//! Message envelopes handed to application code on receive.

use crate::transport::RawMessage;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// One received unit of work
///
/// Envelopes are created by [`DispatchService::receive`](crate::DispatchService::receive).
/// After processing, the caller marks an envelope ready and passes it to
/// [`DispatchService::batch_delete`](crate::DispatchService::batch_delete).
/// Envelopes never marked ready stay on the queue and are redelivered once
/// their visibility timeout expires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    /// Transport-assigned message identifier
    pub id: String,
    /// Token required to delete the message
    pub acknowledgment_token: String,
    /// Decoded payload
    pub body: Value,
    /// Whether the message may be deleted by the next batch delete
    pub ready_for_acknowledgment: bool,
    /// Caller-owned annotations, never sent to the transport
    pub metadata: HashMap<String, Value>,
}

impl MessageEnvelope {
    /// Create a new envelope that is not yet ready for acknowledgment
    pub fn new(id: impl Into<String>, acknowledgment_token: impl Into<String>, body: Value) -> Self {
        Self {
            id: id.into(),
            acknowledgment_token: acknowledgment_token.into(),
            body,
            ready_for_acknowledgment: false,
            metadata: HashMap::new(),
        }
    }

    /// Build an envelope from a raw transport message
    ///
    /// The payload is decoded as JSON. A payload that is not valid JSON is
    /// kept verbatim as a JSON string so the message can still be processed
    /// and acknowledged.
    pub fn from_raw(raw: RawMessage) -> Self {
        let body = match serde_json::from_str::<Value>(&raw.body) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(
                    message_id = %raw.message_id,
                    error = %e,
                    "Message body is not valid JSON; keeping raw text"
                );
                Value::String(raw.body)
            }
        };

        Self::new(raw.message_id, raw.receipt_handle, body)
    }

    /// Mark the envelope as successfully processed
    pub fn mark_ready(&mut self) {
        self.ready_for_acknowledgment = true;
    }

    /// Attach a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Attach a metadata entry in place
    pub fn insert_metadata(&mut self, key: impl Into<String>, value: Value) {
        self.metadata.insert(key.into(), value);
    }

    /// Decode the body into a concrete type
    pub fn body_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.body)
    }
}

#[cfg(test)]
#[path = "envelope_tests.rs"]
mod tests;
