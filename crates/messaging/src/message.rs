//! Wire message types shared by all broker implementations.

use std::collections::BTreeMap;

/// Header carrying the retry attempt counter.
pub const X_ATTEMPT: &str = "x-attempt";

/// Header carrying the queue a retried message originally came from.
///
/// The retry ladder derives the parking-lot queue from the consumer queue;
/// the origin travels in the message so it never has to be inferred from
/// broker-specific binding metadata.
pub const X_ORIGIN_QUEUE: &str = "x-origin-queue";

/// Message headers. JSON values so integer counters and strings coexist.
pub type Headers = BTreeMap<String, serde_json::Value>;

/// A message on its way to the broker.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    /// Target exchange; empty string is the default exchange (routing key
    /// addresses a queue directly).
    pub exchange: String,
    pub routing_key: String,
    /// Publisher-assigned message id; the broker assigns one when absent.
    /// The outbox relay sets this to the outbox row id, so re-publishes of
    /// the same row carry the same id and dedupe downstream.
    pub message_id: Option<String>,
    pub headers: Headers,
    pub payload: Vec<u8>,
}

impl OutboundMessage {
    /// Creates a message with no headers.
    pub fn new(
        exchange: impl Into<String>,
        routing_key: impl Into<String>,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            exchange: exchange.into(),
            routing_key: routing_key.into(),
            message_id: None,
            headers: Headers::new(),
            payload,
        }
    }

    /// Attaches a header.
    pub fn with_header(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.headers.insert(key.into(), value);
        self
    }

    /// Sets the publisher-assigned message id.
    pub fn with_message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }
}

/// A message delivered from a queue to a handler.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// The queue the message was consumed from.
    pub queue: String,
    /// The routing key the message was published with.
    pub routing_key: String,
    /// Broker-assigned or publisher-assigned message id, when present.
    pub message_id: Option<String>,
    pub headers: Headers,
    pub payload: Vec<u8>,
}

impl InboundMessage {
    /// Returns the retry attempt counter, defaulting to zero.
    pub fn attempt(&self) -> u32 {
        self.headers
            .get(X_ATTEMPT)
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as u32
    }

    /// Deserializes the JSON payload.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempt_defaults_to_zero() {
        let msg = InboundMessage {
            queue: "q".to_string(),
            routing_key: "rk".to_string(),
            message_id: None,
            headers: Headers::new(),
            payload: Vec::new(),
        };
        assert_eq!(msg.attempt(), 0);
    }

    #[test]
    fn test_attempt_reads_header() {
        let mut headers = Headers::new();
        headers.insert(X_ATTEMPT.to_string(), serde_json::json!(3));
        let msg = InboundMessage {
            queue: "q".to_string(),
            routing_key: "rk".to_string(),
            message_id: None,
            headers,
            payload: Vec::new(),
        };
        assert_eq!(msg.attempt(), 3);
    }

    #[test]
    fn test_json_payload_roundtrip() {
        let msg = InboundMessage {
            queue: "q".to_string(),
            routing_key: "rk".to_string(),
            message_id: None,
            headers: Headers::new(),
            payload: serde_json::to_vec(&serde_json::json!({"order_id": "abc"})).unwrap(),
        };
        let value: serde_json::Value = msg.json().unwrap();
        assert_eq!(value["order_id"], "abc");
    }

    #[test]
    fn test_with_header_builder() {
        let msg = OutboundMessage::new("inventory.commands", "inventory.reserve.request", vec![])
            .with_header(X_ATTEMPT, serde_json::json!(1));
        assert_eq!(msg.headers.get(X_ATTEMPT), Some(&serde_json::json!(1)));
    }
}
