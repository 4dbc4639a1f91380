//! Records exchanged with the broker client.

use serde::{Deserialize, Serialize};

/// A message handed to a producer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    /// Partitioning key. `None` leaves partition choice to the broker client.
    pub key: Option<Vec<u8>>,
}

impl OutboundMessage {
    pub fn new(topic: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            topic: topic.into(),
            payload,
            key: None,
        }
    }

    /// Create a message with a UTF-8 text payload.
    pub fn text(topic: impl Into<String>, message: &str) -> Self {
        Self::new(topic, message.as_bytes().to_vec())
    }

    pub fn with_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.key = Some(key.into());
        self
    }
}

/// Delivery metadata returned once the broker acknowledged a message.
///
/// Serializes to the action output mapping `{topic, partition, offset, error}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryResult {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    /// Broker error code, `0` on success.
    pub error: i32,
}

impl DeliveryResult {
    pub fn acknowledged(topic: impl Into<String>, partition: i32, offset: i64) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
            error: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error == 0
    }
}

/// A record pulled from a subscription.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub value: Vec<u8>,
}
