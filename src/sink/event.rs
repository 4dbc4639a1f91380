//! The canonical event emitted for every inbound record.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::broker::InboundRecord;
use crate::decode::decode;

/// Trigger name events are dispatched under.
pub const TRIGGER: &str = "kafka.new_message";

/// An inbound record, normalized for the dispatch sink.
///
/// Serializes to `{topic, partition, offset, key, message}`. Keys are written
/// as text when they are valid UTF-8 and as base64 otherwise.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Event {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    #[serde(serialize_with = "serialize_key")]
    pub key: Option<Vec<u8>>,
    /// Decoded payload, or the raw payload when decoding failed.
    pub message: Value,
}

impl Event {
    /// Build an event from a record, decoding its payload.
    pub fn from_record(record: &InboundRecord) -> Self {
        Self {
            topic: record.topic.clone(),
            partition: record.partition,
            offset: record.offset,
            key: record.key.clone(),
            message: decode(&record.value).into_value(),
        }
    }

    /// The key as text, if present and valid UTF-8.
    pub fn key_str(&self) -> Option<&str> {
        self.key.as_deref().and_then(|k| std::str::from_utf8(k).ok())
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

fn serialize_key<S: Serializer>(key: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
    match key {
        None => serializer.serialize_none(),
        Some(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) => serializer.serialize_str(text),
            Err(_) => serializer.serialize_str(&BASE64.encode(bytes)),
        },
    }
}
