//! Best-effort payload decoding.
//!
//! A failed parse is not an error: the payload is carried through unchanged,
//! as text when it is valid UTF-8 and as base64 otherwise.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::Value;

/// Result of decoding a payload.
#[derive(Clone, Debug, PartialEq)]
pub enum Decoded {
    /// The payload parsed as JSON.
    Structured(Value),
    /// Not JSON, but valid UTF-8.
    Text(String),
    /// Neither JSON nor UTF-8.
    Binary(Vec<u8>),
}

impl Decoded {
    pub fn is_structured(&self) -> bool {
        matches!(self, Decoded::Structured(_))
    }

    /// Collapse into the `message` field of an event.
    pub fn into_value(self) -> Value {
        match self {
            Decoded::Structured(value) => value,
            Decoded::Text(text) => Value::String(text),
            Decoded::Binary(bytes) => Value::String(BASE64.encode(bytes)),
        }
    }
}

/// Decode a payload. Never fails.
pub fn decode(payload: &[u8]) -> Decoded {
    if let Ok(value) = serde_json::from_slice::<Value>(payload) {
        return Decoded::Structured(value);
    }
    match std::str::from_utf8(payload) {
        Ok(text) => Decoded::Text(text.to_string()),
        Err(_) => Decoded::Binary(payload.to_vec()),
    }
}
