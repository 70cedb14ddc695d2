//! Task result decoding
//!
//! Canonical wire shape: `result` is a JSON object carrying the expected key
//! at the top level, e.g. `{"stacks": [...]}`.
//!
//! Older agents send two other shapes, still accepted as deprecated
//! fallbacks: the whole result as a JSON-encoded string, and the payload
//! nested under `output` (itself an object or an encoded string). Nesting is
//! followed one level only.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;

/// A result payload as it arrived on the wire
#[derive(Debug, Clone, PartialEq)]
pub enum RawResult {
    Structured(Map<String, Value>),
    Encoded(String),
}

impl RawResult {
    /// Classify a JSON value. Anything but an object or string carries no data.
    pub fn classify(value: &Value) -> Option<RawResult> {
        match value {
            Value::Object(map) => Some(RawResult::Structured(map.clone())),
            Value::String(s) => Some(RawResult::Encoded(s.clone())),
            _ => None,
        }
    }

    /// The object behind this payload, parsing it if it was encoded
    fn open(self) -> Option<Map<String, Value>> {
        match self {
            RawResult::Structured(map) => Some(map),
            RawResult::Encoded(s) => match serde_json::from_str::<Value>(&s) {
                Ok(Value::Object(map)) => Some(map),
                _ => None,
            },
        }
    }

    fn is_encoded(&self) -> bool {
        matches!(self, RawResult::Encoded(_))
    }
}

/// Which of the accepted shapes a result arrived in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireShape {
    /// Structured object with the key at the top level
    Canonical,
    /// Deprecated: the result was a JSON-encoded string
    Encoded,
    /// Deprecated: the key was nested under `output`
    NestedOutput,
}

/// A field extracted from a result
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub value: Value,
    pub shape: WireShape,
}

/// Find `key` in a task result, accepting the canonical shape and the
/// deprecated fallbacks. Returns `None` when no shape carries the key.
pub fn decode_field(result: &Value, key: &str) -> Option<Decoded> {
    let raw = RawResult::classify(result)?;
    let encoded = raw.is_encoded();
    let outer = raw.open()?;

    if let Some(value) = outer.get(key) {
        let shape = if encoded {
            WireShape::Encoded
        } else {
            WireShape::Canonical
        };
        return Some(Decoded {
            value: value.clone(),
            shape,
        });
    }

    let inner = RawResult::classify(outer.get("output")?)?.open()?;
    inner.get(key).map(|value| Decoded {
        value: value.clone(),
        shape: WireShape::NestedOutput,
    })
}

/// Decode `key` from a task result into `T`, or `None` for "no data"
pub fn decode_as<T: DeserializeOwned>(result: &Value, key: &str) -> Option<T> {
    let decoded = decode_field(result, key)?;
    if decoded.shape != WireShape::Canonical {
        debug!(key, shape = ?decoded.shape, "Task result used a deprecated wire shape");
    }
    match serde_json::from_value(decoded.value) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!(key, "Task result field did not match the expected type: {}", e);
            None
        }
    }
}
