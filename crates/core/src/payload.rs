//! Decode-or-fallback parsing of message bodies.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Sentinel field a raw body is wrapped under.
pub const RAW_FIELD: &str = "raw";

/// Parsed form of a message body.
///
/// Decoding failure is an expected outcome: anything that is not a JSON
/// object is kept as [`Payload::RawFallback`] and still stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "variant", content = "value", rename_all = "snake_case")]
pub enum Payload {
    /// Key-value mapping decoded from the body.
    Structured(Map<String, Value>),
    /// Original body, kept verbatim.
    RawFallback(String),
}

impl Payload {
    /// Decodes a body, falling back to the raw form on any decode failure.
    pub fn decode(body: &[u8]) -> Self {
        match Self::try_decode(body) {
            Ok(map) => Self::Structured(map),
            Err(_) => Self::RawFallback(String::from_utf8_lossy(body).into_owned()),
        }
    }

    /// Decodes a body as a JSON object.
    ///
    /// Valid JSON that is not an object (`42`, `[1]`, `"text"`) is not a
    /// key-value mapping and is rejected like malformed input.
    pub fn try_decode(body: &[u8]) -> Result<Map<String, Value>> {
        match serde_json::from_slice::<Value>(body) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(Error::Decode(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))),
            Err(e) => Err(Error::Decode(e.to_string())),
        }
    }

    pub fn is_raw_fallback(&self) -> bool {
        matches!(self, Self::RawFallback(_))
    }

    /// Returns the caller-supplied value of `field`, if usable as a key.
    ///
    /// Non-empty strings are taken verbatim and numbers use their JSON
    /// text. Everything else (empty string, null, bool, array, object)
    /// counts as absent. Raw bodies never supply a key.
    ///
    /// This is a type rule, not a truthiness rule: `0` is a usable key,
    /// while `true` or a non-empty array is not, since neither names an
    /// order. Producers keying orders by a boolean or a list get a
    /// synthesized key per delivery instead of a stringified value.
    pub fn supplied_key(&self, field: &str) -> Option<String> {
        let Self::Structured(map) = self else {
            return None;
        };

        match map.get(field)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// JSON form stored under the record's payload field.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Structured(map) => Value::Object(map.clone()),
            Self::RawFallback(body) => {
                let mut map = Map::with_capacity(1);
                map.insert(RAW_FIELD.to_string(), Value::String(body.clone()));
                Value::Object(map)
            }
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
