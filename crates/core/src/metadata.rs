//! Record metadata and flattening
//!
//! Backends only guarantee flat scalar metadata. Callers hand the store an
//! arbitrary JSON object; [`flatten_metadata`] turns it into a map of
//! [`MetadataValue`]s:
//!
//! - scalars pass through unchanged
//! - arrays and objects become canonical JSON text (`Composite`)
//! - `null` values are dropped, never stored as sentinels

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use std::fmt;

/// Flat metadata map as stored by every provider
pub type Metadata = BTreeMap<String, MetadataValue>;

/// A single flat metadata value
///
/// `Composite` holds the canonical JSON text of an array or object. On the
/// wire it is an ordinary string, so values read back from a backend always
/// decode as `String`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    /// Boolean value
    Bool(bool),
    /// Integral number
    Int(i64),
    /// Floating point number
    Float(f64),
    /// Plain string
    String(String),
    /// Serialized array/object
    Composite(String),
}

impl MetadataValue {
    /// String content for `String` and `Composite` values
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::String(s) | MetadataValue::Composite(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric content for `Int` and `Float` values
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetadataValue::Int(n) => Some(*n as f64),
            MetadataValue::Float(n) => Some(*n),
            _ => None,
        }
    }

    /// Boolean content
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            MetadataValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Convert to the JSON value sent to a backend
    pub fn to_json(&self) -> JsonValue {
        match self {
            MetadataValue::Bool(b) => JsonValue::Bool(*b),
            MetadataValue::Int(n) => JsonValue::from(*n),
            MetadataValue::Float(n) => serde_json::Number::from_f64(*n)
                .map(JsonValue::Number)
                .unwrap_or_else(|| JsonValue::String(n.to_string())),
            MetadataValue::String(s) | MetadataValue::Composite(s) => JsonValue::String(s.clone()),
        }
    }

    /// Decode a composite value back into JSON, if it is one
    pub fn parse_composite(&self) -> Option<JsonValue> {
        match self {
            MetadataValue::Composite(text) => serde_json::from_str(text).ok(),
            _ => None,
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Bool(b) => write!(f, "{}", b),
            MetadataValue::Int(n) => write!(f, "{}", n),
            MetadataValue::Float(n) => write!(f, "{}", n),
            MetadataValue::String(s) | MetadataValue::Composite(s) => f.write_str(s),
        }
    }
}

impl From<bool> for MetadataValue {
    fn from(b: bool) -> Self {
        MetadataValue::Bool(b)
    }
}

impl From<i32> for MetadataValue {
    fn from(n: i32) -> Self {
        MetadataValue::Int(n as i64)
    }
}

impl From<i64> for MetadataValue {
    fn from(n: i64) -> Self {
        MetadataValue::Int(n)
    }
}

impl From<f64> for MetadataValue {
    fn from(n: f64) -> Self {
        MetadataValue::Float(n)
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        MetadataValue::String(s)
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        MetadataValue::String(s.to_string())
    }
}

/// Flatten one JSON value; `None` means "drop this key".
pub fn flatten_value(value: &JsonValue) -> Option<MetadataValue> {
    match value {
        JsonValue::Null => None,
        JsonValue::Bool(b) => Some(MetadataValue::Bool(*b)),
        JsonValue::Number(n) => Some(if let Some(i) = n.as_i64() {
            MetadataValue::Int(i)
        } else if let Some(f) = n.as_f64() {
            MetadataValue::Float(f)
        } else {
            MetadataValue::String(n.to_string())
        }),
        JsonValue::String(s) => Some(MetadataValue::String(s.clone())),
        // serde_json's default map is ordered, so the text is canonical
        JsonValue::Array(_) | JsonValue::Object(_) => {
            Some(MetadataValue::Composite(value.to_string()))
        }
    }
}

/// Flatten a JSON object into store metadata
pub fn flatten_metadata(input: &Map<String, JsonValue>) -> Metadata {
    input
        .iter()
        .filter_map(|(key, value)| flatten_value(value).map(|v| (key.clone(), v)))
        .collect()
}

/// Flatten any JSON value; non-objects yield empty metadata
pub fn flatten_json(input: &JsonValue) -> Metadata {
    input.as_object().map(flatten_metadata).unwrap_or_default()
}

/// Convert flat metadata into the JSON object sent over the wire
pub fn metadata_to_json(metadata: &Metadata) -> Map<String, JsonValue> {
    metadata
        .iter()
        .map(|(k, v)| (k.clone(), v.to_json()))
        .collect()
}
