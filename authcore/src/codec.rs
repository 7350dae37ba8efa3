//! Text encoding for values that carry binary data.
//!
//! Binary leaves are written as a two-field marker object
//! `{"kind":"bytes","data":"<base64>"}` so they survive storage in any
//! JSON-capable column. Decoding walks the whole tree and turns every
//! marker back into [`Value::Bytes`], at any depth.
//!
//! Two legacy shapes are also accepted on decode, since older rows were
//! written by encoders that used them:
//! - `{"type":"Buffer","data":"<base64>"}`
//! - `{"type":"Buffer","data":[1,2,3]}`

use crate::value::Value;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde_json::Map;
use thiserror::Error;

pub const MARKER_KIND_FIELD: &str = "kind";
pub const MARKER_KIND_BYTES: &str = "bytes";
pub const MARKER_DATA_FIELD: &str = "data";

const LEGACY_TYPE_FIELD: &str = "type";
const LEGACY_TYPE_BUFFER: &str = "Buffer";

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid encoded text: {0}")]
    InvalidText(#[from] serde_json::Error),
}

/// Encodes `value` as JSON text. Output is deterministic: object keys are
/// always written in sorted order.
pub fn encode(value: &Value) -> Result<String, CodecError> {
    Ok(serde_json::to_string(&to_json(value))?)
}

/// Decodes text produced by [`encode`] (or by a legacy encoder).
pub fn decode(text: &str) -> Result<Value, CodecError> {
    let json: serde_json::Value = serde_json::from_str(text)?;
    Ok(from_json(json))
}

pub fn to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Number(n) => serde_json::Value::Number(n.clone()),
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Bytes(bytes) => {
            let mut marker = Map::with_capacity(2);
            marker.insert(
                MARKER_KIND_FIELD.to_string(),
                serde_json::Value::String(MARKER_KIND_BYTES.to_string()),
            );
            marker.insert(
                MARKER_DATA_FIELD.to_string(),
                serde_json::Value::String(STANDARD.encode(bytes)),
            );
            serde_json::Value::Object(marker)
        }
        Value::Array(items) => serde_json::Value::Array(items.iter().map(to_json).collect()),
        Value::Object(map) => serde_json::Value::Object(
            map.iter().map(|(k, v)| (k.clone(), to_json(v))).collect(),
        ),
    }
}

/// Recursive inverse of [`to_json`]. Every object matching a marker shape
/// becomes `Value::Bytes`, wherever it sits in the tree.
pub fn from_json(json: serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => Value::Number(n),
        serde_json::Value::String(s) => Value::String(s),
        serde_json::Value::Array(items) => Value::Array(items.into_iter().map(from_json).collect()),
        serde_json::Value::Object(map) => {
            if let Some(bytes) = json_marker_bytes(&map) {
                return Value::Bytes(bytes);
            }
            Value::Object(map.into_iter().map(|(k, v)| (k, from_json(v))).collect())
        }
    }
}

fn json_marker_bytes(map: &Map<String, serde_json::Value>) -> Option<Vec<u8>> {
    if map.len() != 2 {
        return None;
    }
    let data = map.get(MARKER_DATA_FIELD)?;
    if is_current_marker(map.get(MARKER_KIND_FIELD)) {
        return data.as_str().and_then(decode_base64);
    }
    if is_legacy_marker(map.get(LEGACY_TYPE_FIELD)) {
        return match data {
            serde_json::Value::String(s) => decode_base64(s),
            serde_json::Value::Array(items) => items
                .iter()
                .map(|n| n.as_u64().and_then(|n| u8::try_from(n).ok()))
                .collect(),
            _ => None,
        };
    }
    None
}

fn is_current_marker(kind: Option<&serde_json::Value>) -> bool {
    matches!(kind, Some(serde_json::Value::String(k)) if k == MARKER_KIND_BYTES)
}

fn is_legacy_marker(kind: Option<&serde_json::Value>) -> bool {
    matches!(kind, Some(serde_json::Value::String(k)) if k == LEGACY_TYPE_BUFFER)
}

/// Marker recognition over an already-decoded object. Returns `None` when the
/// object is not marker-shaped or its payload does not decode.
pub fn marker_bytes(map: &std::collections::BTreeMap<String, Value>) -> Option<Vec<u8>> {
    if map.len() != 2 {
        return None;
    }
    let data = map.get(MARKER_DATA_FIELD)?;
    let tag_matches = |field: &str, expected: &str| {
        matches!(map.get(field), Some(Value::String(s)) if s == expected)
    };

    if tag_matches(MARKER_KIND_FIELD, MARKER_KIND_BYTES) {
        return match data {
            Value::String(s) => decode_base64(s),
            // A marker whose payload was itself restored already.
            Value::Bytes(b) => Some(b.clone()),
            _ => None,
        };
    }
    if tag_matches(LEGACY_TYPE_FIELD, LEGACY_TYPE_BUFFER) {
        return match data {
            Value::String(s) => decode_base64(s),
            Value::Bytes(b) => Some(b.clone()),
            Value::Array(items) => items
                .iter()
                .map(|item| match item {
                    Value::Number(n) => n.as_u64().and_then(|n| u8::try_from(n).ok()),
                    _ => None,
                })
                .collect(),
            _ => None,
        };
    }
    None
}

/// True for objects that carry a marker tag, whether or not the payload is
/// valid. Lets the validator tell "corrupt marker" apart from "ordinary object".
pub fn looks_like_marker(map: &std::collections::BTreeMap<String, Value>) -> bool {
    map.contains_key(MARKER_DATA_FIELD)
        && (matches!(map.get(MARKER_KIND_FIELD), Some(Value::String(s)) if s == MARKER_KIND_BYTES)
            || matches!(map.get(LEGACY_TYPE_FIELD), Some(Value::String(s)) if s == LEGACY_TYPE_BUFFER))
}

fn decode_base64(s: &str) -> Option<Vec<u8>> {
    STANDARD.decode(s).ok()
}
