//! # Message Decoder
//!
//! Inbound frames are UTF-8 JSON. The backend wraps each reading in an
//! envelope (`{"data": {...}}`), but bare readings are accepted as well so a
//! producer can push either shape.

use serde_json::Value;
use thiserror::Error;

use crate::models::Reading;

/// Why a frame was rejected.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid reading: {0}")]
    Invalid(&'static str),
}

/// Decodes one text frame into a reading.
///
/// When the payload is an object whose `data` field is itself an object, that
/// inner object is the reading. Anything else is treated as the reading.
pub fn decode_frame(text: &str) -> Result<Reading, DecodeError> {
    let parsed: Value = serde_json::from_str(text)?;
    let reading: Reading = serde_json::from_value(unwrap_envelope(parsed))?;
    reading.validate().map_err(DecodeError::Invalid)?;
    Ok(reading)
}

fn unwrap_envelope(payload: Value) -> Value {
    match payload {
        Value::Object(mut map) => match map.remove("data") {
            Some(inner @ Value::Object(_)) => inner,
            Some(other) => {
                map.insert("data".to_string(), other);
                Value::Object(map)
            }
            None => Value::Object(map),
        },
        other => other,
    }
}
