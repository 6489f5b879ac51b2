// src/protocol/codec.rs

//! Encoding and decoding of single protocol lines.

use serde::Serialize;
use serde_json::{json, Map, Value};

use super::envelope::Envelope;
use super::ProtocolError;

/// Decode one request line into an [`Envelope`].
///
/// Surrounding whitespace (including the trailing `\n`) is ignored; anything
/// other than a JSON object is rejected.
pub fn decode_envelope(line: &[u8]) -> Result<Envelope, ProtocolError> {
    let value: Value = serde_json::from_slice(line).map_err(ProtocolError::Decode)?;
    match value {
        Value::Object(map) => Ok(Envelope::new(map)),
        _ => Err(ProtocolError::NotAnObject),
    }
}

/// Encode an action result as exactly one newline-terminated line.
///
/// A `null` result (e.g. `None`) is sent as `{}`.
pub fn encode_result<T: Serialize + ?Sized>(result: &T) -> Result<Vec<u8>, ProtocolError> {
    let encoded = serde_json::to_vec(result).map_err(ProtocolError::Encode)?;
    let mut line = if encoded == b"null" {
        b"{}".to_vec()
    } else {
        strip_newlines(&encoded)
    };
    line.push(b'\n');
    Ok(line)
}

/// The `{"error":"<message>"}` line written in place of a result.
pub fn error_line(message: &str) -> Vec<u8> {
    let mut line = serde_json::to_vec(&json!({ "error": message }))
        .unwrap_or_else(|_| br#"{"error":"unencodable error"}"#.to_vec());
    line.push(b'\n');
    line
}

/// Remove every literal `\n` byte.
pub fn strip_newlines(bytes: &[u8]) -> Vec<u8> {
    bytes.iter().copied().filter(|b| *b != b'\n').collect()
}

/// True if `bytes` parse as a JSON object.
pub fn is_json_object(bytes: &[u8]) -> bool {
    serde_json::from_slice::<Map<String, Value>>(bytes).is_ok()
}
