//! SHM response envelopes.
//!
//! List endpoints wrap results as `{"data": [...]}`; a few templates return a
//! bare object instead. `data` itself is occasionally an object rather than a
//! one-element array.

use serde::de::DeserializeOwned;
use serde_json::Value;

use vpnbot_core::{errors::Error, Result};

/// Every item of a `{"data": ...}` envelope. A missing or null `data` is empty.
pub(crate) fn decode_list<T: DeserializeOwned>(what: &str, body: &[u8]) -> Result<Vec<T>> {
    let value = parse(what, body)?;
    let data = match value {
        Value::Object(mut map) => map.remove("data").unwrap_or(Value::Null),
        other => {
            return Err(Error::Decode(format!(
                "{what}: expected an object envelope, got {}",
                kind(&other)
            )))
        }
    };
    items(what, data)
}

/// First item of an envelope, or the body itself when it is a bare object.
pub(crate) fn decode_one<T: DeserializeOwned>(what: &str, body: &[u8]) -> Result<Option<T>> {
    let value = parse(what, body)?;
    let data = match value {
        Value::Object(mut map) if map.contains_key("data") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        bare @ Value::Object(_) => bare,
        Value::Null => return Ok(None),
        other => {
            return Err(Error::Decode(format!(
                "{what}: expected an object, got {}",
                kind(&other)
            )))
        }
    };
    Ok(items(what, data)?.into_iter().next())
}

fn parse(what: &str, body: &[u8]) -> Result<Value> {
    serde_json::from_slice(body).map_err(|e| Error::Decode(format!("{what}: {e}")))
}

fn items<T: DeserializeOwned>(what: &str, data: Value) -> Result<Vec<T>> {
    let values = match data {
        Value::Null => return Ok(Vec::new()),
        Value::Array(xs) => xs,
        obj @ Value::Object(_) => vec![obj],
        other => {
            return Err(Error::Decode(format!(
                "{what}: unexpected data field {}",
                kind(&other)
            )))
        }
    };
    values
        .into_iter()
        .map(|v| serde_json::from_value(v).map_err(|e| Error::Decode(format!("{what}: {e}"))))
        .collect()
}

fn kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
