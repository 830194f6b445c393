//! Unwrapping tastypie response envelopes.
//!
//! List endpoints answer `{"meta": {...}, "objects": [...]}`, detail endpoints
//! a bare object, and customised resources sometimes `{"objects": {...}}` or a
//! bare list. None of these shapes is required; whatever is not wrapped is
//! passed through.

use serde_json::Value;

use crate::error::{ApiError, ApiResult};
use crate::http::HttpResponse;
use crate::resource::ResourceSet;

/// Decode a response body. Empty bodies decode to `None`.
pub fn decode_body(response: &HttpResponse) -> ApiResult<Option<Value>> {
    if !response.has_body() {
        return Ok(None);
    }
    serde_json::from_str(&response.body)
        .map(Some)
        .map_err(|e| ApiError::Deserialization(e.to_string()))
}

/// The single-entity representation inside `raw`.
///
/// The first element of an `objects` array, an `objects` object, or `raw`
/// itself.
pub fn parse_entity(raw: Value) -> Value {
    match raw.get("objects") {
        Some(Value::Array(objects)) if !objects.is_empty() => objects[0].clone(),
        Some(object @ Value::Object(_)) => object.clone(),
        _ => raw,
    }
}

/// The members inside `raw` plus its `meta`, if any.
pub fn split_collection(raw: Value) -> (Vec<Value>, Option<Value>) {
    let (objects, meta) = match raw {
        Value::Object(mut map) if map.contains_key("objects") => {
            let meta = map.remove("meta");
            let objects = map.remove("objects").unwrap_or(Value::Null);
            (objects, meta)
        }
        Value::Object(map) => {
            let meta = map.get("meta").cloned();
            (Value::Object(map), meta)
        }
        other => (other, None),
    };
    let meta = meta.filter(|meta| !meta.is_null());
    let objects = match objects {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        other => vec![other],
    };
    (objects, meta)
}

/// Unwrap a list response for `set`, replacing its metadata when `raw` has any.
pub fn parse_collection<S: ResourceSet>(set: &mut S, raw: Value) -> Vec<Value> {
    let (objects, meta) = split_collection(raw);
    if let Some(meta) = meta {
        set.set_meta(meta);
    }
    objects
}
