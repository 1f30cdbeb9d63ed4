//! Dotted-path access over a JSON tree.
//!
//! Paths are relative to a layer's top-level object, e.g.
//! `profiles.lpar1.properties.port`. Segments are split on `.`, so property
//! names containing a dot cannot be addressed.

use crate::{Error, Result};
use serde_json::{Map, Value};

/// Split a dotted path into segments, rejecting empty segments.
pub fn segments(path: &str) -> Result<Vec<&str>> {
    let parts: Vec<&str> = path.split('.').collect();
    if path.is_empty() || parts.iter().any(|s| s.is_empty()) {
        return Err(Error::InvalidPath(format!("'{}'", path)));
    }
    Ok(parts)
}

/// Look up a dotted path.
pub fn get<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Write `value` at a dotted path, creating intermediate objects on demand.
///
/// An intermediate that holds a non-object value is replaced by an empty
/// object.
pub fn set(root: &mut Value, path: &str, value: Value) -> Result<()> {
    let parts = segments(path)?;
    let (last, parents) = parts
        .split_last()
        .ok_or_else(|| Error::InvalidPath(format!("'{}'", path)))?;

    let mut current = root;
    for segment in parents {
        let object = ensure_object(current, path)?;
        current = object
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    ensure_object(current, path)?.insert(last.to_string(), value);
    Ok(())
}

/// Remove the value at a dotted path, returning it.
pub fn remove(root: &mut Value, path: &str) -> Result<Option<Value>> {
    let parts = segments(path)?;
    let Some((last, parents)) = parts.split_last() else {
        return Ok(None);
    };

    let mut current = root;
    for segment in parents {
        match current.as_object_mut().and_then(|o| o.get_mut(*segment)) {
            Some(next) => current = next,
            None => return Ok(None),
        }
    }
    Ok(current
        .as_object_mut()
        .and_then(|object| object.shift_remove(*last)))
}

/// Whether `path` equals `ancestor` or lies beneath it.
pub fn is_within(path: &str, ancestor: &str) -> bool {
    path == ancestor
        || path
            .strip_prefix(ancestor)
            .is_some_and(|rest| rest.starts_with('.'))
}

/// Coerce a CLI-style string into a typed JSON value.
///
/// `"true"`/`"false"` become booleans and integer literals become numbers.
/// Anything else, including non-string values, is returned unchanged.
pub fn coerce(value: Value) -> Value {
    let Value::String(text) = value else {
        return value;
    };
    match text.as_str() {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ if is_integer_literal(&text) => match text.parse::<i64>() {
            Ok(number) => Value::from(number),
            Err(_) => Value::String(text),
        },
        _ => Value::String(text),
    }
}

fn is_integer_literal(text: &str) -> bool {
    let digits = text.strip_prefix('-').unwrap_or(text);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

fn ensure_object<'a>(value: &'a mut Value, path: &str) -> Result<&'a mut Map<String, Value>> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    value
        .as_object_mut()
        .ok_or_else(|| Error::InvalidPath(format!("'{}'", path)))
}
