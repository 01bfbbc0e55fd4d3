//! Qualified-name addressing into the variable store.
//!
//! A qualified name is `[namespace#]base[.field.sub]`. The store is flat and
//! keyed by `namespace#base`; the dotted remainder indexes into the base
//! variable's structured value. Deep writes rebuild the structure level by
//! level and store the result back into the base variable.

use super::error::{Result, WeftError};
use super::types::{Value, VariableStore};

/// Split a qualified name into its store key and the remaining dotted path.
pub fn split_name(name: &str) -> (String, Option<&str>) {
    let (namespace, local) = match name.split_once('#') {
        Some((ns, rest)) => (Some(ns), rest),
        None => (None, name),
    };
    match local.split_once('.') {
        Some((base, remaining)) => {
            let key = match namespace {
                Some(ns) => format!("{}#{}", ns, base),
                None => base.to_string(),
            };
            (key, Some(remaining))
        }
        None => (name.to_string(), None),
    }
}

/// Store key of a qualified name.
pub fn base_name(name: &str) -> String {
    split_name(name).0
}

/// Read the value addressed by `name`.
pub fn get(store: &VariableStore, name: &str) -> Result<Value> {
    let (key, remaining) = split_name(name);
    let variable = store
        .get(&key)
        .ok_or_else(|| WeftError::MissingVariable(key.clone()))?;

    let mut current = variable.value.clone();
    if let Some(path) = remaining {
        for segment in path.split('.') {
            current = index(&current, name, segment)?;
        }
    }
    Ok(current)
}

/// Write `value` at the location addressed by `name`.
pub fn set(store: &mut VariableStore, name: &str, value: Value) -> Result<()> {
    let (key, remaining) = split_name(name);
    let variable = store
        .get_mut(&key)
        .ok_or_else(|| WeftError::MissingVariable(key.clone()))?;

    let Some(path) = remaining else {
        variable.value = value;
        return Ok(());
    };

    let segments: Vec<&str> = path.split('.').collect();
    let root = match &variable.value {
        Value::Structured(json) => json.clone(),
        Value::Scalar(_) => {
            return Err(WeftError::NotStructural {
                name: name.to_string(),
                segment: segments[0].to_string(),
            })
        }
    };
    let rebuilt = rebuild(root, &segments, value.into(), name)?;
    variable.value = Value::from(rebuilt);
    Ok(())
}

fn index(current: &Value, name: &str, segment: &str) -> Result<Value> {
    let Value::Structured(json) = current else {
        return Err(WeftError::NotStructural {
            name: name.to_string(),
            segment: segment.to_string(),
        });
    };
    lookup(json, segment)
        .map(|child| Value::from(child.clone()))
        .ok_or_else(|| WeftError::MissingField {
            name: name.to_string(),
            segment: segment.to_string(),
        })
}

fn lookup<'a>(json: &'a serde_json::Value, segment: &str) -> Option<&'a serde_json::Value> {
    match json {
        serde_json::Value::Object(fields) => fields.get(segment),
        serde_json::Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

/// Rebuild `current` with the field at `path` replaced by `value`.
fn rebuild(
    current: serde_json::Value,
    path: &[&str],
    value: serde_json::Value,
    name: &str,
) -> Result<serde_json::Value> {
    let Some((segment, rest)) = path.split_first() else {
        return Ok(value);
    };
    let missing = || WeftError::MissingField {
        name: name.to_string(),
        segment: segment.to_string(),
    };

    match current {
        serde_json::Value::Object(mut fields) => {
            if rest.is_empty() {
                fields.insert(segment.to_string(), value);
            } else {
                let child = fields.get_mut(*segment).ok_or_else(missing)?;
                *child = rebuild(child.take(), rest, value, name)?;
            }
            Ok(serde_json::Value::Object(fields))
        }
        serde_json::Value::Array(mut items) => {
            let child = segment
                .parse::<usize>()
                .ok()
                .and_then(|i| items.get_mut(i))
                .ok_or_else(missing)?;
            *child = rebuild(child.take(), rest, value, name)?;
            Ok(serde_json::Value::Array(items))
        }
        // A nested field may itself hold JSON-encoded text.
        other => match Value::from(other) {
            Value::Structured(inner) => rebuild(inner, path, value, name),
            Value::Scalar(_) => Err(WeftError::NotStructural {
                name: name.to_string(),
                segment: segment.to_string(),
            }),
        },
    }
}
