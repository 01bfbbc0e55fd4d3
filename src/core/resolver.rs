//! Reference resolution: merge a literal template with store references.
//!
//! `value` is a literal template and `reference` a parallel-shaped template
//! naming, per field, the variable that overrides the literal. The literal
//! `"$VALUE"` stands for the current object's value. Resolution is pure.

use super::path;
use super::types::{Value, VariableStore, VALUE_SENTINEL};
use serde_json::Value as Json;

/// Materialize `value`, substituting referenced variables from `store`.
pub fn resolve_reference(
    value: &Json,
    reference: &Json,
    store: &VariableStore,
    current: Option<&Value>,
) -> Json {
    match value {
        Json::Object(fields) => {
            let mut result = serde_json::Map::new();
            for (key, literal) in fields {
                let field_ref = reference.as_object().and_then(|refs| refs.get(key));
                result.insert(key.clone(), resolve_field(literal, field_ref, store, current));
            }
            if let Some(refs) = reference.as_object() {
                for (key, name) in refs {
                    if fields.contains_key(key) {
                        continue;
                    }
                    if let Some(resolved) = name.as_str().and_then(|n| lookup(store, n)) {
                        result.insert(key.clone(), resolved);
                    }
                }
            }
            Json::Object(result)
        }
        Json::Array(items) => {
            let refs = reference.as_array();
            let mut result: Vec<Json> = items
                .iter()
                .enumerate()
                .map(|(i, literal)| {
                    let item_ref = refs.and_then(|r| r.get(i));
                    resolve_field(literal, item_ref, store, current)
                })
                .collect();
            if let Some(refs) = refs {
                for name in refs.iter().skip(items.len()) {
                    if let Some(resolved) = name.as_str().and_then(|n| lookup(store, n)) {
                        result.push(resolved);
                    }
                }
            }
            Json::Array(result)
        }
        literal => reference
            .as_str()
            .and_then(|name| lookup(store, name))
            .unwrap_or_else(|| substitute_sentinel(literal, current)),
    }
}

fn resolve_field(
    literal: &Json,
    reference: Option<&Json>,
    store: &VariableStore,
    current: Option<&Value>,
) -> Json {
    match reference {
        Some(nested @ (Json::Object(_) | Json::Array(_)))
            if literal.is_object() || literal.is_array() =>
        {
            resolve_reference(literal, nested, store, current)
        }
        Some(Json::String(name)) => {
            lookup(store, name).unwrap_or_else(|| substitute_sentinel(literal, current))
        }
        _ => substitute_sentinel(literal, current),
    }
}

fn lookup(store: &VariableStore, name: &str) -> Option<Json> {
    path::get(store, name).ok().map(Json::from)
}

fn substitute_sentinel(literal: &Json, current: Option<&Value>) -> Json {
    match (literal.as_str(), current) {
        (Some(VALUE_SENTINEL), Some(value)) => value.to_json(),
        _ => literal.clone(),
    }
}
