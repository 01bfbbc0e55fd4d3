//! List regeneration: instantiate a `:dummy` template once per element.
//!
//! Item targets are named `{base},{index}:new`. Arrays contribute their
//! positions, objects their keys, and a scalar is treated as a one-element
//! list at index 0.

use super::error::{Result, WeftError};
use super::types::{json_text, Value, DUMMY_SUFFIX, LOOP_PLACEHOLDER, NEW_SUFFIX};
use crate::surface::{layout_display, NodeId, RenderSurface};
use serde_json::Value as Json;

/// Base of a template target: `item:dummy` -> `item`.
pub fn template_base(target: &str) -> Option<&str> {
    target.strip_suffix(DUMMY_SUFFIX)
}

/// Render target of the item at `index`.
pub fn item_target(base: &str, index: &str) -> String {
    format!("{},{}{}", base, index, NEW_SUFFIX)
}

/// Whether `target` was created from the template with base `base`.
pub fn is_item_of(target: &str, base: &str) -> bool {
    target.ends_with(NEW_SUFFIX)
        && target
            .strip_prefix(base)
            .is_some_and(|rest| rest.starts_with(','))
}

/// Clone `template` once per element of `value`.
///
/// Each clone gets its placeholder replaced by the element text and is
/// shown with the template's layout. Returns the new targets in order.
pub fn instantiate<S: RenderSurface + ?Sized>(
    surface: &mut S,
    template_target: &str,
    template: NodeId,
    value: &Value,
) -> Result<Vec<String>> {
    let base = template_base(template_target)
        .ok_or_else(|| WeftError::NotTemplate(template_target.to_string()))?;

    let elements: Vec<(String, String)> = match value {
        Value::Structured(Json::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(i, item)| (i.to_string(), json_text(item)))
            .collect(),
        Value::Structured(Json::Object(fields)) => fields
            .iter()
            .map(|(key, item)| (key.clone(), json_text(item)))
            .collect(),
        other => vec![("0".to_string(), other.as_text().into_owned())],
    };

    let display = layout_display(&*surface, template);
    let mut created = Vec::with_capacity(elements.len());
    for (index, text) in elements {
        let target = item_target(base, &index);
        let node = surface.clone_subtree(template, &target)?;
        surface.substitute_placeholder(node, LOOP_PLACEHOLDER, &text);
        surface.set_display(node, display);
        created.push(target);
    }
    Ok(created)
}
