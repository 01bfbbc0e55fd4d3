//! Convenience actions and action descriptors.
//!
//! Each action computes a new value from the current one and delegates to
//! [`Runtime::apply`]. Action descriptors are the compiled event payloads
//! (`{action, target, parameters}`); their parameters are materialized
//! through the reference resolver before dispatch.

use super::engine::CascadeReport;
use super::error::{Result, WeftError};
use super::resolver::resolve_reference;
use super::runtime::Runtime;
use super::types::{json_text, Value};
use crate::surface::RenderSurface;
use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use tracing::{debug, warn};

/// Bounds for increment/decrement. Overflow past `max` wraps to `min`
/// (0 when unset); underflow past an explicit `min` wraps to `max`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Clamp {
    pub min: Option<i64>,
    pub max: Option<i64>,
}

impl Clamp {
    /// One bound is the maximum, two are `[min, max]`. Anything else is unbounded.
    pub fn from_bounds(bounds: &[i64]) -> Self {
        match bounds {
            [max] => Self {
                min: None,
                max: Some(*max),
            },
            [min, max] => Self {
                min: Some(*min),
                max: Some(*max),
            },
            _ => Self::default(),
        }
    }
}

/// Add `by` to `value` and wrap at the clamp bounds.
pub fn clamp_wrap(value: i64, by: i64, clamp: Clamp) -> i64 {
    let mut next = value.saturating_add(by);
    if let Some(max) = clamp.max {
        if next > max {
            next = clamp.min.unwrap_or(0);
        }
        if clamp.min.is_some_and(|min| next < min) {
            next = max;
        }
    }
    next
}

/// Where `insert` puts the new element.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InsertAt {
    Start,
    #[default]
    End,
}

impl InsertAt {
    pub fn parse(s: &str) -> Self {
        match s {
            "start" => Self::Start,
            _ => Self::End,
        }
    }
}

/// Coercion applied by `set-value` before the write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Integer,
    Decimal,
    Boolean,
}

impl ValueKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "integer" => Some(Self::Integer),
            "decimal" => Some(Self::Decimal),
            "boolean" => Some(Self::Boolean),
            _ => None,
        }
    }

    fn coerce(self, name: &str, text: &str) -> Result<Value> {
        let malformed = |reason: String| WeftError::Malformed {
            name: name.to_string(),
            reason,
        };
        let text = text.trim();
        match self {
            Self::Integer => text
                .parse::<i64>()
                .map(|n| Value::scalar(n.to_string()))
                .map_err(|e| malformed(format!("not an integer: {}", e))),
            Self::Decimal => text
                .parse::<f64>()
                .map(|n| Value::scalar(n.to_string()))
                .map_err(|e| malformed(format!("not a decimal: {}", e))),
            Self::Boolean => Ok(Value::scalar((text == "true").to_string())),
        }
    }
}

// ============================================================================
// Action descriptors
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum ActionKind {
    Toggle,
    Increment,
    Decrement,
    SetValue,
    Insert,
    Clear,
    MessageHost,
    StopPropagation,
    PreventDefault,
}

/// A literal template plus the parallel reference template naming overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ActionParameter {
    #[serde(default)]
    pub value: Json,

    #[serde(default)]
    pub reference: Json,
}

/// One compiled event action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Action {
    pub action: ActionKind,

    #[serde(default)]
    pub target: String,

    #[serde(default)]
    pub parameters: IndexMap<String, Vec<ActionParameter>>,
}

/// Effects a dispatched action hands back to the host.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Applied(CascadeReport),
    /// Nothing to do (blank insert, non-list target)
    Ignored,
    StopPropagation,
    PreventDefault,
    /// Call the host function `function` with resolved `data`
    Message { function: String, data: Json },
}

impl<S: RenderSurface> Runtime<S> {
    /// Flip a boolean variable. Anything but `"true"` counts as false.
    pub fn toggle(&mut self, instance: &str, variable: &str) -> Result<CascadeReport> {
        let current = self.get_value(instance, variable)?;
        self.set_bool(instance, variable, current.as_text() != "true")
    }

    pub fn set_bool(&mut self, instance: &str, variable: &str, value: bool) -> Result<CascadeReport> {
        self.apply(instance, variable, Value::scalar(value.to_string()))
    }

    pub fn set_string(&mut self, instance: &str, variable: &str, value: &str) -> Result<CascadeReport> {
        self.apply(instance, variable, Value::scalar(value))
    }

    /// Apply several `(variable, value)` pairs in order. Unknown variables
    /// are logged and skipped.
    pub fn set_multi(&mut self, instance: &str, pairs: &[(String, Value)]) -> Vec<CascadeReport> {
        pairs
            .iter()
            .filter_map(|(variable, value)| self.apply(instance, variable, value.clone()).ok())
            .collect()
    }

    pub fn increment(
        &mut self,
        instance: &str,
        variable: &str,
        by: i64,
        clamp: Clamp,
    ) -> Result<CascadeReport> {
        let current = self.get_value(instance, variable)?;
        let value = current.as_text().trim().parse::<i64>().map_err(|e| {
            warn!(variable = %variable, value = %current, "increment of non-integer");
            WeftError::Malformed {
                name: variable.to_string(),
                reason: format!("not an integer: {}", e),
            }
        })?;
        let next = clamp_wrap(value, by, clamp);
        self.apply(instance, variable, Value::scalar(next.to_string()))
    }

    pub fn decrement(
        &mut self,
        instance: &str,
        variable: &str,
        by: i64,
        clamp: Clamp,
    ) -> Result<CascadeReport> {
        self.increment(instance, variable, by.saturating_neg(), clamp)
    }

    /// Insert `item` into a list variable. Blank items and non-list targets
    /// are ignored.
    pub fn insert(
        &mut self,
        instance: &str,
        variable: &str,
        item: Json,
        at: InsertAt,
    ) -> Result<Option<CascadeReport>> {
        let current = self.get_value(instance, variable)?;
        let Value::Structured(Json::Array(mut items)) = current else {
            debug!(variable = %variable, "insert into non-list, ignoring");
            return Ok(None);
        };
        if json_text(&item).trim().is_empty() {
            debug!(variable = %variable, "nothing to insert");
            return Ok(None);
        }
        match at {
            InsertAt::Start => items.insert(0, item),
            InsertAt::End => items.push(item),
        }
        self.apply(instance, variable, Value::Structured(Json::Array(items)))
            .map(Some)
    }

    /// Empty a variable: `[]` for structures, `""` for scalars.
    pub fn clear(&mut self, instance: &str, variable: &str) -> Result<CascadeReport> {
        let cleared = if self.get_value(instance, variable)?.is_structured() {
            Value::empty_list()
        } else {
            Value::scalar("")
        };
        self.apply(instance, variable, cleared)
    }

    /// Write a resolved value, optionally coerced.
    pub fn set_value(
        &mut self,
        instance: &str,
        variable: &str,
        value: Json,
        kind: Option<ValueKind>,
    ) -> Result<CascadeReport> {
        let value = match kind {
            Some(kind) => kind.coerce(variable, &json_text(&value))?,
            None => Value::from(value),
        };
        self.apply(instance, variable, value)
    }

    /// Resolve the `index`-th entry of parameter `name`.
    fn parameter(
        &self,
        instance: &str,
        action: &Action,
        name: &str,
        index: usize,
        current: Option<&Value>,
    ) -> Result<Option<Json>> {
        let store = &self.instance_or_err(instance)?.store;
        Ok(action
            .parameters
            .get(name)
            .and_then(|list| list.get(index))
            .map(|p| resolve_reference(&p.value, &p.reference, store, current)))
    }

    fn int_parameter(
        &self,
        instance: &str,
        action: &Action,
        name: &str,
        index: usize,
        current: Option<&Value>,
    ) -> Result<Option<i64>> {
        let Some(json) = self.parameter(instance, action, name, index, current)? else {
            return Ok(None);
        };
        json_text(&json)
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|e| WeftError::Malformed {
                name: format!("{}.{}", action.target, name),
                reason: e.to_string(),
            })
    }

    fn clamp_parameter(
        &self,
        instance: &str,
        action: &Action,
        current: Option<&Value>,
    ) -> Result<Clamp> {
        let count = action.parameters.get("clamp").map_or(0, Vec::len);
        let mut bounds = Vec::with_capacity(count);
        for i in 0..count {
            if let Some(bound) = self.int_parameter(instance, action, "clamp", i, current)? {
                bounds.push(bound);
            }
        }
        Ok(Clamp::from_bounds(&bounds))
    }

    /// Run one action descriptor against `instance`.
    ///
    /// `current` is the value of the object the event fired on, substituted
    /// for `$VALUE` in parameter templates.
    pub fn dispatch(
        &mut self,
        instance: &str,
        action: &Action,
        current: Option<&Value>,
    ) -> Result<Outcome> {
        debug!(instance = %instance, action = ?action.action, target = %action.target, "dispatch");
        let target = action.target.as_str();
        let outcome = match action.action {
            ActionKind::StopPropagation => Outcome::StopPropagation,
            ActionKind::PreventDefault => Outcome::PreventDefault,
            ActionKind::Toggle => Outcome::Applied(self.toggle(instance, target)?),
            ActionKind::Increment | ActionKind::Decrement => {
                let by = self
                    .int_parameter(instance, action, "by", 0, current)?
                    .unwrap_or(1);
                let clamp = self.clamp_parameter(instance, action, current)?;
                let report = if action.action == ActionKind::Increment {
                    self.increment(instance, target, by, clamp)?
                } else {
                    self.decrement(instance, target, by, clamp)?
                };
                Outcome::Applied(report)
            }
            ActionKind::SetValue => {
                let value = self
                    .parameter(instance, action, "value", 0, current)?
                    .unwrap_or(Json::Null);
                let kind = self
                    .parameter(instance, action, "value", 1, current)?
                    .and_then(|k| ValueKind::parse(&json_text(&k)));
                Outcome::Applied(self.set_value(instance, target, value, kind)?)
            }
            ActionKind::Insert => {
                let item = self
                    .parameter(instance, action, "value", 0, current)?
                    .unwrap_or(Json::Null);
                let at = self
                    .parameter(instance, action, "at", 0, current)?
                    .map(|at| InsertAt::parse(&json_text(&at)))
                    .unwrap_or_default();
                match self.insert(instance, target, item, at)? {
                    Some(report) => Outcome::Applied(report),
                    None => Outcome::Ignored,
                }
            }
            ActionKind::Clear => Outcome::Applied(self.clear(instance, target)?),
            ActionKind::MessageHost => {
                match self.parameter(instance, action, "data", 0, current)? {
                    Some(data) => {
                        let function = data
                            .get("function")
                            .map(json_text)
                            .unwrap_or_default()
                            .trim()
                            .replace('-', "_");
                        Outcome::Message { function, data }
                    }
                    None => Outcome::Message {
                        function: target.trim().replace('-', "_"),
                        data: Json::Null,
                    },
                }
            }
        };
        Ok(outcome)
    }

    /// Run a list of actions in order, stopping at the first error.
    pub fn dispatch_all(
        &mut self,
        instance: &str,
        actions: &[Action],
        current: Option<&Value>,
    ) -> Result<Vec<Outcome>> {
        actions
            .iter()
            .map(|action| self.dispatch(instance, action, current))
            .collect()
    }
}
