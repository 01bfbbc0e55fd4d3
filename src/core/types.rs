//! Core types: values, variables, dependency descriptors and page bundles.
//!
//! A page bundle is the compiled snapshot a page instance starts from. Every
//! type derives Serialize/Deserialize so bundles load from YAML or JSON, and
//! JsonSchema so `weft schema` can describe the format.

use crate::surface::memory::NodeSpec;
use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use std::borrow::Cow;
use std::fmt;

/// Discriminator field of the tagged-union convention.
pub const KIND_KEY: &str = "$kind$";

/// Literal replaced by the current object's value during reference resolution.
pub const VALUE_SENTINEL: &str = "$VALUE";

/// Suffix marking a render target as a list template.
pub const DUMMY_SUFFIX: &str = ":dummy";

/// Suffix of render targets created from a list template.
pub const NEW_SUFFIX: &str = ":new";

/// Placeholder token replaced by the element value in list clones.
pub const LOOP_PLACEHOLDER: &str = "$loop$";

/// Render target of style-forwarding `Variable` descriptors.
pub const STYLE_FORWARD_TARGET: &str = "$style$";

/// Render target of `Variable` descriptors that stamp a `$kind$` discriminator.
pub const KIND_TARGET: &str = "$value#kind$";

/// Style parameter listing variables that share one style update.
pub const DEPENDENTS_PARAM: &str = "dependents";

// ============================================================================
// Values
// ============================================================================

/// A variable's value, classified once when it is written.
///
/// `Structured` always holds a JSON array or object; everything else,
/// including numbers and booleans, is kept as `Scalar` text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "serde_json::Value", into = "serde_json::Value")]
pub enum Value {
    Scalar(String),
    Structured(serde_json::Value),
}

impl Value {
    /// Classify raw text: JSON arrays and objects become structures.
    pub fn from_raw(raw: &str) -> Self {
        let trimmed = raw.trim_start();
        if trimmed.starts_with('[') || trimmed.starts_with('{') {
            if let Ok(json) = serde_json::from_str::<serde_json::Value>(raw) {
                if json.is_array() || json.is_object() {
                    return Self::Structured(json);
                }
            }
        }
        Self::Scalar(raw.to_string())
    }

    pub fn scalar(text: impl Into<String>) -> Self {
        Self::Scalar(text.into())
    }

    pub fn empty_list() -> Self {
        Self::Structured(serde_json::Value::Array(Vec::new()))
    }

    pub fn is_structured(&self) -> bool {
        matches!(self, Self::Structured(_))
    }

    /// Textual form used for content, style values and condition matching.
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            Self::Scalar(s) => Cow::Borrowed(s.as_str()),
            Self::Structured(json) => Cow::Owned(json.to_string()),
        }
    }

    pub fn as_object(&self) -> Option<&serde_json::Map<String, serde_json::Value>> {
        match self {
            Self::Structured(json) => json.as_object(),
            Self::Scalar(_) => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        self.clone().into()
    }

    /// Unwrap the `$kind$` tagged-union convention: a structure naming one of
    /// its own fields as the active variant reads as that field's value.
    pub fn resolve_kind(&self) -> Value {
        let Some(fields) = self.as_object() else {
            return self.clone();
        };
        fields
            .get(KIND_KEY)
            .and_then(|kind| kind.as_str())
            .and_then(|kind| fields.get(kind))
            .map(|variant| Value::from(variant.clone()))
            .unwrap_or_else(|| self.clone())
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::String(s) => Self::from_raw(&s),
            serde_json::Value::Null => Self::Scalar(String::new()),
            serde_json::Value::Bool(b) => Self::Scalar(b.to_string()),
            serde_json::Value::Number(n) => Self::Scalar(n.to_string()),
            structured => Self::Structured(structured),
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Scalar(s) => serde_json::Value::String(s),
            Value::Structured(json) => json,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_text())
    }
}

/// Text of a JSON element: strings unquoted, everything else as compact JSON.
pub fn json_text(json: &serde_json::Value) -> String {
    match json {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

// ============================================================================
// Conditions
// ============================================================================

/// Value-equality test attached to a descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Condition {
    Equals(String),
    IsNull,
    IsNotNull,
}

impl Condition {
    /// Compare against a raw value with all double quotes stripped.
    pub fn matches(&self, value: &Value) -> bool {
        let text = value.as_text().replace('"', "");
        let null = text.trim().is_empty() || text == "null";
        match self {
            Self::Equals(expected) => text == *expected,
            Self::IsNull => null,
            Self::IsNotNull => !null,
        }
    }
}

impl From<String> for Condition {
    fn from(s: String) -> Self {
        match s.as_str() {
            "$IsNull$" => Self::IsNull,
            "$IsNotNull$" => Self::IsNotNull,
            _ => Self::Equals(s),
        }
    }
}

impl From<Condition> for String {
    fn from(c: Condition) -> Self {
        match c {
            Condition::Equals(s) => s,
            Condition::IsNull => "$IsNull$".to_string(),
            Condition::IsNotNull => "$IsNotNull$".to_string(),
        }
    }
}

// ============================================================================
// Dependency descriptors
// ============================================================================

/// How a render target reacts to the owning variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum DependencyType {
    Value,
    Visible,
    Variable,
    Style,
}

impl fmt::Display for DependencyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value => write!(f, "Value"),
            Self::Visible => write!(f, "Visible"),
            Self::Variable => write!(f, "Variable"),
            Self::Style => write!(f, "Style"),
        }
    }
}

/// Desired value plus the style priority flag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ParamValue {
    #[serde(default)]
    pub value: String,

    #[serde(default)]
    pub important: bool,
}

/// One descriptor parameter: the value applied when the condition holds and
/// the fallback applied when it does not (`None` means no fallback).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Parameter {
    #[serde(default)]
    pub value: ParamValue,

    #[serde(default)]
    pub default: Option<ParamValue>,
}

/// A compiled rule linking one variable to one render target's reaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DependencyDescriptor {
    pub dependency_type: DependencyType,

    #[serde(default)]
    #[schemars(with = "Option<String>")]
    pub condition: Option<Condition>,

    #[serde(default)]
    pub parameters: IndexMap<String, Parameter>,
}

/// Descriptors keyed by render-target identifier.
pub type DependencyTable = IndexMap<String, Vec<DependencyDescriptor>>;

/// Target of a style-forwarding parameter: `{"$node$": .., "$variable$": ..}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleLink {
    #[serde(rename = "$node$")]
    pub node: String,

    #[serde(rename = "$variable$")]
    pub variable: String,
}

// ============================================================================
// Variables
// ============================================================================

/// A named, mutable cell and the render targets observing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Variable {
    #[schemars(with = "serde_json::Value")]
    pub value: Value,

    #[serde(default, deserialize_with = "deserialize_dependencies")]
    #[schemars(with = "DependencyTable")]
    pub dependencies: DependencyTable,
}

impl Variable {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            dependencies: DependencyTable::new(),
        }
    }
}

/// Flat store keyed by `namespace#base` (or `base`).
pub type VariableStore = IndexMap<String, Variable>;

/// Compilers emit each descriptor list either inline or as a JSON-encoded string.
#[derive(Deserialize)]
#[serde(untagged)]
enum EncodedDescriptors {
    Encoded(String),
    Inline(Vec<DependencyDescriptor>),
}

fn deserialize_dependencies<'de, D>(deserializer: D) -> Result<DependencyTable, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = IndexMap::<String, EncodedDescriptors>::deserialize(deserializer)?;
    raw.into_iter()
        .map(|(target, descriptors)| {
            let list = match descriptors {
                EncodedDescriptors::Inline(list) => list,
                EncodedDescriptors::Encoded(json) => serde_json::from_str(&json).map_err(|e| {
                    serde::de::Error::custom(format!("descriptors for '{}': {}", target, e))
                })?,
            };
            Ok((target, list))
        })
        .collect()
}

// ============================================================================
// External placement
// ============================================================================

/// Re-parent an external object under `set_at` when every `condition` target is visible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PlacementRule {
    #[serde(default)]
    pub condition: Vec<String>,

    pub set_at: String,
}

/// Ordered placement rules per external object id.
pub type PlacementTable = IndexMap<String, Vec<PlacementRule>>;

// ============================================================================
// Page bundle
// ============================================================================

/// Runtime limits for one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RuntimeOptions {
    /// Deepest allowed chain of nested applies in one cascade
    #[serde(default = "default_max_cascade_depth")]
    pub max_cascade_depth: usize,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            max_cascade_depth: default_max_cascade_depth(),
        }
    }
}

fn default_max_cascade_depth() -> usize {
    64
}

/// Compiled snapshot of one page instance.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PageBundle {
    /// Instance id scoping variables and node identifiers
    #[serde(default = "default_instance")]
    pub instance: String,

    /// Variable table
    #[serde(default)]
    pub variables: VariableStore,

    /// External-placement rules
    #[serde(default)]
    pub external_children: PlacementTable,

    /// Initial render tree
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,

    /// Runtime limits
    #[serde(default)]
    pub options: RuntimeOptions,
}

fn default_instance() -> String {
    "main".to_string()
}

// ============================================================================
// Tests
// ============================================================================
