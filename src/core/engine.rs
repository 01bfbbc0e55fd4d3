//! Dependency propagation engine.
//!
//! `apply` writes a value into an instance's store, then walks the base
//! variable's descriptor table and pushes the change onto the render surface
//! (content, visibility, styles) or into other variables (recursive applies).
//!
//! Every anomaly inside a cascade degrades to a logged skip. Recursion is
//! bounded by a call-scoped stack of variables being applied: re-entering a
//! variable already on the stack, or nesting deeper than
//! `max_cascade_depth`, is refused and reported.

use super::list;
use super::path;
use super::placement;
use super::runtime::Instance;
use super::style;
use super::types::{
    json_text, DependencyDescriptor, DependencyType, ParamValue, PlacementTable, StyleLink, Value,
    VariableStore, DEPENDENTS_PARAM, KIND_KEY, KIND_TARGET, NEW_SUFFIX, STYLE_FORWARD_TARGET,
};
use crate::surface::{layout_display, Display, NodeId, RenderSurface};
use rustc_hash::FxHashSet;
use tracing::{debug, warn};

/// Border widths fall back to a literal zero instead of being cleared.
const BORDER_WIDTHS: [&str; 4] = [
    "border-left-width",
    "border-right-width",
    "border-top-width",
    "border-bottom-width",
];

/// What one top-level `apply` did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CascadeReport {
    /// Qualified names written, in cascade order
    pub applied: Vec<String>,
    /// Base names refused by the cycle or depth guard
    pub refused: Vec<String>,
}

/// Apply `value` to `target` in `instance` and propagate the change.
pub fn apply<S: RenderSurface + ?Sized>(
    instance: &mut Instance,
    surface: &mut S,
    target: &str,
    value: Value,
) -> CascadeReport {
    let mut cascade = Cascade {
        instance: &instance.id,
        store: &mut instance.store,
        placements: &instance.placements,
        max_depth: instance.options.max_cascade_depth,
        surface,
        stack: Vec::new(),
        report: CascadeReport::default(),
    };
    cascade.apply(target, value);
    cascade.report
}

struct Cascade<'a, S: RenderSurface + ?Sized> {
    instance: &'a str,
    store: &'a mut VariableStore,
    placements: &'a PlacementTable,
    max_depth: usize,
    surface: &'a mut S,
    stack: Vec<String>,
    report: CascadeReport,
}

impl<S: RenderSurface + ?Sized> Cascade<'_, S> {
    fn apply(&mut self, target: &str, value: Value) {
        let base = path::base_name(target);
        if self.stack.contains(&base) {
            warn!(variable = %base, stack = ?self.stack, "dependency cycle, skipping re-entry");
            self.report.refused.push(base);
            return;
        }
        if self.stack.len() >= self.max_depth {
            warn!(variable = %base, depth = self.stack.len(), "cascade depth limit reached");
            self.report.refused.push(base);
            return;
        }

        if let Err(e) = path::set(self.store, target, value) {
            warn!(target = %target, error = %e, "write skipped");
            return;
        }
        self.report.applied.push(target.to_string());

        let new_value = match path::get(self.store, target) {
            Ok(v) => v.resolve_kind(),
            Err(e) => {
                warn!(target = %target, error = %e, "read-back failed");
                return;
            }
        };
        let Some(variable) = self.store.get(&base) else {
            return;
        };
        let raw = variable.value.clone();
        let table = variable.dependencies.clone();
        debug!(target = %target, observers = table.len(), "applying");

        self.stack.push(base.clone());
        let mut fresh = Vec::new();
        for (render_target, descriptors) in &table {
            // List regeneration may have dropped this entry earlier in the pass.
            if !self.is_registered(&base, render_target) {
                continue;
            }
            fresh.extend(self.dispatch(&base, render_target, descriptors, &raw, &new_value));
        }
        // Items created by this pass get their template's descriptors now,
        // not on the next apply.
        for render_target in fresh.iter().filter(|t| !table.contains_key(*t)) {
            let descriptors = self
                .store
                .get(&base)
                .and_then(|v| v.dependencies.get(render_target))
                .cloned()
                .unwrap_or_default();
            self.dispatch(&base, render_target, &descriptors, &raw, &new_value);
        }
        self.stack.pop();

        placement::place(self.instance, self.placements, &mut *self.surface);
    }

    /// Run one render target's descriptors. Returns item targets created by
    /// list regeneration.
    fn dispatch(
        &mut self,
        base: &str,
        render_target: &str,
        descriptors: &[DependencyDescriptor],
        raw: &Value,
        new_value: &Value,
    ) -> Vec<String> {
        let mut created = Vec::new();
        let mut touched = FxHashSet::default();
        for descriptor in descriptors {
            match descriptor.dependency_type {
                DependencyType::Value => {
                    created.extend(self.on_value(base, render_target, raw, new_value))
                }
                DependencyType::Visible => self.on_visible(render_target, descriptor, raw),
                DependencyType::Variable => self.on_variable(render_target, descriptor, raw),
                DependencyType::Style => {
                    self.on_style(render_target, descriptor, raw, new_value, &mut touched)
                }
            }
        }
        created
    }

    fn is_registered(&self, base: &str, render_target: &str) -> bool {
        self.store
            .get(base)
            .is_some_and(|v| v.dependencies.contains_key(render_target))
    }

    fn node(&self, render_target: &str) -> Option<NodeId> {
        let node = self.surface.find(render_target, self.instance);
        if node.is_none() {
            warn!(target = %render_target, instance = %self.instance, "render target not found");
        }
        node
    }

    // ------------------------------------------------------------------------
    // Value
    // ------------------------------------------------------------------------

    fn on_value(
        &mut self,
        base: &str,
        render_target: &str,
        raw: &Value,
        new_value: &Value,
    ) -> Vec<String> {
        if list::template_base(render_target).is_some() {
            return self.regenerate(base, render_target, raw);
        }
        // Item content comes from its template.
        if render_target.ends_with(NEW_SUFFIX) {
            return Vec::new();
        }
        if let Some(node) = self.node(render_target) {
            self.surface.set_content(node, &new_value.as_text());
        }
        Vec::new()
    }

    /// Replace every item node of a list template with fresh clones and
    /// rewire the descriptor table to the new item targets, which are
    /// returned.
    fn regenerate(&mut self, base: &str, template_target: &str, raw: &Value) -> Vec<String> {
        let Some(template) = self.node(template_target) else {
            return Vec::new();
        };
        let Some(item_base) = list::template_base(template_target) else {
            return Vec::new();
        };

        let stale: Vec<String> = self
            .store
            .get(base)
            .map(|v| {
                v.dependencies
                    .keys()
                    .filter(|k| list::is_item_of(k, item_base))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        for target in &stale {
            if let Some(node) = self.surface.find(target, self.instance) {
                self.surface.remove(node);
            }
        }

        let created = match list::instantiate(&mut *self.surface, template_target, template, raw) {
            Ok(created) => created,
            Err(e) => {
                warn!(target = %template_target, error = %e, "list regeneration failed");
                return Vec::new();
            }
        };
        debug!(template = %template_target, removed = stale.len(), created = created.len(), "list regenerated");

        let Some(variable) = self.store.get_mut(base) else {
            return Vec::new();
        };
        variable
            .dependencies
            .retain(|k, _| !list::is_item_of(k, item_base));
        let payload = variable
            .dependencies
            .get(template_target)
            .cloned()
            .unwrap_or_default();
        for target in &created {
            variable.dependencies.insert(target.clone(), payload.clone());
        }
        created
    }

    // ------------------------------------------------------------------------
    // Visible
    // ------------------------------------------------------------------------

    fn on_visible(&mut self, render_target: &str, descriptor: &DependencyDescriptor, raw: &Value) {
        let Some(node) = self.node(render_target) else {
            return;
        };
        let shown = descriptor
            .condition
            .as_ref()
            .is_some_and(|c| c.matches(raw));
        let display = if shown {
            layout_display(&*self.surface, node)
        } else {
            Display::None
        };
        self.surface.set_display(node, display);
        style::restyle_first_child(&mut *self.surface, node);
    }

    // ------------------------------------------------------------------------
    // Variable
    // ------------------------------------------------------------------------

    fn on_variable(&mut self, render_target: &str, descriptor: &DependencyDescriptor, raw: &Value) {
        let stamp_kind = render_target == KIND_TARGET;
        match &descriptor.condition {
            None if render_target == STYLE_FORWARD_TARGET => self.forward_style(descriptor, raw),
            None => debug!(target = %render_target, "unconditional variable descriptor ignored"),
            Some(condition) if condition.matches(raw) => {
                for (name, parameter) in &descriptor.parameters {
                    if !self.store.contains_key(&path::base_name(name)) {
                        continue;
                    }
                    if stamp_kind {
                        self.stamp_kind(name, &parameter.value.value);
                    }
                    self.reassert(name);
                }
            }
            Some(_) => {
                for (name, parameter) in &descriptor.parameters {
                    if !self.store.contains_key(&path::base_name(name)) {
                        continue;
                    }
                    let Some(default) = &parameter.default else {
                        continue;
                    };
                    if stamp_kind {
                        self.stamp_kind(name, &default.value);
                        self.reassert(name);
                    } else {
                        self.apply(name, Value::from_raw(&default.value));
                    }
                }
            }
        }
    }

    /// Point `name`'s tagged union at `variant`.
    fn stamp_kind(&mut self, name: &str, variant: &str) {
        let field = format!("{}.{}", name, KIND_KEY);
        if let Err(e) = path::set(self.store, &field, Value::scalar(variant)) {
            warn!(target = %field, error = %e, "kind stamp skipped");
        }
    }

    /// Re-apply a variable with its own current value.
    fn reassert(&mut self, name: &str) {
        match path::get(self.store, name) {
            Ok(current) => self.apply(name, current),
            Err(e) => warn!(target = %name, error = %e, "re-assert skipped"),
        }
    }

    /// Copy the current value into another variable's style descriptor, then
    /// re-apply that variable.
    fn forward_style(&mut self, descriptor: &DependencyDescriptor, raw: &Value) {
        for (property, parameter) in &descriptor.parameters {
            let link: StyleLink = match serde_json::from_str(&parameter.value.value) {
                Ok(link) => link,
                Err(e) => {
                    warn!(property = %property, error = %e, "malformed style link");
                    continue;
                }
            };
            let Some(variable) = self.store.get_mut(&link.variable) else {
                warn!(variable = %link.variable, "style link names unknown variable");
                continue;
            };
            if let Some(descriptors) = variable.dependencies.get_mut(&link.node) {
                for d in descriptors
                    .iter_mut()
                    .filter(|d| d.dependency_type == DependencyType::Style)
                {
                    if let Some(p) = d.parameters.get_mut(property) {
                        p.value.value = raw.as_text().into_owned();
                    }
                }
            }
            let current = variable.value.clone();
            self.apply(&link.variable, current);
        }
    }

    // ------------------------------------------------------------------------
    // Style
    // ------------------------------------------------------------------------

    fn on_style(
        &mut self,
        render_target: &str,
        descriptor: &DependencyDescriptor,
        raw: &Value,
        new_value: &Value,
        touched: &mut FxHashSet<String>,
    ) {
        if descriptor.condition.is_none() {
            let dependents = dependents(descriptor);
            if !dependents.is_empty() {
                self.share_style(render_target, descriptor, &dependents, raw);
                return;
            }
        }
        let Some(node) = self.node(render_target) else {
            return;
        };

        match &descriptor.condition {
            None => {
                for (property, parameter) in &descriptor.parameters {
                    if property == DEPENDENTS_PARAM {
                        continue;
                    }
                    let important = parameter.value.important;
                    if let Some(fields) = new_value.as_object() {
                        for (field, v) in fields {
                            style::set_style(&mut *self.surface, node, field, Some(json_text(v).as_str()), important);
                            touched.insert(field.clone());
                        }
                    } else {
                        style::set_style(&mut *self.surface, node, property, Some(new_value.as_text().as_ref()), important);
                        touched.insert(property.clone());
                    }
                }
            }
            Some(condition) if condition.matches(raw) => {
                for (property, parameter) in &descriptor.parameters {
                    let value = Value::from_raw(&parameter.value.value).resolve_kind();
                    style::set_style(
                        &mut *self.surface,
                        node,
                        property,
                        Some(value.as_text().as_ref()),
                        parameter.value.important,
                    );
                    touched.insert(property.clone());
                }
            }
            Some(_) => {
                for (property, parameter) in &descriptor.parameters {
                    if touched.contains(property) {
                        continue;
                    }
                    match &parameter.default {
                        None if BORDER_WIDTHS.contains(&property.as_str()) => {
                            self.surface.set_style(node, property, Some("0px"), false);
                        }
                        None => style::set_style(&mut *self.surface, node, property, None, false),
                        Some(default) => {
                            let value = Value::from_raw(&default.value).resolve_kind();
                            style::set_style(
                                &mut *self.surface,
                                node,
                                property,
                                Some(value.as_text().as_ref()),
                                default.important,
                            );
                        }
                    }
                }
            }
        }
    }

    /// Hand the current value to each dependent as its style fallback, then
    /// re-apply the dependent.
    fn share_style(
        &mut self,
        render_target: &str,
        descriptor: &DependencyDescriptor,
        dependents: &[String],
        raw: &Value,
    ) {
        let Some(style_attr) = descriptor
            .parameters
            .keys()
            .find(|k| k.as_str() != DEPENDENTS_PARAM)
        else {
            return;
        };
        for dependent in dependents {
            let Some(variable) = self.store.get_mut(dependent) else {
                warn!(variable = %dependent, "unknown style dependent");
                continue;
            };
            if let Some(descriptors) = variable.dependencies.get_mut(render_target) {
                for d in descriptors
                    .iter_mut()
                    .filter(|d| d.dependency_type == DependencyType::Style)
                {
                    if let Some(p) = d.parameters.get_mut(style_attr) {
                        p.default.get_or_insert_with(ParamValue::default).value =
                            raw.as_text().into_owned();
                    }
                }
            }
            let current = variable.value.clone();
            self.apply(dependent, current);
        }
    }
}

/// Variables listed in a descriptor's `dependents` parameter.
pub fn dependents(descriptor: &DependencyDescriptor) -> Vec<String> {
    let Some(parameter) = descriptor.parameters.get(DEPENDENTS_PARAM) else {
        return Vec::new();
    };
    serde_json::from_str(&parameter.value.value).unwrap_or_else(|e| {
        warn!(error = %e, "malformed dependents list");
        Vec::new()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::PageBundle;
    use crate::surface::digest::digest;
    use crate::surface::memory::MemorySurface;

    fn load(yaml: &str) -> (Instance, MemorySurface) {
        let bundle: PageBundle = serde_yaml_ng::from_str(yaml).unwrap();
        let mut surface = MemorySurface::new();
        surface.mount(&bundle.instance, &bundle.nodes);
        (Instance::from_bundle(&bundle), surface)
    }

    fn node(s: &MemorySurface, target: &str) -> NodeId {
        s.find(target, "main").unwrap()
    }

    #[test]
    fn test_value_updates_content() {
        let (mut inst, mut s) = load(
            r#"
variables:
  title:
    value: "old"
    dependencies:
      heading: [{dependency_type: Value}]
nodes:
  - id: heading
    content: old
"#,
        );
        let report = apply(&mut inst, &mut s, "title", Value::scalar("new"));
        assert_eq!(report.applied, vec!["title"]);
        assert_eq!(s.content(node(&s, "heading")), Some("new"));
        assert_eq!(inst.store["title"].value, Value::scalar("new"));
    }

    #[test]
    fn test_leaf_variable_only_writes() {
        let (mut inst, mut s) = load("variables: {counter: {value: '1'}}");
        let before = digest(&s).unwrap();
        apply(&mut inst, &mut s, "counter", Value::scalar("2"));
        assert_eq!(inst.store["counter"].value, Value::scalar("2"));
        assert_eq!(digest(&s).unwrap(), before);
    }

    #[test]
    fn test_nested_path_applies_resolved_value() {
        let (mut inst, mut s) = load(
            r#"
variables:
  user:
    value: {name: ada}
    dependencies:
      name-label: [{dependency_type: Value}]
nodes:
  - id: name-label
"#,
        );
        apply(&mut inst, &mut s, "user.name", Value::scalar("bob"));
        assert_eq!(s.content(node(&s, "name-label")), Some("bob"));
    }

    #[test]
    fn test_missing_node_does_not_abort_cascade() {
        let (mut inst, mut s) = load(
            r#"
variables:
  title:
    value: ""
    dependencies:
      ghost: [{dependency_type: Value}]
      heading: [{dependency_type: Value}]
nodes:
  - id: heading
"#,
        );
        apply(&mut inst, &mut s, "title", Value::scalar("x"));
        assert_eq!(s.content(node(&s, "heading")), Some("x"));
    }

    const LIST: &str = r#"
variables:
  items:
    value: "[]"
    dependencies:
      "item:dummy": [{dependency_type: Value}]
nodes:
  - id: list
    children:
      - id: "item:dummy"
        display: none
        content: "$loop$"
"#;

    fn items(s: &MemorySurface) -> Vec<String> {
        s.live_targets("main")
            .into_iter()
            .filter(|t| t.ends_with(":new"))
            .collect()
    }

    #[test]
    fn test_list_scenario() {
        let (mut inst, mut s) = load(LIST);
        apply(&mut inst, &mut s, "items", Value::from_raw(r#"["a","b"]"#));

        let first = node(&s, "item,0:new");
        let second = node(&s, "item,1:new");
        assert!(s.is_visible(first) && s.is_visible(second));
        assert_eq!(s.content(first), Some("a"));
        assert_eq!(s.content(second), Some("b"));
        assert!(!s.is_visible(node(&s, "item:dummy")));

        let keys: Vec<&String> = inst.store["items"].dependencies.keys().collect();
        assert_eq!(keys, vec!["item:dummy", "item,0:new", "item,1:new"]);
    }

    #[test]
    fn test_new_items_styled_in_same_pass() {
        let (mut inst, mut s) = load(
            r#"
variables:
  items:
    value: "[]"
    dependencies:
      "item:dummy":
        - dependency_type: Value
        - dependency_type: Style
          condition: "never"
          parameters:
            color: {value: {value: red}, default: {value: gray}}
nodes:
  - id: list
    children:
      - id: "item:dummy"
        display: none
        content: "$loop$"
"#,
        );
        let value = Value::from_raw(r#"["a","b"]"#);
        apply(&mut inst, &mut s, "items", value.clone());
        assert_eq!(s.style(node(&s, "item,0:new"), "color"), Some("gray"));
        assert_eq!(s.style(node(&s, "item,1:new"), "color"), Some("gray"));

        let before = digest(&s).unwrap();
        apply(&mut inst, &mut s, "items", value);
        assert_eq!(digest(&s).unwrap(), before);
    }

    #[test]
    fn test_list_regeneration_replaces() {
        let (mut inst, mut s) = load(LIST);
        apply(&mut inst, &mut s, "items", Value::from_raw(r#"["a","b","c"]"#));
        assert_eq!(items(&s).len(), 3);

        apply(&mut inst, &mut s, "items", Value::from_raw(r#"["z"]"#));
        assert_eq!(items(&s), vec!["item,0:new"]);
        assert_eq!(s.content(node(&s, "item,0:new")), Some("z"));
        assert_eq!(inst.store["items"].dependencies.len(), 2);

        apply(&mut inst, &mut s, "items", Value::empty_list());
        assert!(items(&s).is_empty());
    }

    const TOGGLE: &str = r#"
variables:
  open:
    value: "false"
    dependencies:
      panel: [{dependency_type: Visible, condition: "true"}]
      grid: [{dependency_type: Visible, condition: "true"}]
      always-hidden: [{dependency_type: Visible}]
nodes:
  - id: panel
    display: none
    styles: {flex-direction: column}
  - id: grid
    display: none
    styles: {grid-template-areas: "'a b'"}
  - id: always-hidden
"#;

    #[test]
    fn test_visible_preserves_layout() {
        let (mut inst, mut s) = load(TOGGLE);
        for _ in 0..2 {
            apply(&mut inst, &mut s, "open", Value::scalar("true"));
            assert_eq!(s.display(node(&s, "panel")), Display::Flex);
            assert_eq!(s.display(node(&s, "grid")), Display::Grid);
            apply(&mut inst, &mut s, "open", Value::scalar("false"));
            assert_eq!(s.display(node(&s, "panel")), Display::None);
        }
    }

    #[test]
    fn test_visible_without_condition_hides() {
        let (mut inst, mut s) = load(TOGGLE);
        apply(&mut inst, &mut s, "open", Value::scalar("true"));
        assert!(!s.is_visible(node(&s, "always-hidden")));
    }

    #[test]
    fn test_visible_null_sentinels() {
        let (mut inst, mut s) = load(
            r#"
variables:
  error:
    value: ""
    dependencies:
      banner: [{dependency_type: Visible, condition: "$IsNotNull$"}]
nodes:
  - id: banner
    display: none
"#,
        );
        apply(&mut inst, &mut s, "error", Value::scalar("boom"));
        assert!(s.is_visible(node(&s, "banner")));
        apply(&mut inst, &mut s, "error", Value::scalar("null"));
        assert!(!s.is_visible(node(&s, "banner")));
    }

    #[test]
    fn test_style_true_branch_wins() {
        let (mut inst, mut s) = load(
            r#"
variables:
  mode:
    value: ""
    dependencies:
      box:
        - dependency_type: Style
          condition: "on"
          parameters:
            color: {value: {value: red}}
        - dependency_type: Style
          condition: "dim"
          parameters:
            color: {value: {value: gray}, default: {value: blue}}
nodes:
  - id: box
"#,
        );
        apply(&mut inst, &mut s, "mode", Value::scalar("on"));
        assert_eq!(s.style(node(&s, "box"), "color"), Some("red"));

        apply(&mut inst, &mut s, "mode", Value::scalar("off"));
        assert_eq!(s.style(node(&s, "box"), "color"), Some("blue"));
    }

    #[test]
    fn test_style_direct_and_bulk() {
        let (mut inst, mut s) = load(
            r#"
variables:
  size:
    value: "10px"
    dependencies:
      box:
        - dependency_type: Style
          parameters:
            font-size: {value: {value: "", important: true}}
  pad:
    value: "{}"
    dependencies:
      box:
        - dependency_type: Style
          parameters:
            padding: {}
nodes:
  - id: box
"#,
        );
        apply(&mut inst, &mut s, "size", Value::scalar("12px"));
        let b = node(&s, "box");
        assert_eq!(s.style(b, "font-size"), Some("12px"));
        let snap = serde_json::to_value(s.snapshot()).unwrap();
        assert_eq!(snap[0]["styles"]["font-size"]["important"], true);

        apply(
            &mut inst,
            &mut s,
            "pad",
            Value::from_raw(r#"{"padding-top":"1px","padding-left":"2px"}"#),
        );
        assert_eq!(s.style(b, "padding-top"), Some("1px"));
        assert_eq!(s.style(b, "padding-left"), Some("2px"));
        assert_eq!(s.style(b, "padding"), None);
    }

    #[test]
    fn test_style_border_width_defaults_to_zero() {
        let (mut inst, mut s) = load(
            r#"
variables:
  selected:
    value: "true"
    dependencies:
      card:
        - dependency_type: Style
          condition: "true"
          parameters:
            border-left-width: {value: {value: 2px}}
            color: {value: {value: red}}
nodes:
  - id: card
"#,
        );
        apply(&mut inst, &mut s, "selected", Value::scalar("true"));
        let c = node(&s, "card");
        assert_eq!(s.style(c, "border-left-width"), Some("2px"));
        apply(&mut inst, &mut s, "selected", Value::scalar("false"));
        assert_eq!(s.style(c, "border-left-width"), Some("0px"));
        assert_eq!(s.style(c, "color"), None);
    }

    #[test]
    fn test_variable_true_reasserts_parameter() {
        let (mut inst, mut s) = load(
            r#"
variables:
  ready:
    value: "false"
    dependencies:
      ctx:
        - dependency_type: Variable
          condition: "true"
          parameters:
            title: {}
            ghost: {}
  title:
    value: "hi"
    dependencies:
      heading: [{dependency_type: Value}]
nodes:
  - id: heading
"#,
        );
        let report = apply(&mut inst, &mut s, "ready", Value::scalar("true"));
        assert_eq!(report.applied, vec!["ready", "title"]);
        assert_eq!(s.content(node(&s, "heading")), Some("hi"));
    }

    #[test]
    fn test_variable_false_applies_default() {
        let (mut inst, mut s) = load(
            r#"
variables:
  ready:
    value: "true"
    dependencies:
      ctx:
        - dependency_type: Variable
          condition: "true"
          parameters:
            title: {default: {value: fallback}}
            subtitle: {default: null}
  title:
    value: "hi"
    dependencies:
      heading: [{dependency_type: Value}]
  subtitle:
    value: "keep"
nodes:
  - id: heading
"#,
        );
        apply(&mut inst, &mut s, "ready", Value::scalar("false"));
        assert_eq!(inst.store["title"].value, Value::scalar("fallback"));
        assert_eq!(inst.store["subtitle"].value, Value::scalar("keep"));
        assert_eq!(s.content(node(&s, "heading")), Some("fallback"));
    }

    #[test]
    fn test_variable_kind_stamp() {
        let (mut inst, mut s) = load(
            r##"
variables:
  dark:
    value: "false"
    dependencies:
      "$value#kind$":
        - dependency_type: Variable
          condition: "true"
          parameters:
            accent: {value: {value: dark}, default: {value: light}}
  accent:
    value: {"$kind$": light, light: "#fff", dark: "#000"}
    dependencies:
      box:
        - dependency_type: Style
          parameters:
            color: {}
nodes:
  - id: box
"##,
        );
        apply(&mut inst, &mut s, "dark", Value::scalar("true"));
        assert_eq!(s.style(node(&s, "box"), "color"), Some("#000"));
        apply(&mut inst, &mut s, "dark", Value::scalar("false"));
        assert_eq!(s.style(node(&s, "box"), "color"), Some("#fff"));
    }

    #[test]
    fn test_style_forwarding() {
        let (mut inst, mut s) = load(
            r#"
variables:
  accent:
    value: "black"
    dependencies:
      "$style$":
        - dependency_type: Variable
          parameters:
            color: {value: {value: '{"$node$": "box", "$variable$": "hover"}'}}
  hover:
    value: "true"
    dependencies:
      box:
        - dependency_type: Style
          condition: "true"
          parameters:
            color: {value: {value: black}}
nodes:
  - id: box
"#,
        );
        let report = apply(&mut inst, &mut s, "accent", Value::scalar("green"));
        assert_eq!(report.applied, vec!["accent", "hover"]);
        assert_eq!(s.style(node(&s, "box"), "color"), Some("green"));
        let forwarded = &inst.store["hover"].dependencies["box"][0].parameters["color"];
        assert_eq!(forwarded.value.value, "green");
    }

    #[test]
    fn test_shared_style_dependents() {
        let (mut inst, mut s) = load(
            r#"
variables:
  base-color:
    value: "red"
    dependencies:
      box:
        - dependency_type: Style
          parameters:
            dependents: {value: {value: '["hovered"]'}}
            color: {}
  hovered:
    value: "false"
    dependencies:
      box:
        - dependency_type: Style
          condition: "true"
          parameters:
            color: {value: {value: orange}}
nodes:
  - id: box
"#,
        );
        apply(&mut inst, &mut s, "base-color", Value::scalar("blue"));
        assert_eq!(s.style(node(&s, "box"), "color"), Some("blue"));
        apply(&mut inst, &mut s, "hovered", Value::scalar("true"));
        assert_eq!(s.style(node(&s, "box"), "color"), Some("orange"));
        apply(&mut inst, &mut s, "hovered", Value::scalar("false"));
        assert_eq!(s.style(node(&s, "box"), "color"), Some("blue"));
    }

    const CYCLE: &str = r#"
variables:
  a:
    value: "x"
    dependencies:
      ctx: [{dependency_type: Variable, condition: "x", parameters: {b: {}}}]
  b:
    value: "x"
    dependencies:
      ctx: [{dependency_type: Variable, condition: "x", parameters: {a: {}}}]
"#;

    #[test]
    fn test_cycle_is_refused() {
        let (mut inst, mut s) = load(CYCLE);
        let report = apply(&mut inst, &mut s, "a", Value::scalar("x"));
        assert_eq!(report.applied, vec!["a", "b"]);
        assert_eq!(report.refused, vec!["a"]);
    }

    #[test]
    fn test_depth_limit() {
        let (mut inst, mut s) = load(CYCLE);
        inst.options.max_cascade_depth = 1;
        let report = apply(&mut inst, &mut s, "a", Value::scalar("x"));
        assert_eq!(report.applied, vec!["a"]);
        assert_eq!(report.refused, vec!["b"]);
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        let (mut inst, mut s) = load(
            r#"
variables:
  root:
    value: "go"
    dependencies:
      ctx: [{dependency_type: Variable, condition: "go", parameters: {left: {}, right: {}}}]
  left:
    value: "l"
    dependencies:
      ctx: [{dependency_type: Variable, condition: "l", parameters: {leaf: {}}}]
  right:
    value: "r"
    dependencies:
      ctx: [{dependency_type: Variable, condition: "r", parameters: {leaf: {}}}]
  leaf:
    value: "v"
"#,
        );
        let report = apply(&mut inst, &mut s, "root", Value::scalar("go"));
        assert_eq!(report.applied, vec!["root", "left", "leaf", "right", "leaf"]);
        assert!(report.refused.is_empty());
    }

    #[test]
    fn test_noop_apply_is_idempotent() {
        let (mut inst, mut s) = load(
            r#"
variables:
  mode:
    value: "on"
    dependencies:
      label: [{dependency_type: Value}]
      panel: [{dependency_type: Visible, condition: "on"}]
      box:
        - dependency_type: Style
          condition: "on"
          parameters:
            color: {value: {value: red}, default: {value: blue}}
nodes:
  - id: label
  - id: panel
    styles: {flex-direction: row}
  - id: box
"#,
        );
        apply(&mut inst, &mut s, "mode", Value::scalar("on"));
        let settled = digest(&s).unwrap();
        let current = inst.store["mode"].value.clone();
        apply(&mut inst, &mut s, "mode", current);
        assert_eq!(digest(&s).unwrap(), settled);
    }

    #[test]
    fn test_placement_follows_visibility() {
        let (mut inst, mut s) = load(
            r#"
variables:
  wide:
    value: "false"
    dependencies:
      sidebar: [{dependency_type: Visible, condition: "true"}]
external_children:
  ad:
    - condition: [sidebar]
      set_at: sidebar
    - condition: [body]
      set_at: body
nodes:
  - id: sidebar
    display: none
  - id: body
    children:
      - id: ad-slot
        ext_id: ad
"#,
        );
        let slot = node(&s, "ad-slot");
        apply(&mut inst, &mut s, "wide", Value::scalar("true"));
        assert_eq!(s.parent(slot), Some(node(&s, "sidebar")));
        apply(&mut inst, &mut s, "wide", Value::scalar("false"));
        assert_eq!(s.parent(slot), Some(node(&s, "body")));
    }

    #[test]
    fn test_dependents_parse() {
        let d: DependencyDescriptor = serde_json::from_value(serde_json::json!({
            "dependency_type": "Style",
            "parameters": {"dependents": {"value": {"value": "[\"a\",\"b\"]"}}}
        }))
        .unwrap();
        assert_eq!(dependents(&d), vec!["a", "b"]);

        let broken: DependencyDescriptor = serde_json::from_value(serde_json::json!({
            "dependency_type": "Style",
            "parameters": {"dependents": {"value": {"value": "nope"}}}
        }))
        .unwrap();
        assert!(dependents(&broken).is_empty());
    }
}
