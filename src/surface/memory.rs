//! Arena-backed in-memory render surface.

use super::{Display, NodeId, RenderSurface};
use crate::core::error::{Result, WeftError};
use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Serialized form of a node in a page bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct NodeSpec {
    /// Render-target identifier (unique within an instance)
    #[serde(default)]
    pub id: Option<String>,

    /// External object id for conditional re-parenting
    #[serde(default)]
    pub ext_id: Option<String>,

    /// Media nodes keep their content in the `src` attribute
    #[serde(default)]
    pub media: bool,

    #[serde(default)]
    pub content: String,

    #[serde(default)]
    pub display: Display,

    #[serde(default)]
    pub styles: IndexMap<String, String>,

    #[serde(default)]
    pub attributes: IndexMap<String, String>,

    #[serde(default)]
    pub children: Vec<NodeSpec>,
}

impl NodeSpec {
    pub fn new(id: &str) -> Self {
        Self {
            id: Some(id.to_string()),
            ..Self::default()
        }
    }

    pub fn hidden(mut self) -> Self {
        self.display = Display::None;
        self
    }

    pub fn with_content(mut self, content: &str) -> Self {
        self.content = content.to_string();
        self
    }

    pub fn with_style(mut self, property: &str, value: &str) -> Self {
        self.styles.insert(property.to_string(), value.to_string());
        self
    }

    pub fn with_attribute(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_ext_id(mut self, ext_id: &str) -> Self {
        self.ext_id = Some(ext_id.to_string());
        self
    }

    pub fn with_child(mut self, child: NodeSpec) -> Self {
        self.children.push(child);
        self
    }
}

const MEDIA_SOURCE: &str = "src";

/// A style property value and its priority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StyleValue {
    pub value: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub important: bool,
}

#[derive(Debug, Clone)]
struct Node {
    target: Option<String>,
    instance: String,
    ext_id: Option<String>,
    media: bool,
    content: String,
    display: Display,
    styles: IndexMap<String, StyleValue>,
    attributes: IndexMap<String, String>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    live: bool,
}

impl Node {
    /// Content slot: the `src` attribute for media nodes, the text otherwise.
    fn text(&self) -> &str {
        if self.media {
            self.attributes.get(MEDIA_SOURCE).map_or("", String::as_str)
        } else {
            &self.content
        }
    }

    fn text_mut(&mut self) -> &mut String {
        if self.media {
            self.attributes.entry(MEDIA_SOURCE.to_string()).or_default()
        } else {
            &mut self.content
        }
    }

    fn root() -> Self {
        Self {
            target: None,
            instance: String::new(),
            ext_id: None,
            media: false,
            content: String::new(),
            display: Display::Block,
            styles: IndexMap::new(),
            attributes: IndexMap::new(),
            parent: None,
            children: Vec::new(),
            live: true,
        }
    }
}

/// Observable state of a node, in document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeSnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    pub instance: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext_id: Option<String>,
    pub display: Display,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub content: String,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub styles: IndexMap<String, StyleValue>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub attributes: IndexMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeSnapshot>,
}

/// In-memory node tree. Node 0 is the document root.
///
/// Removed nodes go on a free list and their slots are reused, so repeated
/// list regeneration keeps the arena bounded. A `NodeId` of a removed node
/// may later name a different node.
#[derive(Debug, Clone)]
pub struct MemorySurface {
    nodes: Vec<Node>,
    free: Vec<NodeId>,
}

impl Default for MemorySurface {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySurface {
    pub const ROOT: NodeId = NodeId(0);

    pub fn new() -> Self {
        Self {
            nodes: vec![Node::root()],
            free: Vec::new(),
        }
    }

    /// Append the trees in `specs` under the root for `instance`.
    pub fn mount(&mut self, instance: &str, specs: &[NodeSpec]) -> Vec<NodeId> {
        specs
            .iter()
            .map(|spec| self.build(instance, spec, Self::ROOT))
            .collect()
    }

    /// Number of arena slots, live or free.
    pub fn capacity(&self) -> usize {
        self.nodes.len()
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        match self.free.pop() {
            Some(id) => {
                self.nodes[id.0] = node;
                id
            }
            None => {
                self.nodes.push(node);
                NodeId(self.nodes.len() - 1)
            }
        }
    }

    fn build(&mut self, instance: &str, spec: &NodeSpec, parent: NodeId) -> NodeId {
        let mut attributes = spec.attributes.clone();
        let mut content = spec.content.clone();
        if spec.media && !content.is_empty() {
            attributes.insert(MEDIA_SOURCE.to_string(), std::mem::take(&mut content));
        }
        let id = self.alloc(Node {
            target: spec.id.clone(),
            instance: instance.to_string(),
            ext_id: spec.ext_id.clone(),
            media: spec.media,
            content,
            display: spec.display,
            styles: spec
                .styles
                .iter()
                .map(|(k, v)| {
                    let style = StyleValue {
                        value: v.clone(),
                        important: false,
                    };
                    (k.clone(), style)
                })
                .collect(),
            attributes,
            parent: Some(parent),
            children: Vec::new(),
            live: true,
        });
        self.nodes[parent.0].children.push(id);
        for child in &spec.children {
            self.build(instance, child, id);
        }
        id
    }

    fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0).filter(|n| n.live)
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0).filter(|n| n.live)
    }

    /// Render targets of every live node in `instance`, in document order.
    pub fn live_targets(&self, instance: &str) -> Vec<String> {
        let mut out = Vec::new();
        self.walk(Self::ROOT, &mut |node: &Node| {
            if node.instance == instance {
                if let Some(target) = &node.target {
                    out.push(target.clone());
                }
            }
        });
        out
    }

    /// Live nodes in document order, root excluded.
    fn live_ids(&self) -> impl Iterator<Item = (NodeId, &Node)> + '_ {
        let mut stack: Vec<NodeId> = self.nodes[Self::ROOT.0]
            .children
            .iter()
            .rev()
            .copied()
            .collect();
        std::iter::from_fn(move || {
            while let Some(id) = stack.pop() {
                if let Some(node) = self.node(id) {
                    stack.extend(node.children.iter().rev().copied());
                    return Some((id, node));
                }
            }
            None
        })
    }

    fn walk(&self, id: NodeId, visit: &mut dyn FnMut(&Node)) {
        let Some(node) = self.node(id) else { return };
        if id != Self::ROOT {
            visit(node);
        }
        for child in &node.children {
            self.walk(*child, visit);
        }
    }

    /// Observable tree below the root.
    pub fn snapshot(&self) -> Vec<NodeSnapshot> {
        self.nodes[Self::ROOT.0]
            .children
            .iter()
            .filter_map(|c| self.snapshot_node(*c))
            .collect()
    }

    fn snapshot_node(&self, id: NodeId) -> Option<NodeSnapshot> {
        let node = self.node(id)?;
        Some(NodeSnapshot {
            target: node.target.clone(),
            instance: node.instance.clone(),
            ext_id: node.ext_id.clone(),
            display: node.display,
            content: node.content.clone(),
            styles: node.styles.clone(),
            attributes: node.attributes.clone(),
            children: node
                .children
                .iter()
                .filter_map(|c| self.snapshot_node(*c))
                .collect(),
        })
    }

    fn copy_subtree(&mut self, source: NodeId, parent: NodeId) -> NodeId {
        let mut copy = self.nodes[source.0].clone();
        let children = std::mem::take(&mut copy.children);
        copy.parent = Some(parent);
        let id = self.alloc(copy);
        for child in children {
            if self.node(child).is_some() {
                let c = self.copy_subtree(child, id);
                self.nodes[id.0].children.push(c);
            }
        }
        id
    }

    fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.0].parent {
            self.nodes[parent.0].children.retain(|c| *c != id);
        }
        self.nodes[id.0].parent = None;
    }

    fn kill(&mut self, id: NodeId) {
        let dead = Node {
            live: false,
            ..Node::root()
        };
        let node = std::mem::replace(&mut self.nodes[id.0], dead);
        self.free.push(id);
        for child in node.children {
            self.kill(child);
        }
    }

    /// Whether `node` is `ancestor` or lies below it.
    fn is_within(&self, node: NodeId, ancestor: NodeId) -> bool {
        let mut cursor = Some(node);
        while let Some(id) = cursor {
            if id == ancestor {
                return true;
            }
            cursor = self.node(id).and_then(|n| n.parent);
        }
        false
    }

    fn replace_first(&mut self, id: NodeId, placeholder: &str, text: &str) -> bool {
        let Some(node) = self.node_mut(id) else {
            return false;
        };
        if node.text().contains(placeholder) {
            let slot = node.text_mut();
            *slot = slot.replacen(placeholder, text, 1);
            return true;
        }
        let children = node.children.clone();
        children
            .into_iter()
            .any(|child| self.replace_first(child, placeholder, text))
    }
}

impl RenderSurface for MemorySurface {
    fn find(&self, target: &str, instance: &str) -> Option<NodeId> {
        self.live_ids()
            .find(|(_, n)| n.instance == instance && n.target.as_deref() == Some(target))
            .map(|(id, _)| id)
    }

    fn target(&self, node: NodeId) -> Option<&str> {
        self.node(node)?.target.as_deref()
    }

    fn style(&self, node: NodeId, property: &str) -> Option<&str> {
        self.node(node)?
            .styles
            .get(property)
            .map(|s| s.value.as_str())
    }

    fn set_style(&mut self, node: NodeId, property: &str, value: Option<&str>, important: bool) {
        let Some(n) = self.node_mut(node) else { return };
        match value {
            Some(v) if !v.is_empty() => {
                let style = StyleValue {
                    value: v.to_string(),
                    important,
                };
                n.styles.insert(property.to_string(), style);
            }
            _ => {
                n.styles.shift_remove(property);
            }
        }
    }

    fn content(&self, node: NodeId) -> Option<&str> {
        self.node(node).map(Node::text)
    }

    fn set_content(&mut self, node: NodeId, value: &str) {
        if let Some(n) = self.node_mut(node) {
            *n.text_mut() = value.to_string();
        }
    }

    fn display(&self, node: NodeId) -> Display {
        self.node(node).map(|n| n.display).unwrap_or(Display::None)
    }

    fn set_display(&mut self, node: NodeId, display: Display) {
        if let Some(n) = self.node_mut(node) {
            n.display = display;
        }
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        self.node(node)?.attributes.get(name).map(String::as_str)
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.node(node)?.parent
    }

    fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.node(node)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    fn clone_subtree(&mut self, node: NodeId, target: &str) -> Result<NodeId> {
        let source = self.node(node).ok_or_else(|| WeftError::MissingNode {
            target: target.to_string(),
            instance: String::new(),
        })?;
        let parent = source.parent.ok_or_else(|| WeftError::MissingNode {
            target: source.target.clone().unwrap_or_default(),
            instance: source.instance.clone(),
        })?;
        let copy = self.copy_subtree(node, parent);
        self.nodes[copy.0].target = Some(target.to_string());
        self.nodes[parent.0].children.push(copy);
        Ok(copy)
    }

    fn substitute_placeholder(&mut self, node: NodeId, placeholder: &str, text: &str) {
        self.replace_first(node, placeholder, text);
    }

    fn remove(&mut self, node: NodeId) {
        if node == Self::ROOT || self.node(node).is_none() {
            return;
        }
        self.detach(node);
        self.kill(node);
    }

    fn move_to(&mut self, node: NodeId, parent: NodeId) {
        if self.node(node).is_none() || self.node(parent).is_none() {
            return;
        }
        if self.is_within(parent, node) {
            tracing::warn!(node = node.0, parent = parent.0, "refusing to move a node inside itself");
            return;
        }
        self.detach(node);
        self.nodes[node.0].parent = Some(parent);
        self.nodes[parent.0].children.push(node);
    }

    fn tagged(&self, ext_id: &str, instance: &str) -> Vec<NodeId> {
        self.live_ids()
            .filter(|(_, n)| n.instance == instance && n.ext_id.as_deref() == Some(ext_id))
            .map(|(id, _)| id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MemorySurface {
        let mut s = MemorySurface::new();
        s.mount(
            "main",
            &[NodeSpec::new("list")
                .with_child(NodeSpec::new("item:dummy").hidden().with_child(
                    NodeSpec {
                        content: "label $loop$".to_string(),
                        ..NodeSpec::default()
                    },
                ))
                .with_child(NodeSpec::new("footer").with_ext_id("ad"))],
        );
        s
    }

    #[test]
    fn test_mount_and_find() {
        let s = sample();
        assert!(s.find("list", "main").is_some());
        assert!(s.find("list", "other").is_none());
        assert_eq!(s.live_targets("main"), vec!["list", "item:dummy", "footer"]);
    }

    #[test]
    fn test_instances_are_isolated() {
        let mut s = sample();
        s.mount("second", &[NodeSpec::new("list")]);
        let a = s.find("list", "main").unwrap();
        let b = s.find("list", "second").unwrap();
        assert_ne!(a, b);
        s.set_content(b, "changed");
        assert_eq!(s.content(a), Some(""));
    }

    #[test]
    fn test_style_set_and_clear() {
        let mut s = sample();
        let n = s.find("footer", "main").unwrap();
        s.set_style(n, "color", Some("red"), true);
        assert_eq!(s.style(n, "color"), Some("red"));
        s.set_style(n, "color", Some(""), false);
        assert_eq!(s.style(n, "color"), None);
        s.set_style(n, "color", Some("blue"), false);
        s.set_style(n, "color", None, false);
        assert_eq!(s.style(n, "color"), None);
    }

    #[test]
    fn test_clone_subtree_appends_under_parent() {
        let mut s = sample();
        let template = s.find("item:dummy", "main").unwrap();
        let copy = s.clone_subtree(template, "item,0:new").unwrap();
        let list = s.find("list", "main").unwrap();
        assert_eq!(s.parent(copy), Some(list));
        assert_eq!(s.children(list).last(), Some(&copy));
        assert_eq!(s.target(copy), Some("item,0:new"));
        assert_eq!(s.children(copy).len(), 1);
        assert_eq!(s.find("item:dummy", "main"), Some(template));
    }

    #[test]
    fn test_substitute_placeholder_first_only() {
        let mut s = sample();
        let template = s.find("item:dummy", "main").unwrap();
        let copy = s.clone_subtree(template, "item,0:new").unwrap();
        s.substitute_placeholder(copy, "$loop$", "apple");
        let label = s.children(copy)[0];
        assert_eq!(s.content(label), Some("label apple"));
        let original_label = s.children(template)[0];
        assert_eq!(s.content(original_label), Some("label $loop$"));
    }

    #[test]
    fn test_remove_kills_subtree() {
        let mut s = sample();
        let list = s.find("list", "main").unwrap();
        s.remove(list);
        assert!(s.find("item:dummy", "main").is_none());
        assert!(s.live_targets("main").is_empty());
        assert!(s.snapshot().is_empty());
    }

    #[test]
    fn test_move_and_tagged() {
        let mut s = sample();
        s.mount("main", &[NodeSpec::new("sidebar")]);
        let sidebar = s.find("sidebar", "main").unwrap();
        let tagged = s.tagged("ad", "main");
        assert_eq!(tagged.len(), 1);
        s.move_to(tagged[0], sidebar);
        assert_eq!(s.parent(tagged[0]), Some(sidebar));
        let list = s.find("list", "main").unwrap();
        assert_eq!(s.children(list).len(), 1);
    }

    #[test]
    fn test_move_into_own_subtree_is_refused() {
        let mut s = MemorySurface::new();
        s.mount(
            "main",
            &[NodeSpec::new("ad")
                .with_ext_id("ad")
                .with_child(NodeSpec::new("slot"))],
        );
        let ad = s.find("ad", "main").unwrap();
        let slot = s.find("slot", "main").unwrap();
        s.move_to(ad, slot);
        s.move_to(ad, ad);
        assert_eq!(s.parent(ad), Some(MemorySurface::ROOT));
        assert_eq!(s.parent(slot), Some(ad));
        assert_eq!(s.live_targets("main"), vec!["ad", "slot"]);
    }

    #[test]
    fn test_removed_slots_are_reused() {
        let mut s = sample();
        let template = s.find("item:dummy", "main").unwrap();
        let mut items = Vec::new();
        for round in 0..1000 {
            for item in items.drain(..) {
                s.remove(item);
            }
            for i in 0..3 {
                let target = format!("item,{}:new", i);
                items.push(s.clone_subtree(template, &target).unwrap());
            }
            assert_eq!(s.live_targets("main").len(), 6, "round {}", round);
        }
        // Root and four mounted nodes, then three live two-node clones.
        assert!(s.capacity() <= 5 + 6, "arena grew to {}", s.capacity());
    }

    #[test]
    fn test_media_content_is_source() {
        let mut s = MemorySurface::new();
        s.mount(
            "main",
            &[NodeSpec {
                media: true,
                ..NodeSpec::new("logo").with_content("$loop$.png")
            }],
        );
        let logo = s.find("logo", "main").unwrap();
        assert_eq!(s.attribute(logo, "src"), Some("$loop$.png"));
        s.substitute_placeholder(logo, "$loop$", "brand");
        assert_eq!(s.content(logo), Some("brand.png"));

        s.set_content(logo, "other.png");
        assert_eq!(s.attribute(logo, "src"), Some("other.png"));
        assert_eq!(s.snapshot()[0].content, "");
    }

    #[test]
    fn test_display_of_removed_node_is_none() {
        let mut s = sample();
        let footer = s.find("footer", "main").unwrap();
        s.remove(footer);
        assert_eq!(s.display(footer), Display::None);
        assert!(!s.is_visible(footer));
    }

    #[test]
    fn test_node_spec_yaml() {
        let yaml = r#"
id: card
display: flex
styles:
  flex-direction: column
attributes:
  spacing: "margin-top: 8px"
children:
  - id: title
    content: Hello
"#;
        let spec: NodeSpec = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(spec.display, Display::Flex);
        assert_eq!(spec.children[0].content, "Hello");
    }
}
