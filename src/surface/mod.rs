//! Render surface abstraction: the addressable node tree the engine writes to.
//!
//! The engine never owns rendering. It addresses nodes by
//! `(render target, instance)` and drives them through [`RenderSurface`].
//! [`memory::MemorySurface`] is the in-process implementation used by the CLI,
//! tests and benchmarks.

pub mod digest;
pub mod memory;

use crate::core::error::Result;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Handle to a node on a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// Display mode of a node. Everything except `None` is visible.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum Display {
    None,
    #[default]
    Block,
    Flex,
    Grid,
    #[serde(rename = "-webkit-box")]
    WebkitBox,
}

impl fmt::Display for Display {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Block => write!(f, "block"),
            Self::Flex => write!(f, "flex"),
            Self::Grid => write!(f, "grid"),
            Self::WebkitBox => write!(f, "-webkit-box"),
        }
    }
}

/// Operations the propagation engine requires of its rendering collaborator.
pub trait RenderSurface {
    /// Look up the node rendering `target` in `instance`.
    fn find(&self, target: &str, instance: &str) -> Option<NodeId>;

    /// Render-target identifier of a node, if it has one.
    fn target(&self, node: NodeId) -> Option<&str>;

    fn style(&self, node: NodeId, property: &str) -> Option<&str>;

    /// Set or clear (`None` or empty) a visual property.
    fn set_style(&mut self, node: NodeId, property: &str, value: Option<&str>, important: bool);

    fn content(&self, node: NodeId) -> Option<&str>;

    /// Replace textual content, or the source for media nodes.
    fn set_content(&mut self, node: NodeId, value: &str);

    fn display(&self, node: NodeId) -> Display;

    fn set_display(&mut self, node: NodeId, display: Display);

    fn is_visible(&self, node: NodeId) -> bool {
        self.display(node) != Display::None
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<&str>;

    fn parent(&self, node: NodeId) -> Option<NodeId>;

    fn children(&self, node: NodeId) -> Vec<NodeId>;

    /// Deep-copy `node`, give the copy the render target `target`, and append
    /// it as the last child of `node`'s parent.
    fn clone_subtree(&mut self, node: NodeId, target: &str) -> Result<NodeId>;

    /// Replace the first `placeholder` in the subtree's content with `text`.
    fn substitute_placeholder(&mut self, node: NodeId, placeholder: &str, text: &str);

    fn remove(&mut self, node: NodeId);

    /// Detach `node` and append it under `parent`. Ignored when `parent`
    /// is `node` itself or one of its descendants.
    fn move_to(&mut self, node: NodeId, parent: NodeId);

    /// Nodes tagged with external id `ext_id` in `instance`.
    fn tagged(&self, ext_id: &str, instance: &str) -> Vec<NodeId>;
}

/// Display mode that preserves a node's layout category when shown.
///
/// Layout hints are checked in order: flex direction, grid areas, line clamp.
pub fn layout_display<S: RenderSurface + ?Sized>(surface: &S, node: NodeId) -> Display {
    let has = |property: &str| surface.style(node, property).is_some_and(|v| !v.is_empty());
    if has("flex-direction") {
        Display::Flex
    } else if has("grid-template-areas") {
        Display::Grid
    } else if has("-webkit-line-clamp") {
        Display::WebkitBox
    } else {
        Display::Block
    }
}
