//! Conditional re-parenting of externally-identified nodes.

use super::types::PlacementTable;
use crate::surface::RenderSurface;
use tracing::{debug, warn};

/// Evaluate `rules` against the current surface.
///
/// For each external object the first rule whose condition targets all
/// exist and are visible wins; tagged nodes move under its `set_at`
/// container. Returns the ids of objects that matched a rule.
pub fn place<S: RenderSurface + ?Sized>(
    instance: &str,
    rules: &PlacementTable,
    surface: &mut S,
) -> Vec<String> {
    let mut placed = Vec::new();
    for (object, candidates) in rules {
        let winner = candidates.iter().find(|rule| {
            rule.condition.iter().all(|target| {
                surface
                    .find(target, instance)
                    .is_some_and(|node| surface.is_visible(node))
            })
        });
        let Some(rule) = winner else { continue };

        let Some(container) = surface.find(&rule.set_at, instance) else {
            warn!(object = %object, set_at = %rule.set_at, "placement container not found");
            continue;
        };
        for node in surface.tagged(object, instance) {
            if surface.parent(node) != Some(container) {
                debug!(object = %object, set_at = %rule.set_at, "moving external node");
                surface.move_to(node, container);
            }
        }
        placed.push(object.clone());
    }
    placed
}
