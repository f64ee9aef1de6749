// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Merge engine: place one node into a tree.
//!
//! [`upsert`] inserts a new node, updates an existing one in place, changes
//! its content type, or moves it under a new parent, then restores the
//! sibling order with a single local scan.
//!
//! # Precondition
//!
//! The local reposition assumes every other sibling is already sorted. Any
//! caller that has touched several siblings at once (bulk sort-order
//! updates) must follow up with [`Tree::sort_children`].
//!
//! # Example
//!
//! ```
//! use content_cache::{merge, ContentNode, Tree, ROOT_ID};
//!
//! let tree = Tree::new();
//! let (tree, placed) = merge::upsert(
//!     tree, 1, 1, ROOT_ID,
//!     ContentNode::new(1, ROOT_ID, "home"),
//! ).unwrap();
//!
//! assert_eq!(placed, Some(1));
//! assert_eq!(tree.children(ROOT_ID), &[1]);
//! assert!(tree.schema().knows("home"));
//! ```

use tracing::{debug, info, warn};

use crate::error::{CacheError, Result};
use super::document::Tree;
use super::node::{ContentNode, NodeId, ROOT_ID};

/// Insert or update `node` in `tree`.
///
/// Returns the (possibly new) tree and the placed node id. `None` means the
/// operation was a no-op because the parent is not in the tree yet; the
/// returned tree is then the input, untouched, same document identity.
///
/// `level == 1` places the node under the root whatever `parent_id` says.
/// Any other level only selects `parent_id`; the stored level is always the
/// parent's level plus one.
///
/// Fails with [`CacheError::InconsistentInput`] when the node's own id or
/// parent id disagree with the arguments.
pub fn upsert(
    mut tree: Tree,
    id: NodeId,
    level: u32,
    parent_id: NodeId,
    node: ContentNode,
) -> Result<(Tree, Option<NodeId>)> {
    let placed = upsert_in_place(&mut tree, id, level, parent_id, node)?;
    Ok((tree, placed))
}

/// [`upsert`] on a tree owned by the caller (e.g. a write handle's copy).
///
/// On error the tree is left untouched. A schema extension replaces `*tree`
/// with a new document.
pub fn upsert_in_place(
    tree: &mut Tree,
    id: NodeId,
    level: u32,
    parent_id: NodeId,
    mut node: ContentNode,
) -> Result<Option<NodeId>> {
    check_consistency(id, parent_id, &node)?;

    let parent = if level == 1 { ROOT_ID } else { parent_id };
    if id == ROOT_ID {
        warn!("Refusing to upsert over the root node");
        return Ok(None);
    }
    if !tree.contains(parent) {
        debug!(id, parent, "Parent not published yet, skipping node");
        return Ok(None);
    }
    if tree.contains(id) && tree.is_ancestor_or_self(id, parent) {
        warn!(id, parent, "Move would create a cycle, skipping node");
        return Ok(None);
    }

    let depth = tree.get(parent).map_or(1, |p| p.level + 1);
    if depth != level {
        debug!(id, parent, level, depth, "Declared level disagrees with parent, using depth");
    }
    node.level = depth;
    node.parent_id = parent;
    node.children.clear();

    let Some(current) = tree.get(id) else {
        extend_schema_for(tree, &node);
        tree.append_child(parent, node);
        tree.reposition(id);
        return Ok(Some(id));
    };

    let moved = current.parent_id != parent;
    let relevel = moved || current.level != depth;

    if current.content_type == node.content_type {
        if let Some(existing) = tree.node_mut(id) {
            existing.copy_content_from(&node);
        }
        if moved {
            tree.move_under(id, parent);
        }
    } else {
        debug!(
            id,
            from = %current.content_type,
            to = %node.content_type,
            "Content type changed, transferring children"
        );
        node.children = current.children.clone();
        extend_schema_for(tree, &node);
        if moved {
            tree.detach(id);
            tree.append_child(parent, node);
        } else {
            tree.put_node(node);
        }
    }

    if relevel {
        tree.relevel_subtree(id, depth);
    }
    tree.reposition(id);
    Ok(Some(id))
}

/// Swap `tree` for a new document whose schema declares `node`'s type.
fn extend_schema_for(tree: &mut Tree, node: &ContentNode) {
    if tree.schema().knows(&node.content_type) {
        return;
    }
    info!(
        content_type = %node.content_type,
        document = %tree.document_id(),
        "Extending schema for new content type"
    );
    *tree = tree.with_extended_schema(node);
}

fn check_consistency(id: NodeId, parent_id: NodeId, node: &ContentNode) -> Result<()> {
    if node.id != id {
        return Err(CacheError::InconsistentInput {
            argument: "id",
            expected: id.into(),
            actual: node.id.into(),
        });
    }
    if node.parent_id != parent_id {
        return Err(CacheError::InconsistentInput {
            argument: "parentId",
            expected: parent_id.into(),
            actual: node.parent_id.into(),
        });
    }
    Ok(())
}
