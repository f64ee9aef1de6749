// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The copy-on-write content tree.
//!
//! Nodes live in a map of `Arc<ContentNode>` keyed by id. Cloning a [`Tree`]
//! copies pointers only; every mutation goes through `Arc::make_mut`, so a
//! writer working on a clone copies exactly the nodes it touches and any
//! reader holding the previous tree keeps seeing the old values.
//!
//! ```text
//!   published ──► { -1 ─► root, 1 ─► A, 2 ─► B, 3 ─► C }
//!   clone     ──► { -1 ─► root, 1 ─► A', 2 ─► B, 3 ─► C }   (only A copied)
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::node::{ContentNode, NodeId, ROOT_ID};
use super::schema::Schema;

static NEXT_DOCUMENT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a document.
///
/// Clones share the identity of their source; a fresh document (new tree or
/// schema extension) gets a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(u64);

impl DocumentId {
    fn next() -> Self {
        Self(NEXT_DOCUMENT_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "doc#{}", self.0)
    }
}

/// Tree document: one root plus a forest of content nodes.
#[derive(Debug, Clone)]
pub struct Tree {
    document_id: DocumentId,
    schema: Arc<Schema>,
    nodes: HashMap<NodeId, Arc<ContentNode>>,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

/// Content equality: same schema and same nodes. Document identity is not
/// compared, use [`Tree::document_id`] for that.
impl PartialEq for Tree {
    fn eq(&self, other: &Self) -> bool {
        self.schema == other.schema && self.nodes == other.nodes
    }
}

impl Eq for Tree {}

impl Tree {
    /// Empty document: a root and nothing else.
    #[must_use]
    pub fn new() -> Self {
        Self::with_schema(Schema::new())
    }

    /// Empty document carrying the given schema declaration.
    #[must_use]
    pub fn with_schema(schema: Schema) -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(ROOT_ID, Arc::new(ContentNode::root()));
        Self {
            document_id: DocumentId::next(),
            schema: Arc::new(schema),
            nodes,
        }
    }

    #[must_use]
    pub fn document_id(&self) -> DocumentId {
        self.document_id
    }

    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    #[must_use]
    pub fn root(&self) -> &ContentNode {
        self.nodes
            .get(&ROOT_ID)
            .map(Arc::as_ref)
            .unwrap_or_else(|| unreachable!("tree always holds a root"))
    }

    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&ContentNode> {
        self.nodes.get(&id).map(Arc::as_ref)
    }

    /// Shared handle to a node, for handing out beyond the tree's lifetime.
    #[must_use]
    pub fn get_shared(&self, id: NodeId) -> Option<Arc<ContentNode>> {
        self.nodes.get(&id).cloned()
    }

    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Number of content nodes (root excluded).
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len() - 1
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element children of `id` in sibling order (empty if `id` is absent).
    #[must_use]
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes.get(&id).map_or(&[], |n| n.children.as_slice())
    }

    /// All descendants of `id` in depth-first pre-order, `id` excluded.
    #[must_use]
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).iter().rev());
        }
        out
    }

    /// Every content node in depth-first pre-order (parents before children,
    /// siblings in order).
    #[must_use]
    pub fn depth_first(&self) -> Vec<&ContentNode> {
        self.descendants(ROOT_ID)
            .into_iter()
            .filter_map(|id| self.get(id))
            .collect()
    }

    // --- Mutation (private copies only) ---

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Option<&mut ContentNode> {
        self.nodes.get_mut(&id).map(Arc::make_mut)
    }

    /// Insert or overwrite a node entry without touching any child list.
    pub(crate) fn put_node(&mut self, node: ContentNode) {
        self.nodes.insert(node.id, Arc::new(node));
    }

    /// Append `node` as the last child of `parent`.
    ///
    /// The caller guarantees `parent` exists.
    pub(crate) fn append_child(&mut self, parent: NodeId, mut node: ContentNode) {
        let id = node.id;
        node.parent_id = parent;
        self.put_node(node);
        if let Some(p) = self.node_mut(parent) {
            p.children.push(id);
        }
    }

    /// Unlink `id` from its parent's child list; the node entry stays.
    pub(crate) fn detach(&mut self, id: NodeId) {
        let Some(parent) = self.get(id).map(|n| n.parent_id) else {
            return;
        };
        if parent == id {
            return;
        }
        if let Some(p) = self.node_mut(parent) {
            p.children.retain(|c| *c != id);
        }
    }

    /// Detach `id` and append it as the last child of `parent`.
    pub(crate) fn move_under(&mut self, id: NodeId, parent: NodeId) {
        self.detach(id);
        if let Some(node) = self.node_mut(id) {
            node.parent_id = parent;
        }
        if let Some(p) = self.node_mut(parent) {
            p.children.push(id);
        }
    }

    /// Whether `ancestor` is `id` itself or lies on the path from `id` to the root.
    #[must_use]
    pub fn is_ancestor_or_self(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut cursor = id;
        loop {
            if cursor == ancestor {
                return true;
            }
            match self.get(cursor) {
                Some(node) if !node.is_root() => cursor = node.parent_id,
                _ => return false,
            }
        }
    }

    /// Set the level of `id` and renumber its whole subtree below it.
    pub(crate) fn relevel_subtree(&mut self, id: NodeId, level: u32) {
        let mut stack = vec![(id, level)];
        while let Some((next, lvl)) = stack.pop() {
            let Some(node) = self.node_mut(next) else { continue };
            if node.level != lvl {
                node.level = lvl;
            }
            let children = node.children.clone();
            stack.extend(children.into_iter().map(|c| (c, lvl + 1)));
        }
    }

    /// Remove a node and its whole subtree (unpublish).
    ///
    /// Returns the removed node, or `None` if absent or if `id` is the root.
    pub fn remove_subtree(&mut self, id: NodeId) -> Option<ContentNode> {
        if id == ROOT_ID || !self.contains(id) {
            return None;
        }
        let descendants = self.descendants(id);
        self.detach(id);
        for d in descendants {
            self.nodes.remove(&d);
        }
        self.nodes
            .remove(&id)
            .map(|n| Arc::try_unwrap(n).unwrap_or_else(|shared| (*shared).clone()))
    }

    /// Change a node's sort order without moving it.
    ///
    /// Returns `true` if the value changed.
    pub fn set_sort_order(&mut self, id: NodeId, sort_order: i32) -> bool {
        match self.get(id) {
            Some(node) if node.sort_order != sort_order => {
                if let Some(node) = self.node_mut(id) {
                    node.sort_order = sort_order;
                }
                true
            }
            _ => false,
        }
    }

    /// Move `id` to its sort-order position among its siblings.
    ///
    /// Assumes the other siblings are already in order: scans left while the
    /// previous sibling sorts strictly after the node, otherwise right while
    /// the next sibling sorts strictly before it. Equal sort orders keep
    /// their relative (insertion) order. Returns `true` if the node moved.
    pub fn reposition(&mut self, id: NodeId) -> bool {
        let Some(node) = self.get(id) else { return false };
        let (parent, sort) = (node.parent_id, node.sort_order);
        if id == ROOT_ID {
            return false;
        }

        let siblings = self.children(parent);
        let Some(current) = siblings.iter().position(|c| *c == id) else {
            return false;
        };
        let sort_of = |sib: NodeId| self.get(sib).map_or(0, |n| n.sort_order);

        let mut target = current;
        while target > 0 && sort_of(siblings[target - 1]) > sort {
            target -= 1;
        }
        if target == current {
            while target + 1 < siblings.len() && sort_of(siblings[target + 1]) < sort {
                target += 1;
            }
        }
        if target == current {
            return false;
        }

        if let Some(p) = self.node_mut(parent) {
            let moved = p.children.remove(current);
            p.children.insert(target, moved);
        }
        true
    }

    /// Full stable reorder of `parent`'s children by sort order.
    ///
    /// Returns `true` if the order changed.
    pub fn sort_children(&mut self, parent: NodeId) -> bool {
        let current = self.children(parent).to_vec();
        let mut sorted = current.clone();
        sorted.sort_by_key(|c| self.get(*c).map_or(0, |n| n.sort_order));
        if sorted == current {
            return false;
        }
        if let Some(p) = self.node_mut(parent) {
            p.children = sorted;
        }
        true
    }

    /// Copy of this tree under a fresh document whose schema also declares
    /// `node`'s content type. Existing content is re-imported unchanged.
    #[must_use]
    pub fn with_extended_schema(&self, node: &ContentNode) -> Self {
        Self {
            document_id: DocumentId::next(),
            schema: Arc::new(self.schema.extended_with(node)),
            nodes: self.nodes.clone(),
        }
    }

    /// Check the structural invariants.
    ///
    /// Every non-root node's parent must exist and list it as a child, every
    /// listed child must exist and point back, levels must follow depth and
    /// siblings must be sorted ascending. Returns the first violation found.
    pub fn check_invariants(&self) -> Result<(), String> {
        for (id, node) in &self.nodes {
            if *id != node.id {
                return Err(format!("node keyed {} carries id {}", id, node.id));
            }
            if node.is_root() {
                continue;
            }
            let Some(parent) = self.get(node.parent_id) else {
                return Err(format!("node {} is orphaned (parent {} missing)", id, node.parent_id));
            };
            if !parent.children.contains(id) {
                return Err(format!("node {} not listed under parent {}", id, node.parent_id));
            }
            if node.level != parent.level + 1 {
                return Err(format!(
                    "node {} has level {} under parent level {}",
                    id, node.level, parent.level
                ));
            }
        }
        for node in self.nodes.values() {
            let mut previous: Option<i32> = None;
            for child in &node.children {
                let Some(c) = self.get(*child) else {
                    return Err(format!("node {} lists missing child {}", node.id, child));
                };
                if c.parent_id != node.id {
                    return Err(format!("child {} of {} points to {}", child, node.id, c.parent_id));
                }
                if previous.is_some_and(|p| p > c.sort_order) {
                    return Err(format!("children of {} are not sorted at {}", node.id, child));
                }
                previous = Some(c.sort_order);
            }
        }
        Ok(())
    }
}
