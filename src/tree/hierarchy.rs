// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Hierarchy index: assemble a tree from flat nodes.
//!
//! Used by full rebuilds (store rows) and by the file reader. Nodes are fed
//! in sibling order (the store orders rows by `(level, sort order)`, the file
//! is depth-first), indexed by parent, then attached to the tree from the
//! root down with an explicit work stack so tree depth is never bounded by
//! the call stack.

use std::collections::HashMap;
use tracing::warn;

use super::document::Tree;
use super::node::{ContentNode, NodeId, ROOT_ID};
use super::schema::Schema;

/// Transient parent → children and id → node maps.
#[derive(Debug, Default)]
pub struct HierarchyIndex {
    children: HashMap<NodeId, Vec<NodeId>>,
    nodes: HashMap<NodeId, ContentNode>,
    duplicates: usize,
}

impl HierarchyIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Index a node under `parent`, after any sibling already indexed.
    ///
    /// A repeated id replaces the earlier node but keeps its sibling slot.
    pub fn insert(&mut self, parent: NodeId, node: ContentNode) {
        let id = node.id;
        if self.nodes.insert(id, node).is_some() {
            self.duplicates += 1;
            return;
        }
        self.children.entry(parent).or_default().push(id);
    }

    /// Index a node under the parent it declares, or the root for level 1.
    pub fn insert_declared(&mut self, node: ContentNode) {
        let parent = if node.level == 1 { ROOT_ID } else { node.parent_id };
        self.insert(parent, node);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Attach every node reachable from the root into a fresh tree.
    ///
    /// Content types missing from `schema` are declared as they are met.
    /// Nodes whose parent chain never reaches the root are dropped and
    /// counted in the returned [`Assembly`].
    #[must_use]
    pub fn assemble(mut self, mut schema: Schema) -> Assembly {
        // Declare types up front so the tree is built once with its final schema.
        for node in self.nodes.values() {
            schema.declare(node);
        }
        let mut tree = Tree::with_schema(schema);

        let mut stack = vec![(ROOT_ID, 0u32)];
        while let Some((parent, parent_level)) = stack.pop() {
            let Some(child_ids) = self.children.remove(&parent) else {
                continue;
            };
            for child in child_ids {
                let Some(mut node) = self.nodes.remove(&child) else {
                    continue;
                };
                node.level = parent_level + 1;
                node.children.clear();
                tree.append_child(parent, node);
                stack.push((child, parent_level + 1));
            }
        }

        let orphaned = self.nodes.len();
        if orphaned > 0 {
            let mut sample: Vec<NodeId> = self.nodes.keys().copied().collect();
            sample.sort_unstable();
            sample.truncate(10);
            warn!(orphaned, ?sample, "Dropping nodes with no published parent chain");
        }

        Assembly {
            tree,
            orphaned,
            duplicates: self.duplicates,
        }
    }
}

/// Result of [`HierarchyIndex::assemble`].
#[derive(Debug)]
pub struct Assembly {
    pub tree: Tree,
    /// Nodes not reachable from the root
    pub orphaned: usize,
    /// Repeated ids collapsed during indexing
    pub duplicates: usize,
}
