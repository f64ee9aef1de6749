// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Authoritative store contract.
//!
//! The store is read-only from the cache's point of view: it hands out flat
//! rows for published content, ordered by `(level, sort_order)`, and the
//! loader assembles them into a tree.

use std::collections::HashSet;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};
use crate::tree::{ContentNode, NodeId, ROOT_ID};

/// One published row: hierarchy columns plus the serialized node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreRow {
    pub id: NodeId,
    pub parent_id: NodeId,
    pub level: u32,
    pub sort_order: i32,
    /// JSON encoding of a [`ContentNode`]
    pub payload: String,
}

impl StoreRow {
    /// Build a row from a node, serializing it as the payload.
    pub fn from_node(node: &ContentNode) -> Result<Self> {
        Ok(Self {
            id: node.id,
            parent_id: node.parent_id,
            level: node.level,
            sort_order: node.sort_order,
            payload: serde_json::to_string(node)?,
        })
    }

    /// Parse the payload into a node.
    ///
    /// The hierarchy columns are authoritative and override whatever the
    /// payload carries for id, parent, level and sort order.
    pub fn parse(&self) -> Result<ContentNode> {
        let mut node: ContentNode = serde_json::from_str(&self.payload)?;
        node.id = self.id;
        node.parent_id = self.parent_id;
        node.level = self.level;
        node.sort_order = self.sort_order;
        Ok(node)
    }
}

#[async_trait]
pub trait ContentStore: Send + Sync {
    /// All published rows, ordered by `(level, sort_order)`.
    async fn published_rows(&self) -> Result<Vec<StoreRow>>;

    /// A single published row.
    /// Default implementation scans [`published_rows`](Self::published_rows).
    async fn row(&self, id: NodeId) -> Result<Option<StoreRow>> {
        Ok(self.published_rows().await?.into_iter().find(|r| r.id == id))
    }

    /// Published children of `parent_id`, ordered by sort order.
    ///
    /// Children of the root are the level 1 rows, whatever parent they
    /// declare.
    async fn child_rows(&self, parent_id: NodeId) -> Result<Vec<StoreRow>> {
        Ok(self
            .published_rows()
            .await?
            .into_iter()
            .filter(|r| {
                if parent_id == ROOT_ID {
                    r.level == 1
                } else {
                    r.level != 1 && r.parent_id == parent_id
                }
            })
            .collect())
    }

    /// Published descendants of `id`, ordered by `(level, sort_order)`.
    async fn descendant_rows(&self, id: NodeId) -> Result<Vec<StoreRow>> {
        let rows = self.published_rows().await?;
        let mut ancestors: HashSet<NodeId> = HashSet::from([id]);
        let mut out = Vec::new();
        // Rows arrive by level, so a parent is always seen before its children.
        for row in rows {
            if row.id != id && ancestors.contains(&row.parent_id) {
                ancestors.insert(row.id);
                out.push(row);
            }
        }
        Ok(out)
    }
}

/// Shorthand for store failures.
pub fn unavailable(reason: impl std::fmt::Display) -> CacheError {
    CacheError::StoreUnavailable(reason.to_string())
}
