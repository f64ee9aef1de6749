// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Write operations: publish, reorder, clear, rebuild.
//!
//! Every operation follows the same protocol: take a write handle (a
//! private copy of the published tree), change the copy, and commit with
//! `register_change = true` only if something actually changed. Dropping an
//! uncommitted handle discards the copy.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::metrics::LatencyTimer;
use crate::snapshot::SnapshotHandle;
use crate::tree::{merge, ContentNode, NodeId, Tree, ROOT_ID};

use super::{CacheEvent, ContentCache};

impl ContentCache {
    // ═══════════════════════════════════════════════════════════════════════════
    // API: Incremental updates
    // ═══════════════════════════════════════════════════════════════════════════

    /// Publish one node: insert it, update it in place, or move it.
    ///
    /// A node with level 0 gets its level from its parent in the tree. With
    /// `update_related`, the node's published descendants are re-read from
    /// the store and upserted after it, so a move or rename propagates to the
    /// whole subtree.
    ///
    /// Returns `Ok(None)` when the parent is not published yet, or when the
    /// cache is not started.
    ///
    /// Related rows that cannot be parsed or placed are skipped with a
    /// warning; a store failure publishes the node alone.
    ///
    /// # Errors
    ///
    /// `InvalidState` if the cache shut down while the call waited for the
    /// write lock.
    #[tracing::instrument(skip(self, node), fields(id = node.id, parent = node.parent_id))]
    pub async fn publish_node(&self, node: ContentNode, update_related: bool) -> Result<Option<NodeId>> {
        let _timer = LatencyTimer::new("publish");
        if !self.accepting_writes("publish") {
            return Ok(None);
        }

        let mut handle = self.guard.acquire_write(false).await?;
        let id = node.id;
        let Some(placed) = place(handle.tree_mut()?, node)? else {
            crate::metrics::record_operation("publish", "noop");
            return Ok(None);
        };

        if update_related {
            self.publish_related(&mut handle, placed).await?;
        }

        handle.commit(true)?;
        let published = handle.tree().get_shared(placed);
        drop(handle);

        crate::metrics::record_operation("publish", "success");
        if let Some(node) = published {
            self.emit(CacheEvent::Updated { node });
        }
        debug!(id, update_related, "Node published");
        Ok(Some(placed))
    }

    async fn publish_related(&self, handle: &mut SnapshotHandle<'_>, id: NodeId) -> Result<()> {
        let rows = match self.store.descendant_rows(id).await {
            Ok(rows) => rows,
            Err(e) => {
                crate::metrics::record_error("cache", "publish_related", e.kind());
                warn!(id, error = %e, "Could not read related rows, publishing the node alone");
                return Ok(());
            }
        };

        let tree = handle.tree_mut()?;
        let (mut placed, mut skipped) = (0usize, 0usize);
        for row in rows {
            let node = match row.parse() {
                Ok(node) => node,
                Err(e) => {
                    skipped += 1;
                    warn!(id = row.id, error = %e, "Skipping related row with unparsable payload");
                    continue;
                }
            };
            match merge::upsert_in_place(tree, row.id, row.level, row.parent_id, node) {
                Ok(Some(_)) => placed += 1,
                Ok(None) => skipped += 1,
                Err(e) => {
                    skipped += 1;
                    warn!(id = row.id, error = %e, "Skipping inconsistent related row");
                }
            }
        }
        debug!(id, placed, skipped, "Related nodes republished");
        Ok(())
    }

    /// Re-read the sort order of `parent_id`'s children from the store and
    /// reorder them.
    ///
    /// Returns whether the published tree changed.
    #[tracing::instrument(skip(self))]
    pub async fn sort_siblings(&self, parent_id: NodeId) -> Result<bool> {
        let _timer = LatencyTimer::new("sort");
        if !self.accepting_writes("sort") {
            return Ok(false);
        }

        let mut handle = self.guard.acquire_write(false).await?;
        if !handle.tree().contains(parent_id) {
            crate::metrics::record_operation("sort", "noop");
            return Ok(false);
        }

        let rows = match self.store.child_rows(parent_id).await {
            Ok(rows) => rows,
            Err(e) => {
                crate::metrics::record_error("cache", "sort", e.kind());
                warn!(parent_id, error = %e, "Could not read sibling sort orders");
                return Ok(false);
            }
        };

        let tree = handle.tree_mut()?;
        let mut changed = false;
        for row in &rows {
            let is_child = tree.get(row.id).is_some_and(|n| n.parent_id == parent_id);
            if is_child {
                changed |= tree.set_sort_order(row.id, row.sort_order);
            }
        }
        // Several siblings may have moved: a local reposition is not enough.
        changed |= tree.sort_children(parent_id);

        if !changed {
            crate::metrics::record_operation("sort", "noop");
            return Ok(false);
        }
        handle.commit(true)?;
        crate::metrics::record_operation("sort", "success");
        debug!(parent_id, siblings = rows.len(), "Siblings reordered");
        Ok(true)
    }

    /// Re-read one node's sort order from the store and move it into place.
    ///
    /// Returns whether the published tree changed.
    #[tracing::instrument(skip(self))]
    pub async fn update_sort_order(&self, id: NodeId) -> Result<bool> {
        let _timer = LatencyTimer::new("update_sort_order");
        if !self.accepting_writes("update_sort_order") {
            return Ok(false);
        }

        let mut handle = self.guard.acquire_write(false).await?;
        if id == ROOT_ID || !handle.tree().contains(id) {
            crate::metrics::record_operation("update_sort_order", "noop");
            return Ok(false);
        }

        let row = match self.store.row(id).await {
            Ok(Some(row)) => row,
            Ok(None) => {
                debug!(id, "Node no longer published in store");
                crate::metrics::record_operation("update_sort_order", "noop");
                return Ok(false);
            }
            Err(e) => {
                crate::metrics::record_error("cache", "update_sort_order", e.kind());
                warn!(id, error = %e, "Could not read sort order");
                return Ok(false);
            }
        };

        let tree = handle.tree_mut()?;
        if !tree.set_sort_order(id, row.sort_order) {
            crate::metrics::record_operation("update_sort_order", "noop");
            return Ok(false);
        }
        tree.reposition(id);
        handle.commit(true)?;
        crate::metrics::record_operation("update_sort_order", "success");
        debug!(id, sort_order = row.sort_order, "Sort order updated");
        Ok(true)
    }

    /// Remove a node and its subtree (unpublish).
    ///
    /// Returns the removed node, `None` if it was not cached.
    #[tracing::instrument(skip(self))]
    pub async fn clear_cached_node(&self, id: NodeId) -> Result<Option<Arc<ContentNode>>> {
        let _timer = LatencyTimer::new("clear");
        if !self.accepting_writes("clear") {
            return Ok(None);
        }

        let mut handle = self.guard.acquire_write(false).await?;
        let Some(removed) = handle.tree_mut()?.remove_subtree(id) else {
            crate::metrics::record_operation("clear", "noop");
            return Ok(None);
        };
        handle.commit(true)?;
        drop(handle);

        let removed = Arc::new(removed);
        crate::metrics::record_operation("clear", "success");
        self.emit(CacheEvent::Cleared { node: removed.clone() });
        debug!(id, "Node cleared");
        Ok(Some(removed))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // API: Wholesale rebuild
    // ═══════════════════════════════════════════════════════════════════════════

    /// Rebuild the whole tree from the store and publish it.
    ///
    /// If the store fails the current tree stays published and `false` is
    /// returned.
    #[tracing::instrument(skip(self))]
    pub async fn refresh_from_store(&self) -> Result<bool> {
        let _timer = LatencyTimer::new("refresh");
        if !self.accepting_writes("refresh") {
            return Ok(false);
        }

        let mut handle = self.guard.acquire_write(false).await?;
        let outcome = self.loader.rebuild().await;
        let Some(tree) = outcome.tree else {
            crate::metrics::record_operation("refresh", "error");
            warn!("Store rebuild failed, keeping the published tree");
            return Ok(false);
        };

        let nodes = tree.len();
        handle.replace(tree)?;
        let generation = handle.commit(true)?;
        crate::metrics::record_operation("refresh", "success");
        info!(nodes, generation, "Content tree refreshed from store");
        Ok(true)
    }
}

/// Upsert `node` under the parent it declares.
///
/// A level of 0 means "unknown": derive it from the parent in the tree. The
/// merge engine stores the parent's depth whatever level is declared.
fn place(tree: &mut Tree, node: ContentNode) -> Result<Option<NodeId>> {
    let (id, parent_id) = (node.id, node.parent_id);
    let level = match node.level {
        0 if parent_id == ROOT_ID => 1,
        0 => match tree.get(parent_id) {
            Some(parent) => parent.level + 1,
            None => {
                debug!(id, parent_id, "Parent not published yet, skipping node");
                return Ok(None);
            }
        },
        level => level,
    };
    merge::upsert_in_place(tree, id, level, parent_id, node)
}
