// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-memory [`ContentStore`] for tests, demos and embedding.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::Result;
use crate::tree::{ContentNode, NodeId};
use super::traits::{unavailable, ContentStore, StoreRow};

pub struct InMemoryStore {
    /// id → (insertion sequence, row)
    rows: DashMap<NodeId, (u64, StoreRow)>,
    next_seq: AtomicU64,
    unavailable: AtomicBool,
    queries: AtomicU64,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            rows: DashMap::new(),
            next_seq: AtomicU64::new(0),
            unavailable: AtomicBool::new(false),
            queries: AtomicU64::new(0),
        }
    }

    /// Publish (or republish) a node.
    pub fn put(&self, node: &ContentNode) -> Result<()> {
        let row = StoreRow::from_node(node)?;
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        self.rows
            .entry(row.id)
            .and_modify(|(_, existing)| *existing = row.clone())
            .or_insert((seq, row));
        Ok(())
    }

    /// Unpublish a single row.
    pub fn remove(&self, id: NodeId) {
        self.rows.remove(&id);
    }

    /// Change a row's sort order column.
    pub fn set_sort_order(&self, id: NodeId, sort_order: i32) -> bool {
        match self.rows.get_mut(&id) {
            Some(mut entry) => {
                entry.1.sort_order = sort_order;
                true
            }
            None => false,
        }
    }

    /// Make every query fail (or succeed again).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of queries served or refused so far.
    #[must_use]
    pub fn query_count(&self) -> u64 {
        self.queries.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn clear(&self) {
        self.rows.clear();
    }

    fn check_available(&self) -> Result<()> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(unavailable("in-memory store marked unavailable"));
        }
        Ok(())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentStore for InMemoryStore {
    async fn published_rows(&self) -> Result<Vec<StoreRow>> {
        self.check_available()?;
        let mut rows: Vec<(u64, StoreRow)> =
            self.rows.iter().map(|r| r.value().clone()).collect();
        rows.sort_by_key(|(seq, row)| (row.level, row.sort_order, *seq));
        Ok(rows.into_iter().map(|(_, row)| row).collect())
    }

    async fn row(&self, id: NodeId) -> Result<Option<StoreRow>> {
        self.check_available()?;
        Ok(self.rows.get(&id).map(|r| r.value().1.clone()))
    }
}
