// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Public types for the cache facade.

use std::sync::Arc;

use crate::persistence::PersisterStats;
use crate::tree::{ContentNode, DocumentId};

/// Cache lifecycle state.
///
/// Use [`super::ContentCache::state()`] to check the current state or
/// [`super::ContentCache::state_receiver()`] to watch for changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// Just created, not yet started
    Created,
    /// Loading the tree from the file or the store
    Loading,
    /// Serving reads and accepting writes
    Ready,
    /// Graceful shutdown in progress
    ShuttingDown,
    /// Persister stopped, writes refused
    Stopped,
}

impl std::fmt::Display for CacheState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::Loading => write!(f, "Loading"),
            Self::Ready => write!(f, "Ready"),
            Self::ShuttingDown => write!(f, "ShuttingDown"),
            Self::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Change notification, sent after the change is committed.
#[derive(Debug, Clone)]
pub enum CacheEvent {
    /// A node was published (inserted, updated or moved)
    Updated { node: Arc<ContentNode> },
    /// A node and its subtree were removed
    Cleared { node: Arc<ContentNode> },
}

impl CacheEvent {
    #[must_use]
    pub fn node(&self) -> &ContentNode {
        match self {
            Self::Updated { node } | Self::Cleared { node } => node,
        }
    }
}

/// Point-in-time view of the cache for diagnostics.
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub state: CacheState,
    /// Commits since creation
    pub generation: u64,
    /// Published nodes, root excluded
    pub nodes: usize,
    pub document: DocumentId,
    pub file_owner: bool,
    /// `None` when persistence is disabled or the cache is not started
    pub persister: Option<PersisterStats>,
    pub stale_checks: u64,
    pub stale_reloads: u64,
}
