// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Content cache facade.
//!
//! The [`ContentCache`] ties the components together:
//! - [`SnapshotGuard`] owning the published tree
//! - [`Loader`] producing it from the durable file or the store
//! - [`Persister`] writing it back after registered commits
//! - [`StalenessMonitor`] reloading it when another process rewrote the file
//!
//! # Lifecycle
//!
//! ```text
//! Created → Loading → Ready → ShuttingDown → Stopped
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use content_cache::{CacheConfig, CacheState, ContentCache, ContentNode, InMemoryStore, ROOT_ID};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), content_cache::CacheError> {
//! let store = Arc::new(InMemoryStore::new());
//! let cache = ContentCache::new(CacheConfig::default(), store);
//! assert_eq!(cache.state(), CacheState::Created);
//!
//! cache.start().await?;
//! cache.publish_node(ContentNode::new(1, ROOT_ID, "home").with_level(1), false).await?;
//! assert_eq!(cache.current_snapshot().await.children(ROOT_ID), &[1]);
//!
//! cache.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod types;
mod api;
mod lifecycle;

pub use types::{CacheState, CacheEvent, CacheStats};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use parking_lot::RwLock;
use tokio::sync::{broadcast, watch, OnceCell};
use tracing::debug;

use crate::config::CacheConfig;
use crate::loader::Loader;
use crate::persistence::{FileClock, Persister};
use crate::snapshot::{ReadContext, SnapshotGuard};
use crate::staleness::StalenessMonitor;
use crate::store::ContentStore;
use crate::tree::Tree;

/// In-memory published-content cache.
///
/// # Thread Safety
///
/// The cache is `Send + Sync`; share it behind an `Arc`. Reads never wait
/// for writers. Writes are serialized by the snapshot guard.
pub struct ContentCache {
    pub(super) config: CacheConfig,

    /// Authoritative source for rebuilds and related-row lookups
    pub(super) store: Arc<dyn ContentStore>,

    /// Published tree plus the single-writer lock
    pub(super) guard: Arc<SnapshotGuard>,

    pub(super) loader: Loader,

    pub(super) monitor: StalenessMonitor,

    /// Last file mtime this process read or wrote
    pub(super) clock: Arc<FileClock>,

    /// Background file writer, present between start and shutdown when
    /// persistence is enabled
    pub(super) persister: RwLock<Option<Arc<Persister>>>,

    /// Runs the startup sequence once; concurrent `start()` calls share it
    pub(super) init: OnceCell<()>,

    /// Cache state (broadcast to watchers)
    pub(super) state: watch::Sender<CacheState>,

    /// Cache state receiver (for internal use)
    pub(super) state_rx: watch::Receiver<CacheState>,

    pub(super) events: broadcast::Sender<CacheEvent>,

    /// Set once this process gave up writing the file
    pub(super) ownership_released: AtomicBool,
}

impl ContentCache {
    /// Create a cache in the `Created` state.
    ///
    /// Nothing is loaded until [`start()`](Self::start); until then reads
    /// see an empty tree and writes are ignored.
    pub fn new(config: CacheConfig, store: Arc<dyn ContentStore>) -> Self {
        let (state_tx, state_rx) = watch::channel(CacheState::Created);
        let (events, _) = broadcast::channel(config.event_channel_capacity.max(1));
        let clock = Arc::new(FileClock::new());

        Self {
            loader: Loader::new(store.clone(), &config, clock.clone()),
            monitor: StalenessMonitor::new(&config, clock.clone()),
            clock,
            config,
            store,
            guard: Arc::new(SnapshotGuard::new(Tree::new())),
            persister: RwLock::new(None),
            init: OnceCell::new(),
            state: state_tx,
            state_rx,
            events,
            ownership_released: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Get current cache state.
    #[must_use]
    pub fn state(&self) -> CacheState {
        *self.state_rx.borrow()
    }

    /// Get a receiver to watch state changes.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<CacheState> {
        self.state_rx.clone()
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state() == CacheState::Ready
    }

    /// Subscribe to `Updated` / `Cleared` notifications.
    ///
    /// Slow subscribers lag and miss events rather than block writers.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    /// The guard behind the cache, for flows that need their own handles.
    #[must_use]
    pub fn guard(&self) -> &Arc<SnapshotGuard> {
        &self.guard
    }

    /// The published tree, after reloading it if the file changed on disk.
    pub async fn current_snapshot(&self) -> Arc<Tree> {
        self.sync_if_stale().await;
        self.guard.published()
    }

    /// Request-scoped read: the first call pins the published tree in `ctx`,
    /// later calls with the same context return that same tree.
    pub async fn snapshot_in(&self, ctx: &mut ReadContext) -> Arc<Tree> {
        if let Some(pinned) = ctx.pinned() {
            return pinned.clone();
        }
        self.sync_if_stale().await;
        ctx.pin_with(|| self.guard.published())
    }

    /// Stop writing the durable file. The in-memory cache keeps working.
    pub fn release_file_ownership(&self) {
        self.ownership_released.store(true, Ordering::Release);
        let persister = self.persister.read().clone();
        match persister {
            Some(persister) => persister.release_ownership(),
            None => {
                crate::metrics::set_file_owner(false);
                debug!("File ownership released before persister start");
            }
        }
    }

    /// Whether this process writes the durable file.
    #[must_use]
    pub fn is_file_owner(&self) -> bool {
        self.config.persist_enabled && !self.ownership_released.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let tree = self.guard.published();
        CacheStats {
            state: self.state(),
            generation: self.guard.generation(),
            nodes: tree.len(),
            document: tree.document_id(),
            file_owner: self.is_file_owner(),
            persister: self.persister.read().as_ref().map(|p| p.stats()),
            stale_checks: self.monitor.checks(),
            stale_reloads: self.monitor.reloads(),
        }
    }

    pub(super) fn accepting_writes(&self, operation: &'static str) -> bool {
        let state = self.state();
        if state == CacheState::Ready {
            return true;
        }
        debug!(operation, %state, "Cache not ready, ignoring write");
        crate::metrics::record_operation(operation, "skipped");
        false
    }

    pub(super) fn emit(&self, event: CacheEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    fn cache() -> ContentCache {
        let config = CacheConfig {
            file_cache_enabled: false,
            persist_enabled: false,
            ..Default::default()
        };
        ContentCache::new(config, Arc::new(InMemoryStore::new()))
    }

    #[test]
    fn test_new_cache_is_created() {
        let cache = cache();
        assert_eq!(cache.state(), CacheState::Created);
        assert!(!cache.is_ready());
        assert!(!cache.is_file_owner());

        let stats = cache.stats();
        assert_eq!(stats.nodes, 0);
        assert_eq!(stats.generation, 0);
        assert!(stats.persister.is_none());
    }

    #[tokio::test]
    async fn test_reads_before_start_see_empty_tree() {
        let cache = cache();
        assert!(cache.current_snapshot().await.is_empty());

        let mut ctx = ReadContext::new();
        let first = cache.snapshot_in(&mut ctx).await;
        assert!(Arc::ptr_eq(&first, &cache.snapshot_in(&mut ctx).await));
    }

    #[test]
    fn test_release_before_start() {
        let config = CacheConfig {
            file_cache_enabled: false,
            ..Default::default()
        };
        let cache = ContentCache::new(config, Arc::new(InMemoryStore::new()));
        assert!(cache.is_file_owner());
        cache.release_file_ownership();
        assert!(!cache.is_file_owner());
    }
}
