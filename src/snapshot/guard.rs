// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Snapshot guard: single-writer lock plus clone/commit protocol.
//!
//! The guard owns the published tree reference. Plain readers take it with
//! [`SnapshotGuard::published`] and never wait for writers. Flows that may
//! need to write take a [`SnapshotHandle`] which holds the exclusive lock:
//!
//! ```text
//!   acquire_read ──► Read(Arc<Tree>) ──upgrade──► Write(clone) ──commit──► published
//!   acquire_write ─────────────────────────────► Write(clone) ──commit──► published
//! ```
//!
//! A write handle works on its own copy; a commit swaps the published
//! reference in one step, so a reader sees either the whole old tree or the
//! whole new one.
//!
//! # Example
//!
//! ```
//! use content_cache::{ContentNode, SnapshotGuard, Tree, ROOT_ID};
//! use content_cache::merge;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), content_cache::CacheError> {
//! let guard = SnapshotGuard::new(Tree::new());
//! let before = guard.published();
//!
//! let mut handle = guard.acquire_write(false).await?;
//! merge::upsert_in_place(handle.tree_mut()?, 1, 1, ROOT_ID, ContentNode::new(1, ROOT_ID, "page"))?;
//! assert!(before.is_empty());          // not visible yet
//! handle.commit(true)?;
//! drop(handle);
//!
//! assert_eq!(guard.published().len(), 1);
//! assert!(before.is_empty());          // old snapshot never changes
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use parking_lot::RwLock;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, trace};

use crate::error::{CacheError, Result};
use crate::tree::Tree;

/// Receives registered commits (the persister).
pub trait CommitListener: Send + Sync {
    fn committed(&self, tree: &Arc<Tree>, generation: u64);
}

pub struct SnapshotGuard {
    published: RwLock<Arc<Tree>>,
    lock: Mutex<()>,
    generation: AtomicU64,
    listener: RwLock<Option<Arc<dyn CommitListener>>>,
    closed: AtomicBool,
}

impl SnapshotGuard {
    #[must_use]
    pub fn new(tree: Tree) -> Self {
        Self {
            published: RwLock::new(Arc::new(tree)),
            lock: Mutex::new(()),
            generation: AtomicU64::new(0),
            listener: RwLock::new(None),
            closed: AtomicBool::new(false),
        }
    }

    /// The currently published tree. Never blocks on writers.
    #[must_use]
    pub fn published(&self) -> Arc<Tree> {
        self.published.read().clone()
    }

    /// Number of commits so far.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Whether a handle currently holds the lock.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.lock.try_lock().is_err()
    }

    pub fn set_listener(&self, listener: Arc<dyn CommitListener>) {
        *self.listener.write() = Some(listener);
    }

    pub fn clear_listener(&self) {
        *self.listener.write() = None;
    }

    /// Refuse further write handles. Reads keep working.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Wait for the lock and bind a read handle to the published tree.
    pub async fn acquire_read(&self) -> SnapshotHandle<'_> {
        let lock = self.lock.lock().await;
        trace!("Snapshot read lock acquired");
        SnapshotHandle {
            guard: self,
            _lock: lock,
            mode: Mode::Read(self.published()),
        }
    }

    /// Wait for the lock and bind a write handle to a private copy of the
    /// published tree.
    pub async fn acquire_write(&self, auto_commit: bool) -> Result<SnapshotHandle<'_>> {
        self.ensure_open()?;
        let lock = self.lock.lock().await;
        // Re-check: close() may have raced with the wait.
        self.ensure_open()?;
        trace!(auto_commit, "Snapshot write lock acquired");
        Ok(SnapshotHandle {
            guard: self,
            _lock: lock,
            mode: Mode::Write {
                tree: Tree::clone(&self.published()),
                auto_commit,
                committed: false,
            },
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(CacheError::InvalidState("snapshot guard is closed to writers".into()));
        }
        Ok(())
    }

    fn publish(&self, tree: Arc<Tree>, register_change: bool) -> u64 {
        let nodes = tree.len();
        *self.published.write() = tree.clone();
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;

        crate::metrics::record_commit(register_change);
        crate::metrics::set_tree_nodes(nodes);
        crate::metrics::set_generation(generation);
        debug!(generation, nodes, register_change, document = %tree.document_id(), "Published new tree");

        if register_change {
            let listener = self.listener.read().clone();
            if let Some(listener) = listener {
                listener.committed(&tree, generation);
            }
        }
        generation
    }
}

enum Mode {
    Read(Arc<Tree>),
    Write {
        tree: Tree,
        auto_commit: bool,
        committed: bool,
    },
}

/// Exclusive handle on the guard, in read or write mode.
///
/// Dropping a write handle created with `auto_commit` that was never
/// committed commits it (registering the change). The lock is always
/// released on drop.
pub struct SnapshotHandle<'a> {
    guard: &'a SnapshotGuard,
    _lock: MutexGuard<'a, ()>,
    mode: Mode,
}

impl<'a> SnapshotHandle<'a> {
    /// The tree this handle is bound to.
    #[must_use]
    pub fn tree(&self) -> &Tree {
        match &self.mode {
            Mode::Read(tree) => tree,
            Mode::Write { tree, .. } => tree,
        }
    }

    #[must_use]
    pub fn is_writer(&self) -> bool {
        matches!(self.mode, Mode::Write { .. })
    }

    /// Mutable access to the private copy. Fails on a read handle.
    pub fn tree_mut(&mut self) -> Result<&mut Tree> {
        match &mut self.mode {
            Mode::Write { tree, .. } => Ok(tree),
            Mode::Read(_) => Err(CacheError::InvalidState(
                "cannot mutate the tree through a read handle".into(),
            )),
        }
    }

    /// Replace the private copy wholesale (e.g. with a reloaded tree).
    pub fn replace(&mut self, replacement: Tree) -> Result<()> {
        *self.tree_mut()? = replacement;
        Ok(())
    }

    /// Turn a read handle into a write handle, cloning the tree now.
    ///
    /// Fails if the handle already writes.
    pub fn upgrade(&mut self, auto_commit: bool) -> Result<()> {
        let Mode::Read(tree) = &self.mode else {
            return Err(CacheError::InvalidState("handle already holds the write lock".into()));
        };
        self.guard.ensure_open()?;
        let tree = Tree::clone(tree);
        self.mode = Mode::Write {
            tree,
            auto_commit,
            committed: false,
        };
        trace!(auto_commit, "Snapshot handle upgraded to write");
        Ok(())
    }

    /// Publish the private copy. Returns the new generation.
    ///
    /// The handle keeps its copy and may be committed again after further
    /// changes.
    pub fn commit(&mut self, register_change: bool) -> Result<u64> {
        let guard = self.guard;
        match &mut self.mode {
            Mode::Write { tree, committed, .. } => {
                *committed = true;
                Ok(guard.publish(Arc::new(tree.clone()), register_change))
            }
            Mode::Read(_) => Err(CacheError::InvalidState("cannot commit a read handle".into())),
        }
    }
}

impl Drop for SnapshotHandle<'_> {
    fn drop(&mut self) {
        let guard = self.guard;
        if let Mode::Write { tree, auto_commit: true, committed: false } = &mut self.mode {
            let tree = std::mem::take(tree);
            guard.publish(Arc::new(tree), true);
        }
    }
}
