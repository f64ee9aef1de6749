// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Debounced background writer for the durable content file.
//!
//! Commits call [`Persister::touch`] with the tree they published. The
//! request lands in a single-slot `watch` channel, so a burst of commits
//! collapses into one pending tree (the latest). A dedicated task waits for
//! a quiet period of `debounce` after the last touch, bounded by `max_wait`
//! from the first one, then writes the pending tree.
//!
//! ```text
//!  touch ─┐  touch ─┐          touch ─┐
//!         ▼         ▼                 ▼
//!  slot: [T1] ──► [T2] ─(debounce)─► write T2   [T3] ─(debounce)─► write T3
//! ```
//!
//! Write failures are logged and counted, never propagated: the in-memory
//! cache stays authoritative and the next start rebuilds from the store.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

use super::file::{self, FileClock};
use crate::snapshot::CommitListener;
use crate::tree::Tree;

/// Persister counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersisterStats {
    /// Successful file writes
    pub saves: u64,
    /// Failed file writes
    pub failures: u64,
    /// Accepted touch requests
    pub requests: u64,
    /// Whether a tree is waiting to be written
    pub pending: bool,
    /// Whether this process still owns the file
    pub owner: bool,
}

struct Shared {
    path: PathBuf,
    clock: Arc<FileClock>,
    pending: watch::Sender<Option<Arc<Tree>>>,
    owner: AtomicBool,
    stopped: AtomicBool,
    // Worker and save_now() never write concurrently.
    write_lock: tokio::sync::Mutex<()>,
    saves: AtomicU64,
    failures: AtomicU64,
    requests: AtomicU64,
}

impl Shared {
    fn take_pending(&self) -> Option<Arc<Tree>> {
        let mut taken = None;
        // Emptying the slot is not a new request: do not wake the worker.
        self.pending.send_if_modified(|slot| {
            taken = slot.take();
            false
        });
        taken
    }

    fn has_pending(&self) -> bool {
        self.pending.borrow().is_some()
    }

    /// Write the pending tree, if any.
    ///
    /// The slot is emptied only once the write lock is held, so a writer
    /// that waited never overwrites a newer file with an older tree.
    async fn save_pending(&self) -> bool {
        if !self.owner.load(Ordering::Acquire) {
            debug!(path = %self.path.display(), "Skipping save, file ownership released");
            return false;
        }

        let _serial = self.write_lock.lock().await;
        let Some(tree) = self.take_pending() else {
            return false;
        };
        let start = Instant::now();
        let path = self.path.clone();
        let nodes = tree.len();
        let result = tokio::task::spawn_blocking(move || file::write_tree(&path, &tree)).await;

        match result {
            Ok(Ok(report)) => {
                self.clock.record(report.modified);
                self.saves.fetch_add(1, Ordering::Relaxed);
                crate::metrics::record_persist("success", start.elapsed());
                crate::metrics::record_persist_bytes(report.bytes);
                info!(
                    path = %self.path.display(),
                    nodes,
                    bytes = report.bytes,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Content file saved"
                );
                true
            }
            Ok(Err(e)) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                crate::metrics::record_persist("error", start.elapsed());
                crate::metrics::record_error("persister", "save", e.kind());
                warn!(path = %self.path.display(), error = %e, "Content file save failed");
                false
            }
            Err(join) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                crate::metrics::record_persist("error", start.elapsed());
                crate::metrics::record_error("persister", "save", "join");
                error!(path = %self.path.display(), error = %join, "Content file save task failed");
                false
            }
        }
    }
}

/// Background writer for the content file.
///
/// Must be started inside a tokio runtime.
pub struct Persister {
    shared: Arc<Shared>,
    shutdown: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Persister {
    /// Spawn the worker task.
    ///
    /// `max_wait` is raised to `debounce` if shorter.
    pub fn start(
        path: impl Into<PathBuf>,
        clock: Arc<FileClock>,
        debounce: Duration,
        max_wait: Duration,
    ) -> Self {
        let (pending, pending_rx) = watch::channel(None);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let shared = Arc::new(Shared {
            path: path.into(),
            clock,
            pending,
            owner: AtomicBool::new(true),
            stopped: AtomicBool::new(false),
            write_lock: tokio::sync::Mutex::new(()),
            saves: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            requests: AtomicU64::new(0),
        });

        let max_wait = max_wait.max(debounce);
        let worker = tokio::spawn(run(shared.clone(), pending_rx, shutdown_rx, debounce, max_wait));
        crate::metrics::set_file_owner(true);
        info!(
            path = %shared.path.display(),
            debounce_ms = debounce.as_millis() as u64,
            max_wait_ms = max_wait.as_millis() as u64,
            "Persister started"
        );

        Self {
            shared,
            shutdown,
            worker: Mutex::new(Some(worker)),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    /// Schedule a save of `tree`, replacing any pending one.
    ///
    /// Returns `false` when the request is refused (ownership released or
    /// persister stopped).
    pub fn touch(&self, tree: Arc<Tree>) -> bool {
        let shared = &self.shared;
        if shared.stopped.load(Ordering::Acquire) || !shared.owner.load(Ordering::Acquire) {
            crate::metrics::record_touch(false);
            debug!("Save request refused");
            return false;
        }
        shared.pending.send_replace(Some(tree));
        shared.requests.fetch_add(1, Ordering::Relaxed);
        crate::metrics::record_touch(true);
        true
    }

    /// Write the pending tree immediately, if any.
    ///
    /// Returns whether a file was written.
    pub async fn save_now(&self) -> bool {
        self.shared.save_pending().await
    }

    /// Give up the file: drop the pending request and refuse new ones.
    ///
    /// Used when another process takes over writing the file.
    pub fn release_ownership(&self) {
        if self.shared.owner.swap(false, Ordering::AcqRel) {
            let dropped = self.shared.take_pending().is_some();
            crate::metrics::set_file_owner(false);
            info!(path = %self.shared.path.display(), dropped_pending = dropped, "Released content file ownership");
        }
    }

    #[must_use]
    pub fn is_owner(&self) -> bool {
        self.shared.owner.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.shared.stopped.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn stats(&self) -> PersisterStats {
        let shared = &self.shared;
        PersisterStats {
            saves: shared.saves.load(Ordering::Relaxed),
            failures: shared.failures.load(Ordering::Relaxed),
            requests: shared.requests.load(Ordering::Relaxed),
            pending: shared.has_pending(),
            owner: self.is_owner(),
        }
    }

    /// Stop the worker and flush the pending request. Idempotent.
    pub async fn shutdown(&self) {
        if self.shared.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.shutdown.send(true);

        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                error!(error = %e, "Persister worker panicked");
            }
        }

        let flushed = self.save_now().await;
        info!(flushed, "Persister stopped");
    }
}

impl CommitListener for Persister {
    fn committed(&self, tree: &Arc<Tree>, generation: u64) {
        if self.touch(tree.clone()) {
            debug!(generation, "Scheduled content file save");
        }
    }
}

impl Drop for Persister {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.get_mut().take() {
            worker.abort();
        }
    }
}

async fn run(
    shared: Arc<Shared>,
    mut requests: watch::Receiver<Option<Arc<Tree>>>,
    mut shutdown: watch::Receiver<bool>,
    debounce: Duration,
    max_wait: Duration,
) {
    loop {
        tokio::select! {
            changed = requests.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = shutdown.changed() => break,
        }
        if !shared.has_pending() {
            continue;
        }

        let first = Instant::now();
        let hard_deadline = first + max_wait;
        let mut deadline = first + debounce;
        loop {
            tokio::select! {
                _ = sleep_until(deadline.min(hard_deadline)) => break,
                changed = requests.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    deadline = Instant::now() + debounce;
                }
                // shutdown() flushes whatever is still pending
                _ = shutdown.changed() => return,
            }
        }

        shared.save_pending().await;
    }
    debug!("Persister worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{merge, ContentNode, ROOT_ID};

    fn tree_with(ids: &[i32]) -> Arc<Tree> {
        let mut tree = Tree::new();
        for &id in ids {
            let node = ContentNode::new(id, ROOT_ID, "page").with_sort_order(id);
            merge::upsert_in_place(&mut tree, id, 1, ROOT_ID, node).unwrap();
        }
        Arc::new(tree)
    }

    fn read_back(path: &Path) -> Tree {
        file::read_tree(path).unwrap().unwrap().tree
    }

    async fn wait_for(mut check: impl FnMut() -> bool) {
        for _ in 0..200 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn test_burst_collapses_into_one_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("content.json");
        let clock = Arc::new(FileClock::new());
        let persister = Persister::start(&path, clock.clone(), Duration::from_millis(40), Duration::from_secs(5));

        assert!(persister.touch(tree_with(&[1])));
        assert!(persister.touch(tree_with(&[1, 2])));
        assert!(persister.touch(tree_with(&[1, 2, 3])));

        wait_for(|| persister.stats().saves == 1).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        let stats = persister.stats();
        assert_eq!(stats.saves, 1);
        assert_eq!(stats.requests, 3);
        assert!(!stats.pending);
        assert_eq!(read_back(&path).len(), 3);
        assert_eq!(clock.last_sync(), file::modified(&path));
    }

    #[tokio::test]
    async fn test_max_wait_bounds_a_steady_stream() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("content.json");
        let persister = Persister::start(
            &path,
            Arc::new(FileClock::new()),
            Duration::from_millis(80),
            Duration::from_millis(150),
        );

        // Touches every 20ms never leave an 80ms quiet window.
        for i in 0..40 {
            persister.touch(tree_with(&[i + 1]));
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(persister.stats().saves >= 1);
    }

    #[tokio::test]
    async fn test_shutdown_flushes_pending() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("content.json");
        let persister = Persister::start(&path, Arc::new(FileClock::new()), Duration::from_secs(60), Duration::from_secs(60));

        persister.touch(tree_with(&[1, 2]));
        assert!(!path.exists());

        persister.shutdown().await;
        assert!(persister.is_stopped());
        assert_eq!(persister.stats().saves, 1);
        assert_eq!(read_back(&path).len(), 2);

        assert!(!persister.touch(tree_with(&[3])));
        persister.shutdown().await;
    }

    #[tokio::test]
    async fn test_waiting_save_writes_latest_tree() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("content.json");
        let persister = Persister::start(&path, Arc::new(FileClock::new()), Duration::from_secs(60), Duration::from_secs(60));

        persister.touch(tree_with(&[1]));
        // Another save is in flight: hold the write lock.
        let in_flight = persister.shared.write_lock.lock().await;

        let (saved, ()) = tokio::join!(persister.save_now(), async {
            persister.touch(tree_with(&[1, 2, 3]));
            drop(in_flight);
        });

        assert!(saved);
        assert_eq!(persister.stats().saves, 1);
        assert!(!persister.stats().pending);
        assert_eq!(read_back(&path).len(), 3);
        persister.shutdown().await;
        assert_eq!(persister.stats().saves, 1);
    }

    #[tokio::test]
    async fn test_release_ownership_drops_pending_and_refuses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("content.json");
        let persister = Persister::start(&path, Arc::new(FileClock::new()), Duration::from_millis(30), Duration::from_millis(30));

        persister.touch(tree_with(&[1]));
        persister.release_ownership();
        assert!(!persister.is_owner());
        assert!(!persister.touch(tree_with(&[2])));

        tokio::time::sleep(Duration::from_millis(100)).await;
        persister.shutdown().await;
        assert!(!path.exists());
        assert_eq!(persister.stats().saves, 0);
    }

    #[tokio::test]
    async fn test_failed_write_is_counted_not_propagated() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let persister = Persister::start(
            blocker.join("content.json"),
            Arc::new(FileClock::new()),
            Duration::from_secs(60),
            Duration::from_secs(60),
        );

        persister.touch(tree_with(&[1]));
        assert!(!persister.save_now().await);
        assert_eq!(persister.stats().failures, 1);

        // Still accepts work after a failure.
        assert!(persister.touch(tree_with(&[1, 2])));
        persister.shutdown().await;
        assert_eq!(persister.stats().failures, 2);
    }

    #[tokio::test]
    async fn test_commit_listener_schedules_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("content.json");
        let persister = Arc::new(Persister::start(
            &path,
            Arc::new(FileClock::new()),
            Duration::from_millis(20),
            Duration::from_millis(20),
        ));
        let guard = crate::snapshot::SnapshotGuard::new(Tree::new());
        guard.set_listener(persister.clone());

        {
            let mut handle = guard.acquire_write(false).await.unwrap();
            let node = ContentNode::new(9, ROOT_ID, "page");
            merge::upsert_in_place(handle.tree_mut().unwrap(), 9, 1, ROOT_ID, node).unwrap();
            handle.commit(false).unwrap();
        }
        assert_eq!(persister.stats().requests, 0);

        {
            let mut handle = guard.acquire_write(true).await.unwrap();
            let node = ContentNode::new(10, ROOT_ID, "page");
            merge::upsert_in_place(handle.tree_mut().unwrap(), 10, 1, ROOT_ID, node).unwrap();
        }
        wait_for(|| persister.stats().saves == 1).await;
        assert_eq!(read_back(&path).children(ROOT_ID), &[9, 10]);
    }
}
