// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Cache lifecycle: start, stale-file reload, shutdown.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{CacheError, Result};
use crate::persistence::Persister;

use super::{CacheState, ContentCache};

impl ContentCache {
    /// Load the tree and start serving.
    ///
    /// Startup flow:
    /// 1. Load from the durable file, or rebuild from the store
    /// 2. Start the persister (if enabled and still the file owner)
    /// 3. Commit the loaded tree; a rebuild is registered so it gets written
    /// 4. Ready
    ///
    /// Concurrent callers wait on the same initialization. A store failure
    /// is not an error: the cache starts empty. Once started, further calls
    /// are no-ops; a cache shut down before or during startup fails with
    /// `InvalidState`.
    #[tracing::instrument(skip(self), fields(path = %self.config.content_file.display()))]
    pub async fn start(&self) -> Result<()> {
        self.init.get_or_try_init(|| self.initialize()).await?;
        Ok(())
    }

    async fn initialize(&self) -> Result<()> {
        let state = self.state();
        if state != CacheState::Created {
            return Err(CacheError::InvalidState(format!("cannot start a cache in state {state}")));
        }

        let startup_start = Instant::now();
        info!("Starting content cache...");
        let _ = self.state.send(CacheState::Loading);

        let outcome = self.loader.load().await;

        // Fails if shutdown() closed the guard while loading. Once held,
        // shutdown() waits for this handle before stopping the persister.
        let mut handle = match self.guard.acquire_write(false).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!(error = %e, "Shut down while loading, not serving");
                return Err(e);
            }
        };

        if self.config.persist_enabled {
            let persister = Arc::new(Persister::start(
                self.config.content_file.clone(),
                self.clock.clone(),
                self.config.persist_debounce(),
                self.config.persist_max_wait(),
            ));
            if self.ownership_released.load(Ordering::Acquire) {
                persister.release_ownership();
            }
            self.guard.set_listener(persister.clone());
            *self.persister.write() = Some(persister);
        }

        handle.replace(outcome.tree.unwrap_or_default())?;
        let generation = handle.commit(outcome.register_change)?;
        let nodes = handle.tree().len();

        // A concurrent shutdown() already moved the state on; keep it.
        let ready = self.state.send_if_modified(|state| {
            if *state == CacheState::Loading {
                *state = CacheState::Ready;
                true
            } else {
                false
            }
        });
        drop(handle);
        if !ready {
            return Err(CacheError::InvalidState("cache shut down during startup".into()));
        }

        info!(
            source = %outcome.source,
            nodes,
            generation,
            duration_ms = startup_start.elapsed().as_millis() as u64,
            "Content cache ready"
        );
        Ok(())
    }

    /// Flush the pending file write and stop the persister.
    ///
    /// Waits for an in-flight writer, then refuses further writes. Reads
    /// keep returning the last published tree. Idempotent.
    #[tracing::instrument(skip(self))]
    pub async fn shutdown(&self) {
        let state = self.state();
        if matches!(state, CacheState::ShuttingDown | CacheState::Stopped) {
            return;
        }

        let shutdown_start = Instant::now();
        info!("Initiating content cache shutdown...");
        let _ = self.state.send(CacheState::ShuttingDown);

        self.guard.close();
        // Let the current writer (if any) finish its commit.
        drop(self.guard.acquire_read().await);
        self.guard.clear_listener();

        let persister = self.persister.write().take();
        if let Some(persister) = persister {
            persister.shutdown().await;
        }

        let _ = self.state.send(CacheState::Stopped);
        info!(
            duration_ms = shutdown_start.elapsed().as_millis() as u64,
            "Content cache shutdown complete"
        );
    }

    /// Reload the tree if another process rewrote the durable file.
    ///
    /// Rate-limited by the staleness monitor; at most one caller per check
    /// interval pays for the file stat, and the reload is re-checked under
    /// the write lock so racing readers reload once.
    pub(super) async fn sync_if_stale(&self) {
        if !self.is_ready() || !self.monitor.poll().await {
            return;
        }

        let mut handle = match self.guard.acquire_write(false).await {
            Ok(handle) => handle,
            Err(e) => {
                debug!(error = %e, "Skipping stale reload");
                return;
            }
        };
        if !self.monitor.is_stale().await {
            return;
        }

        let outcome = self.loader.load().await;
        let Some(tree) = outcome.tree else {
            warn!("Stale reload produced no tree, keeping the current one");
            return;
        };

        let committed = handle
            .replace(tree)
            .and_then(|()| handle.commit(outcome.register_change));
        match committed {
            Ok(generation) => {
                self.monitor.record_reload();
                debug!(generation, source = %outcome.source, "Stale reload committed");
            }
            Err(e) => warn!(error = %e, "Stale reload could not be committed"),
        }
    }
}
