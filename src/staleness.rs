// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Detects content files rewritten by another process.
//!
//! Read paths call [`StalenessMonitor::poll`]. Between checks the cost is one
//! atomic load and a subtraction. At most once per interval a single caller
//! wins the right to stat the file and compare its modification time with
//! the one recorded in the shared [`FileClock`] at this process's last read
//! or write.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::CacheConfig;
use crate::persistence::FileClock;

const NEVER: u64 = u64::MAX;

pub struct StalenessMonitor {
    path: PathBuf,
    enabled: bool,
    interval_ms: u64,
    epoch: Instant,
    /// Milliseconds since `epoch` of the last check, [`NEVER`] before the first
    last_check_ms: AtomicU64,
    clock: Arc<FileClock>,
    checks: AtomicU64,
    reloads: AtomicU64,
}

impl StalenessMonitor {
    #[must_use]
    pub fn new(config: &CacheConfig, clock: Arc<FileClock>) -> Self {
        Self::with_interval(
            config.content_file.clone(),
            // Without file loading a reload would rebuild from the store and
            // never catch up with the file's mtime.
            config.sync_on_read && config.file_cache_enabled,
            config.sync_check_interval(),
            clock,
        )
    }

    #[must_use]
    pub fn with_interval(path: PathBuf, enabled: bool, interval: Duration, clock: Arc<FileClock>) -> Self {
        Self {
            path,
            enabled,
            interval_ms: interval.as_millis() as u64,
            epoch: Instant::now(),
            last_check_ms: AtomicU64::new(NEVER),
            clock,
            checks: AtomicU64::new(0),
            reloads: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Claim the next check if the interval has elapsed.
    ///
    /// Concurrent callers race on a compare-exchange; exactly one of them
    /// gets `true` per interval.
    pub fn claim_check(&self) -> bool {
        if !self.enabled {
            return false;
        }
        let now = self.epoch.elapsed().as_millis() as u64;
        let last = self.last_check_ms.load(Ordering::Acquire);
        if last != NEVER && now.saturating_sub(last) < self.interval_ms {
            return false;
        }
        self.last_check_ms
            .compare_exchange(last, now, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Whether the file on disk is newer than what this process last saw.
    ///
    /// An absent file is never stale.
    pub async fn is_stale(&self) -> bool {
        let modified = match tokio::fs::metadata(&self.path).await.and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(_) => return false,
        };
        self.clock.is_newer(modified)
    }

    /// Rate-limited staleness check for the read path.
    pub async fn poll(&self) -> bool {
        if !self.claim_check() {
            return false;
        }
        self.checks.fetch_add(1, Ordering::Relaxed);
        let stale = self.is_stale().await;
        if stale {
            debug!(path = %self.path.display(), last_sync = ?self.clock.last_sync(), "Content file changed on disk");
        }
        stale
    }

    pub fn record_reload(&self) {
        self.reloads.fetch_add(1, Ordering::Relaxed);
        crate::metrics::record_stale_reload();
        info!(path = %self.path.display(), "Reloaded content file changed by another process");
    }

    #[must_use]
    pub fn checks(&self) -> u64 {
        self.checks.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn reloads(&self) -> u64 {
        self.reloads.load(Ordering::Relaxed)
    }
}
