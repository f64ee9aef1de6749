// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for the content cache.
//!
//! # Example
//!
//! ```
//! use content_cache::CacheConfig;
//!
//! // Minimal config (uses defaults)
//! let config = CacheConfig::default();
//! assert!(config.file_cache_enabled);
//! assert_eq!(config.sync_check_interval_ms, 1000);
//!
//! // Memory-only cache, rebuilt from the store on every start
//! let config = CacheConfig {
//!     file_cache_enabled: false,
//!     persist_enabled: false,
//!     ..Default::default()
//! };
//! assert!(!config.uses_file());
//! ```

use std::path::PathBuf;
use std::time::Duration;
use serde::Deserialize;

/// Configuration for the content cache.
///
/// All fields have sensible defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Durable file holding the serialized tree
    #[serde(default = "default_content_file")]
    pub content_file: PathBuf,

    /// Load the tree from `content_file` at startup when it parses
    #[serde(default = "default_true")]
    pub file_cache_enabled: bool,

    /// Write the tree back to `content_file` after commits
    #[serde(default = "default_true")]
    pub persist_enabled: bool,

    /// Quiet period after the last commit before the file is written
    #[serde(default = "default_persist_debounce_ms")]
    pub persist_debounce_ms: u64,

    /// Upper bound on how long a pending write can be postponed
    #[serde(default = "default_persist_max_wait_ms")]
    pub persist_max_wait_ms: u64,

    /// Reload when another process rewrote `content_file`
    #[serde(default)]
    pub sync_on_read: bool,

    /// Minimum time between two file modification checks
    #[serde(default = "default_sync_check_interval_ms")]
    pub sync_check_interval_ms: u64,

    /// Buffered change notifications per subscriber
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

fn default_content_file() -> PathBuf { PathBuf::from("./content-cache.json") }
fn default_true() -> bool { true }
fn default_persist_debounce_ms() -> u64 { 4_000 }
fn default_persist_max_wait_ms() -> u64 { 30_000 }
fn default_sync_check_interval_ms() -> u64 { 1_000 }
fn default_event_channel_capacity() -> usize { 256 }

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            content_file: default_content_file(),
            file_cache_enabled: default_true(),
            persist_enabled: default_true(),
            persist_debounce_ms: default_persist_debounce_ms(),
            persist_max_wait_ms: default_persist_max_wait_ms(),
            sync_on_read: false,
            sync_check_interval_ms: default_sync_check_interval_ms(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

impl CacheConfig {
    /// Whether the durable file takes part at all (read or write).
    #[must_use]
    pub fn uses_file(&self) -> bool {
        self.file_cache_enabled || self.persist_enabled
    }

    #[must_use]
    pub fn persist_debounce(&self) -> Duration {
        Duration::from_millis(self.persist_debounce_ms)
    }

    /// Never shorter than the debounce window.
    #[must_use]
    pub fn persist_max_wait(&self) -> Duration {
        Duration::from_millis(self.persist_max_wait_ms.max(self.persist_debounce_ms))
    }

    #[must_use]
    pub fn sync_check_interval(&self) -> Duration {
        Duration::from_millis(self.sync_check_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.content_file, PathBuf::from("./content-cache.json"));
        assert!(config.persist_enabled);
        assert!(!config.sync_on_read);
        assert_eq!(config.persist_debounce(), Duration::from_secs(4));
        assert_eq!(config.persist_max_wait(), Duration::from_secs(30));
    }

    #[test]
    fn test_deserialize_fills_defaults() {
        let config: CacheConfig =
            serde_json::from_str(r#"{"content_file": "/tmp/x.json", "sync_on_read": true}"#).unwrap();
        assert_eq!(config.content_file, PathBuf::from("/tmp/x.json"));
        assert!(config.sync_on_read);
        assert!(config.file_cache_enabled);
        assert_eq!(config.event_channel_capacity, 256);
    }

    #[test]
    fn test_max_wait_never_below_debounce() {
        let config = CacheConfig {
            persist_debounce_ms: 500,
            persist_max_wait_ms: 100,
            ..Default::default()
        };
        assert_eq!(config.persist_max_wait(), Duration::from_millis(500));
    }
}
