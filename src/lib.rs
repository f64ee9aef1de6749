// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! # Content Cache
//!
//! An in-memory, tree-structured cache of published content for read-mostly
//! traffic, updated incrementally and rebuilt wholesale from a backing store.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     ContentCache (facade)                   │
//! │  • publish / sort / clear / refresh                        │
//! │  • current_snapshot() for readers                          │
//! └─────────────────────────────────────────────────────────────┘
//!          │ clone → merge → commit             ▲ Arc<Tree>
//!          ▼                                    │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       SnapshotGuard                         │
//! │  • single writer, lock-free readers                        │
//! │  • atomic swap of the published tree                       │
//! └─────────────────────────────────────────────────────────────┘
//!          │ registered commits          ▲ load / reload
//!          ▼                             │
//! ┌──────────────────────────┐   ┌──────────────────────────────┐
//! │        Persister         │   │  Loader ◄── StalenessMonitor │
//! │  • debounced file write  │   │  • file, else store rebuild  │
//! └──────────────────────────┘   └──────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use content_cache::{CacheConfig, ContentCache, ContentNode, InMemoryStore, ROOT_ID};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), content_cache::CacheError> {
//!     let store = Arc::new(InMemoryStore::new());
//!     store.put(&ContentNode::new(1, ROOT_ID, "home").with_level(1))?;
//!
//!     let cache = ContentCache::new(CacheConfig::default(), store);
//!     cache.start().await?;
//!
//!     let page = ContentNode::new(2, 1, "page").with_level(2).with_data("title", "About");
//!     cache.publish_node(page, false).await?;
//!
//!     let tree = cache.current_snapshot().await;
//!     assert_eq!(tree.children(1), &[2]);
//!
//!     cache.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`cache`]: the [`ContentCache`] facade and its lifecycle
//! - [`tree`]: the copy-on-write [`Tree`] and the [`merge`] engine
//! - [`snapshot`]: [`SnapshotGuard`] and request-scoped [`ReadContext`]
//! - [`loader`]: file-or-store loading
//! - [`persistence`]: durable file format and the debounced [`Persister`]
//! - [`staleness`]: reload when another process rewrote the file
//! - [`store`]: the [`ContentStore`] contract and [`InMemoryStore`]

pub mod config;
pub mod error;
pub mod tree;
pub mod store;
pub mod snapshot;
pub mod loader;
pub mod persistence;
pub mod staleness;
pub mod cache;
pub mod metrics;

// Note: We don't expose a `tracing` module to avoid conflict with the tracing crate

pub use tree::merge;

pub use config::CacheConfig;
pub use error::{CacheError, Result};
pub use tree::{ContentNode, DataElement, NodeId, ROOT_ID, Schema, Tree, DocumentId};
pub use store::{ContentStore, StoreRow, InMemoryStore};
pub use snapshot::{SnapshotGuard, SnapshotHandle, CommitListener, ReadContext};
pub use loader::{Loader, LoadOutcome, LoadSource};
pub use persistence::{Persister, PersisterStats, FileClock};
pub use staleness::StalenessMonitor;
pub use cache::{ContentCache, CacheState, CacheEvent, CacheStats};
pub use metrics::LatencyTimer;
