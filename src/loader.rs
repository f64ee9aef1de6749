// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Produces the initial (or reloaded) tree.
//!
//! Preference order:
//!
//! 1. The durable file, when file caching is enabled and it parses.
//! 2. A full rebuild from the store's published rows.
//! 3. Nothing: the store failed too; callers publish an empty tree.
//!
//! A file load is not a change (the file already holds it); a rebuild is,
//! so it is registered and the persister writes it out.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::persistence::{file, FileClock};
use crate::store::{ContentStore, StoreRow};
use crate::tree::{HierarchyIndex, Schema, Tree, ROOT_ID};

/// Where a loaded tree came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    File,
    Store,
    /// Neither source produced a tree
    Empty,
}

impl LoadSource {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Store => "store",
            Self::Empty => "empty",
        }
    }
}

impl std::fmt::Display for LoadSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub struct LoadOutcome {
    pub tree: Option<Tree>,
    /// Whether committing this tree should schedule a file write
    pub register_change: bool,
    pub source: LoadSource,
}

impl LoadOutcome {
    fn empty() -> Self {
        Self {
            tree: None,
            register_change: false,
            source: LoadSource::Empty,
        }
    }
}

pub struct Loader {
    store: Arc<dyn ContentStore>,
    path: PathBuf,
    file_enabled: bool,
    clock: Arc<FileClock>,
}

impl Loader {
    #[must_use]
    pub fn new(store: Arc<dyn ContentStore>, config: &CacheConfig, clock: Arc<FileClock>) -> Self {
        Self {
            store,
            path: config.content_file.clone(),
            file_enabled: config.file_cache_enabled,
            clock,
        }
    }

    /// Load from the file if possible, else rebuild from the store.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub async fn load(&self) -> LoadOutcome {
        if self.file_enabled {
            let start = Instant::now();
            match self.read_file().await {
                Ok(Some(tree)) => {
                    crate::metrics::record_load(LoadSource::File.as_str(), start.elapsed());
                    info!(nodes = tree.len(), "Loaded content tree from file");
                    return LoadOutcome {
                        tree: Some(tree),
                        register_change: false,
                        source: LoadSource::File,
                    };
                }
                Ok(None) => debug!("No content file, rebuilding from store"),
                Err(e) => {
                    crate::metrics::record_error("loader", "read_file", e.kind());
                    warn!(error = %e, "Content file unusable, rebuilding from store");
                }
            }
        }
        self.rebuild().await
    }

    /// Full rebuild from the store, ignoring the file.
    #[instrument(skip(self))]
    pub async fn rebuild(&self) -> LoadOutcome {
        let start = Instant::now();
        match self.build_from_store().await {
            Ok(tree) => {
                crate::metrics::record_load(LoadSource::Store.as_str(), start.elapsed());
                info!(
                    nodes = tree.len(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Rebuilt content tree from store"
                );
                LoadOutcome {
                    tree: Some(tree),
                    register_change: true,
                    source: LoadSource::Store,
                }
            }
            Err(e) => {
                crate::metrics::record_load(LoadSource::Empty.as_str(), start.elapsed());
                crate::metrics::record_error("loader", "rebuild", e.kind());
                error!(error = %e, "Store rebuild failed, no content available");
                LoadOutcome::empty()
            }
        }
    }

    async fn read_file(&self) -> Result<Option<Tree>> {
        let path = self.path.clone();
        let snapshot = tokio::task::spawn_blocking(move || file::read_tree(&path))
            .await
            .map_err(|e| CacheError::Io(std::io::Error::other(e)))??;

        Ok(snapshot.map(|s| {
            self.clock.record(s.modified);
            s.tree
        }))
    }

    async fn build_from_store(&self) -> Result<Tree> {
        let rows = self.store.published_rows().await?;
        Ok(assemble_rows(rows))
    }
}

/// Assemble store rows (ordered by level, then sort order) into a tree.
///
/// Level-1 rows hang off the root whatever parent they carry. Rows with an
/// unparsable payload or no published parent are dropped with a warning.
pub fn assemble_rows(rows: Vec<StoreRow>) -> Tree {
    let total = rows.len();
    let mut index = HierarchyIndex::new();
    let mut unparsable = 0usize;

    for row in rows {
        match row.parse() {
            Ok(node) => {
                let parent = if row.level == 1 { ROOT_ID } else { row.parent_id };
                index.insert(parent, node);
            }
            Err(e) => {
                unparsable += 1;
                warn!(id = row.id, error = %e, "Skipping row with unparsable payload");
            }
        }
    }

    let assembly = index.assemble(Schema::new());
    if unparsable > 0 {
        crate::metrics::record_dropped_rows("unparsable", unparsable);
    }
    if assembly.orphaned > 0 {
        crate::metrics::record_dropped_rows("orphaned", assembly.orphaned);
    }
    if assembly.duplicates > 0 {
        crate::metrics::record_dropped_rows("duplicate", assembly.duplicates);
    }
    debug!(
        rows = total,
        nodes = assembly.tree.len(),
        unparsable,
        orphaned = assembly.orphaned,
        "Assembled rows"
    );
    assembly.tree
}
