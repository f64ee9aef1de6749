// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Durable file format for the content tree.
//!
//! The file is a JSON document with the schema declaration and the nodes in
//! depth-first order (parents before children, siblings in order):
//!
//! ```json
//! {
//!   "version": 1,
//!   "schema": { "types": { "page": ["id", "level", "parentId", "sortOrder"] } },
//!   "nodes": [
//!     { "id": 1, "parentId": -1, "level": 1, "sortOrder": 0, "contentType": "page" }
//!   ]
//! }
//! ```
//!
//! Nodes are kept flat so that deep trees never hit parser recursion limits;
//! reading reassembles them with the [`HierarchyIndex`].
//!
//! Writes go to a temporary file in the target directory which is then
//! renamed over the target, so readers in other processes never observe a
//! half-written file.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{CacheError, Result};
use crate::tree::{ContentNode, HierarchyIndex, Schema, Tree};

/// Current file format version.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Serialize)]
struct TreeFileOut<'a> {
    version: u32,
    schema: &'a Schema,
    nodes: Vec<&'a ContentNode>,
}

#[derive(Deserialize)]
struct TreeFileIn {
    version: u32,
    #[serde(default)]
    schema: Schema,
    nodes: Vec<ContentNode>,
}

/// Serialize a tree to the durable format.
pub fn encode(tree: &Tree) -> Result<Vec<u8>> {
    let out = TreeFileOut {
        version: FORMAT_VERSION,
        schema: tree.schema(),
        nodes: tree.depth_first(),
    };
    Ok(serde_json::to_vec(&out)?)
}

/// Parse the durable format back into a tree.
///
/// Fails on malformed JSON, an unknown version, or nodes that do not hang
/// off the root (a consistent save never produces those).
pub fn decode(bytes: &[u8]) -> std::result::Result<Tree, String> {
    let file: TreeFileIn = serde_json::from_slice(bytes).map_err(|e| e.to_string())?;
    if file.version != FORMAT_VERSION {
        return Err(format!("unsupported format version {}", file.version));
    }

    let mut index = HierarchyIndex::new();
    for node in file.nodes {
        index.insert_declared(node);
    }
    let assembly = index.assemble(file.schema);
    if assembly.orphaned > 0 || assembly.duplicates > 0 {
        return Err(format!(
            "{} unreachable and {} duplicate nodes",
            assembly.orphaned, assembly.duplicates
        ));
    }
    Ok(assembly.tree)
}

/// A tree read from disk, with the file's modification time at read.
#[derive(Debug)]
pub struct FileSnapshot {
    pub tree: Tree,
    pub modified: Option<SystemTime>,
}

/// Read the tree from `path`.
///
/// A missing file is `Ok(None)`. A file that cannot be parsed is deleted
/// and reported as [`CacheError::CorruptSnapshot`].
pub fn read_tree(path: &Path) -> Result<Option<FileSnapshot>> {
    let modified = modified(path);
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    match decode(&bytes) {
        Ok(tree) => {
            debug!(path = %path.display(), nodes = tree.len(), bytes = bytes.len(), "Read content file");
            Ok(Some(FileSnapshot { tree, modified }))
        }
        Err(reason) => {
            if let Err(e) = fs::remove_file(path) {
                warn!(path = %path.display(), error = %e, "Failed to delete corrupt content file");
            }
            Err(CacheError::CorruptSnapshot {
                path: path.to_path_buf(),
                reason,
            })
        }
    }
}

/// Outcome of a successful [`write_tree`].
#[derive(Debug, Clone, Copy)]
pub struct WriteReport {
    pub bytes: usize,
    pub modified: Option<SystemTime>,
}

/// Atomically replace `path` with the serialized tree.
///
/// On any failure the target is removed rather than left in an unknown
/// state, and the error is reported as [`CacheError::Persistence`].
pub fn write_tree(path: &Path, tree: &Tree) -> Result<WriteReport> {
    match write_atomic(path, tree) {
        Ok(report) => Ok(report),
        Err(e) => {
            match fs::remove_file(path) {
                Ok(()) => debug!(path = %path.display(), "Removed content file after failed write"),
                Err(rm) if rm.kind() == ErrorKind::NotFound => {}
                Err(rm) => warn!(path = %path.display(), error = %rm, "Failed to remove content file"),
            }
            Err(CacheError::Persistence(format!("{}: {}", path.display(), e)))
        }
    }
}

fn write_atomic(path: &Path, tree: &Tree) -> Result<WriteReport> {
    let bytes = encode(tree)?;
    let dir = parent_dir(path);
    fs::create_dir_all(&dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
    tmp.write_all(&bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;

    Ok(WriteReport {
        bytes: bytes.len(),
        modified: modified(path),
    })
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Last modification time of `path`, `None` if it does not exist.
#[must_use]
pub fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Remembers the modification time of the content file the last time this
/// process read or wrote it.
#[derive(Debug, Default)]
pub struct FileClock {
    last_sync: Mutex<Option<SystemTime>>,
}

impl FileClock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, modified: Option<SystemTime>) {
        if let Some(t) = modified {
            *self.last_sync.lock() = Some(t);
        }
    }

    #[must_use]
    pub fn last_sync(&self) -> Option<SystemTime> {
        *self.last_sync.lock()
    }

    /// Whether a file modified at `modified` is one this process has not
    /// seen yet.
    #[must_use]
    pub fn is_newer(&self, modified: SystemTime) -> bool {
        self.last_sync().map_or(true, |seen| modified > seen)
    }
}
