// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error taxonomy for the content cache.
//!
//! Only [`CacheError::InconsistentInput`] and [`CacheError::InvalidState`]
//! ever reach callers of public operations. The other variants are produced
//! below the guard boundary, logged, and absorbed.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    /// Arguments disagree with the node they describe (caller bug).
    #[error("Inconsistent input: {argument} argument is {expected} but node carries {actual}")]
    InconsistentInput {
        argument: &'static str,
        expected: i64,
        actual: i64,
    },

    /// The authoritative store could not produce rows.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// The durable file exists but cannot be parsed back into a tree.
    #[error("Corrupt snapshot at {path}: {reason}")]
    CorruptSnapshot { path: PathBuf, reason: String },

    /// Saving the tree to the durable file failed.
    #[error("Persistence failure: {0}")]
    Persistence(String),

    /// Lock protocol misuse (programming error).
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CacheError {
    /// Short label used for the error metric.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InconsistentInput { .. } => "inconsistent_input",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::CorruptSnapshot { .. } => "corrupt_snapshot",
            Self::Persistence(_) => "persistence",
            Self::InvalidState(_) => "invalid_state",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
        }
    }
}

pub type Result<T, E = CacheError> = std::result::Result<T, E>;
