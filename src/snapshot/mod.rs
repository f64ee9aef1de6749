// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Snapshot guard and request-scoped read contexts.

pub mod guard;
pub mod context;

pub use guard::{SnapshotGuard, SnapshotHandle, CommitListener};
pub use context::ReadContext;
