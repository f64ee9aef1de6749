// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Request-scoped snapshot pinning.
//!
//! A [`ReadContext`] is created at the start of a unit of work (a request)
//! and passed explicitly to read calls. The first read pins the published
//! tree; every later read in the same context sees that same tree, even if
//! writers commit in between.

use std::sync::Arc;

use crate::tree::Tree;

#[derive(Debug, Default)]
pub struct ReadContext {
    pinned: Option<Arc<Tree>>,
}

impl ReadContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The pinned tree, if any read happened yet.
    #[must_use]
    pub fn pinned(&self) -> Option<&Arc<Tree>> {
        self.pinned.as_ref()
    }

    #[must_use]
    pub fn is_pinned(&self) -> bool {
        self.pinned.is_some()
    }

    /// Return the pinned tree, pinning `current()` on first use.
    pub fn pin_with(&mut self, current: impl FnOnce() -> Arc<Tree>) -> Arc<Tree> {
        self.pinned.get_or_insert_with(current).clone()
    }

    /// Drop the pin; the next read pins whatever is current then.
    pub fn release(&mut self) {
        self.pinned = None;
    }
}
