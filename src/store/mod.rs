// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Authoritative store contract and an in-memory implementation.

pub mod traits;
pub mod memory;

pub use traits::{ContentStore, StoreRow};
pub use memory::InMemoryStore;
