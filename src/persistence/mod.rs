// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Durable file format and the debounced background writer.

pub mod file;
pub mod persister;

pub use file::{FileClock, FileSnapshot, WriteReport, FORMAT_VERSION};
pub use persister::{Persister, PersisterStats};
