// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The published-content tree.
//!
//! - [`node`]: the [`ContentNode`] value and its data elements
//! - [`schema`]: per-content-type attribute declarations
//! - [`document`]: the copy-on-write [`Tree`]
//! - [`hierarchy`]: flat rows → tree assembly
//! - [`merge`]: single-node insert/update/move/reorder

pub mod node;
pub mod schema;
pub mod document;
pub mod hierarchy;
pub mod merge;

pub use node::{ContentNode, DataElement, NodeId, ROOT_ID, ROOT_CONTENT_TYPE};
pub use schema::{Schema, COMMON_ATTRIBUTES};
pub use document::{Tree, DocumentId};
pub use hierarchy::{HierarchyIndex, Assembly};
