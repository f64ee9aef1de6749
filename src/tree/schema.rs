// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Content-type schema declaration.
//!
//! The schema records, per content-type alias, which attributes are legal on
//! nodes of that type. A declaration attached to a tree is immutable; unseen
//! types are added by building an extended copy (see
//! [`Tree::with_extended_schema`](super::Tree::with_extended_schema)).

use std::collections::{BTreeMap, BTreeSet};
use serde::{Deserialize, Serialize};

use super::node::ContentNode;

/// Attributes every declared content type allows.
pub const COMMON_ATTRIBUTES: [&str; 4] = ["id", "parentId", "level", "sortOrder"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    types: BTreeMap<String, BTreeSet<String>>,
}

impl Schema {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether this content type has been declared.
    #[must_use]
    pub fn knows(&self, content_type: &str) -> bool {
        self.types.contains_key(content_type)
    }

    /// Whether `attribute` is legal on nodes of `content_type`.
    ///
    /// Undeclared types allow nothing.
    #[must_use]
    pub fn is_legal(&self, content_type: &str, attribute: &str) -> bool {
        self.types
            .get(content_type)
            .is_some_and(|attrs| attrs.contains(attribute))
    }

    /// Declare the node's content type with every attribute it carries.
    ///
    /// Returns `false` when the type was already declared; existing
    /// declarations are never narrowed or widened.
    pub fn declare(&mut self, node: &ContentNode) -> bool {
        if self.knows(&node.content_type) {
            return false;
        }
        let attrs = node.attribute_names().map(str::to_string).collect();
        self.types.insert(node.content_type.clone(), attrs);
        true
    }

    /// Copy of this schema with the node's type declared.
    #[must_use]
    pub fn extended_with(&self, node: &ContentNode) -> Self {
        let mut extended = self.clone();
        extended.declare(node);
        extended
    }

    /// Declared content-type aliases, sorted.
    pub fn content_types(&self) -> impl Iterator<Item = &str> + '_ {
        self.types.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
