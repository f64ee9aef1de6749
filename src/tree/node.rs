// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Content node data structure.
//!
//! A [`ContentNode`] is one published document in the tree: a typed node with
//! an integer id, a parent id, a level, a sort order, an open attribute bag
//! and an ordered list of named data elements. Element children are owned by
//! the [`Tree`](super::Tree) and only exposed read-only here.
//!
//! # Example
//!
//! ```
//! use content_cache::ContentNode;
//!
//! let node = ContentNode::new(1050, -1, "article")
//!     .with_sort_order(3)
//!     .with_attribute("nodeName", "Hello")
//!     .with_data("bodyText", "<p>hi</p>");
//!
//! assert_eq!(node.id, 1050);
//! assert_eq!(node.attribute("nodeName"), Some("Hello"));
//! assert_eq!(node.data("bodyText"), Some("<p>hi</p>"));
//! ```

use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};

/// Integer node identifier.
pub type NodeId = i32;

/// Id of the distinguished root node.
pub const ROOT_ID: NodeId = -1;

/// Content type alias carried by the root node.
pub const ROOT_CONTENT_TYPE: &str = "#root";

/// A named data element (property value) attached to a node.
///
/// Data elements are not children: they carry no id and always precede
/// element children in document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataElement {
    pub name: String,
    pub value: String,
}

impl DataElement {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// One node of the published content tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentNode {
    pub id: NodeId,
    pub parent_id: NodeId,
    /// Depth below the root (root children are level 1)
    #[serde(default)]
    pub level: u32,
    /// Position among siblings, ascending
    #[serde(default)]
    pub sort_order: i32,
    /// Content type alias; decides which attributes the schema allows
    pub content_type: String,
    /// Schema-agnostic attribute bag (`nodeName`, `urlName`, ...)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    /// Named data elements, in document order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data: Vec<DataElement>,

    /// Element children, ordered by sort order (maintained by the tree)
    #[serde(skip)]
    pub(crate) children: Vec<NodeId>,
}

impl ContentNode {
    /// Create a node with no attributes, no data and sort order 0.
    pub fn new(id: NodeId, parent_id: NodeId, content_type: impl Into<String>) -> Self {
        Self {
            id,
            parent_id,
            level: 0,
            sort_order: 0,
            content_type: content_type.into(),
            attributes: BTreeMap::new(),
            data: Vec::new(),
            children: Vec::new(),
        }
    }

    pub(crate) fn root() -> Self {
        Self::new(ROOT_ID, ROOT_ID, ROOT_CONTENT_TYPE)
    }

    #[must_use]
    pub fn with_sort_order(mut self, sort_order: i32) -> Self {
        self.sort_order = sort_order;
        self
    }

    #[must_use]
    pub fn with_level(mut self, level: u32) -> Self {
        self.level = level;
        self
    }

    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_data(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.push(DataElement::new(name, value));
        self
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.id == ROOT_ID
    }

    /// Look up a bag attribute.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Look up the first data element with this name.
    #[must_use]
    pub fn data(&self, name: &str) -> Option<&str> {
        self.data
            .iter()
            .find(|d| d.name == name)
            .map(|d| d.value.as_str())
    }

    /// Element children ids in sibling order.
    #[must_use]
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Attribute names carried by this node, common ones first.
    pub fn attribute_names(&self) -> impl Iterator<Item = &str> + '_ {
        super::schema::COMMON_ATTRIBUTES
            .iter()
            .copied()
            .chain(self.attributes.keys().map(String::as_str))
    }

    /// Replace attributes and data elements with those of `other`.
    ///
    /// Element children are left untouched, as are id and parent id.
    pub(crate) fn copy_content_from(&mut self, other: &ContentNode) {
        self.sort_order = other.sort_order;
        self.level = other.level;
        self.attributes = other.attributes.clone();
        self.data = other.data.clone();
    }
}
