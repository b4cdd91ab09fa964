//! Node records of the document tree.
//!
//! Every revision stores its document as a first-child/right-sibling tree
//! of [`Node`] records keyed by [`NodeKey`]. The JSON and XML node kinds
//! share one record layout; which kinds may appear where is decided by the
//! resource's [`NodeFactory`].

mod factory;

pub use factory::{JsonNodeFactory, NodeFactory, XmlNodeFactory};
pub(crate) use factory::factory_for;

use crate::config::ResourceKind;
use crate::types::{NodeKey, PathNodeKey};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// The document root present in every revision.
    Document,
    /// JSON object.
    JsonObject,
    /// JSON array.
    JsonArray,
    /// Key of a JSON object member; its single child is the member value.
    JsonObjectKey,
    /// JSON string value.
    JsonString,
    /// JSON number value.
    JsonNumber,
    /// JSON boolean value.
    JsonBoolean,
    /// JSON null.
    JsonNull,
    /// XML element.
    XmlElement,
    /// XML attribute.
    XmlAttribute,
    /// XML text node.
    XmlText,
    /// XML comment.
    XmlComment,
    /// XML processing instruction; the name is the target.
    XmlProcessingInstruction,
}

impl NodeKind {
    /// Returns the document model this kind belongs to, `None` for the
    /// document root.
    #[must_use]
    pub const fn resource_kind(self) -> Option<ResourceKind> {
        match self {
            Self::Document => None,
            Self::JsonObject
            | Self::JsonArray
            | Self::JsonObjectKey
            | Self::JsonString
            | Self::JsonNumber
            | Self::JsonBoolean
            | Self::JsonNull => Some(ResourceKind::Json),
            Self::XmlElement
            | Self::XmlAttribute
            | Self::XmlText
            | Self::XmlComment
            | Self::XmlProcessingInstruction => Some(ResourceKind::Xml),
        }
    }

    /// Returns `true` if nodes of this kind carry a name.
    #[must_use]
    pub const fn is_named(self) -> bool {
        matches!(
            self,
            Self::JsonObjectKey
                | Self::XmlElement
                | Self::XmlAttribute
                | Self::XmlProcessingInstruction
        )
    }

    /// Returns `true` if nodes of this kind carry a value.
    #[must_use]
    pub const fn has_value(self) -> bool {
        matches!(
            self,
            Self::JsonString
                | Self::JsonNumber
                | Self::JsonBoolean
                | Self::XmlAttribute
                | Self::XmlText
                | Self::XmlComment
                | Self::XmlProcessingInstruction
        )
    }

    /// Returns `true` for JSON values that may stand alone in an array or
    /// below an object key.
    #[must_use]
    pub const fn is_json_value(self) -> bool {
        matches!(
            self,
            Self::JsonObject
                | Self::JsonArray
                | Self::JsonString
                | Self::JsonNumber
                | Self::JsonBoolean
                | Self::JsonNull
        )
    }

    /// Stable tag mixed into content hashes.
    pub(crate) const fn tag(self) -> u8 {
        match self {
            Self::Document => 0,
            Self::JsonObject => 1,
            Self::JsonArray => 2,
            Self::JsonObjectKey => 3,
            Self::JsonString => 4,
            Self::JsonNumber => 5,
            Self::JsonBoolean => 6,
            Self::JsonNull => 7,
            Self::XmlElement => 16,
            Self::XmlAttribute => 17,
            Self::XmlText => 18,
            Self::XmlComment => 19,
            Self::XmlProcessingInstruction => 20,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Document => "document",
            Self::JsonObject => "object",
            Self::JsonArray => "array",
            Self::JsonObjectKey => "object-key",
            Self::JsonString => "string",
            Self::JsonNumber => "number",
            Self::JsonBoolean => "boolean",
            Self::JsonNull => "null",
            Self::XmlElement => "element",
            Self::XmlAttribute => "attribute",
            Self::XmlText => "text",
            Self::XmlComment => "comment",
            Self::XmlProcessingInstruction => "processing-instruction",
        };
        f.write_str(name)
    }
}

/// Content of a node to insert.
///
/// Constructors exist for every insertable kind; the node factory checks
/// that the kind fits the resource and the insert position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeContent {
    pub(crate) kind: NodeKind,
    pub(crate) name: Option<String>,
    pub(crate) value: Option<String>,
}

impl NodeContent {
    fn new(kind: NodeKind, name: Option<String>, value: Option<String>) -> Self {
        Self { kind, name, value }
    }

    /// An empty JSON object.
    #[must_use]
    pub fn object() -> Self {
        Self::new(NodeKind::JsonObject, None, None)
    }

    /// An empty JSON array.
    #[must_use]
    pub fn array() -> Self {
        Self::new(NodeKind::JsonArray, None, None)
    }

    /// A JSON object key.
    #[must_use]
    pub fn object_key(name: impl Into<String>) -> Self {
        Self::new(NodeKind::JsonObjectKey, Some(name.into()), None)
    }

    /// A JSON string.
    #[must_use]
    pub fn string(value: impl Into<String>) -> Self {
        Self::new(NodeKind::JsonString, None, Some(value.into()))
    }

    /// A JSON number.
    #[must_use]
    pub fn number(value: f64) -> Self {
        Self::new(NodeKind::JsonNumber, None, Some(value.to_string()))
    }

    /// A JSON boolean.
    #[must_use]
    pub fn boolean(value: bool) -> Self {
        Self::new(NodeKind::JsonBoolean, None, Some(value.to_string()))
    }

    /// JSON null.
    #[must_use]
    pub fn null() -> Self {
        Self::new(NodeKind::JsonNull, None, None)
    }

    /// An XML element.
    #[must_use]
    pub fn element(name: impl Into<String>) -> Self {
        Self::new(NodeKind::XmlElement, Some(name.into()), None)
    }

    /// An XML attribute.
    #[must_use]
    pub fn attribute(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(NodeKind::XmlAttribute, Some(name.into()), Some(value.into()))
    }

    /// An XML text node.
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self::new(NodeKind::XmlText, None, Some(value.into()))
    }

    /// An XML comment.
    #[must_use]
    pub fn comment(value: impl Into<String>) -> Self {
        Self::new(NodeKind::XmlComment, None, Some(value.into()))
    }

    /// An XML processing instruction.
    #[must_use]
    pub fn processing_instruction(target: impl Into<String>, data: impl Into<String>) -> Self {
        Self::new(
            NodeKind::XmlProcessingInstruction,
            Some(target.into()),
            Some(data.into()),
        )
    }

    /// Returns the node kind.
    #[must_use]
    pub fn kind(&self) -> NodeKind {
        self.kind
    }
}

/// A node record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub(crate) key: NodeKey,
    pub(crate) kind: NodeKind,
    pub(crate) parent: Option<NodeKey>,
    pub(crate) first_child: Option<NodeKey>,
    pub(crate) last_child: Option<NodeKey>,
    pub(crate) left_sibling: Option<NodeKey>,
    pub(crate) right_sibling: Option<NodeKey>,
    pub(crate) child_count: u64,
    pub(crate) descendant_count: u64,
    pub(crate) name: Option<String>,
    pub(crate) value: Option<String>,
    pub(crate) path_node_key: Option<PathNodeKey>,
    pub(crate) content_hash: u64,
    pub(crate) hash: u64,
}

impl Node {
    pub(crate) fn new(
        key: NodeKey,
        parent: Option<NodeKey>,
        kind: NodeKind,
        name: Option<String>,
        value: Option<String>,
        content_hash: u64,
    ) -> Self {
        Self {
            key,
            kind,
            parent,
            first_child: None,
            last_child: None,
            left_sibling: None,
            right_sibling: None,
            child_count: 0,
            descendant_count: 0,
            name,
            value,
            path_node_key: None,
            content_hash,
            hash: 0,
        }
    }

    /// Returns the node key.
    #[must_use]
    pub fn key(&self) -> NodeKey {
        self.key
    }

    /// Returns the node kind.
    #[must_use]
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Returns the parent key; `None` only for the document root.
    #[must_use]
    pub fn parent(&self) -> Option<NodeKey> {
        self.parent
    }

    /// Returns the first child key.
    #[must_use]
    pub fn first_child(&self) -> Option<NodeKey> {
        self.first_child
    }

    /// Returns the last child key.
    #[must_use]
    pub fn last_child(&self) -> Option<NodeKey> {
        self.last_child
    }

    /// Returns the left sibling key.
    #[must_use]
    pub fn left_sibling(&self) -> Option<NodeKey> {
        self.left_sibling
    }

    /// Returns the right sibling key.
    #[must_use]
    pub fn right_sibling(&self) -> Option<NodeKey> {
        self.right_sibling
    }

    /// Returns the number of direct children.
    #[must_use]
    pub fn child_count(&self) -> u64 {
        self.child_count
    }

    /// Returns the number of nodes in the subtree, excluding this node.
    #[must_use]
    pub fn descendant_count(&self) -> u64 {
        self.descendant_count
    }

    /// Returns the node name, if the kind is named.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Returns the node value, if the kind carries one.
    #[must_use]
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// Returns the path summary node this node is counted under.
    #[must_use]
    pub fn path_node_key(&self) -> Option<PathNodeKey> {
        self.path_node_key
    }

    /// Returns the digest of this node's own kind, name and value.
    #[must_use]
    pub fn content_hash(&self) -> u64 {
        self.content_hash
    }

    /// Returns the structural hash of the subtree rooted here.
    #[must_use]
    pub fn hash(&self) -> u64 {
        self.hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_know_their_model() {
        assert_eq!(NodeKind::JsonArray.resource_kind(), Some(ResourceKind::Json));
        assert_eq!(NodeKind::XmlText.resource_kind(), Some(ResourceKind::Xml));
        assert_eq!(NodeKind::Document.resource_kind(), None);
    }

    #[test]
    fn attribute_is_named_and_valued() {
        assert!(NodeKind::XmlAttribute.is_named());
        assert!(NodeKind::XmlAttribute.has_value());
        assert!(!NodeKind::JsonObject.has_value());
        assert!(!NodeKind::JsonNull.is_named());
    }

    #[test]
    fn scalar_constructors_render_values() {
        assert_eq!(NodeContent::number(1.5).value.as_deref(), Some("1.5"));
        assert_eq!(NodeContent::boolean(true).value.as_deref(), Some("true"));
        assert_eq!(NodeContent::null().kind(), NodeKind::JsonNull);
    }

    #[test]
    fn fresh_node_is_unlinked() {
        let node = Node::new(
            NodeKey::new(3),
            Some(NodeKey::DOCUMENT_ROOT),
            NodeKind::JsonObject,
            None,
            None,
            9,
        );
        assert_eq!(node.parent(), Some(NodeKey::DOCUMENT_ROOT));
        assert!(node.first_child().is_none());
        assert_eq!(node.child_count(), 0);
        assert_eq!(node.hash(), 0);
        assert_eq!(node.content_hash(), 9);
    }
}
