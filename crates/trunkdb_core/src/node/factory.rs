//! Node factories for the JSON and XML document models.

use super::{Node, NodeContent, NodeKind};
use crate::config::{HashFunction, ResourceKind};
use crate::error::{CoreError, CoreResult};
use crate::types::NodeKey;
use sha2::{Digest, Sha256, Sha512_256};
use std::fmt;
use std::sync::Arc;

/// Builds nodes of one document model.
///
/// A factory decides which node kinds exist in its model, where they may be
/// placed, and which values they accept. It also computes each node's own
/// content hash with the configured digest.
pub trait NodeFactory: Send + Sync + fmt::Debug {
    /// Document model produced by this factory.
    fn resource_kind(&self) -> ResourceKind;

    /// Digest used for content hashes.
    fn hash_function(&self) -> HashFunction;

    /// Checks that a node of kind `child` may become a child of `parent`.
    ///
    /// `has_child` reports whether `parent` already has a child of a given
    /// kind.
    ///
    /// # Errors
    ///
    /// Returns `InvalidNodeKind` if the model forbids the placement.
    fn check_placement(
        &self,
        parent: &Node,
        child: NodeKind,
        has_child: &dyn Fn(NodeKind) -> bool,
    ) -> CoreResult<()>;

    /// Checks that `value` is acceptable for a node of `kind`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidNodeKind` if the kind carries no value or the value
    /// is malformed for it.
    fn check_value(&self, kind: NodeKind, value: &str) -> CoreResult<()> {
        if !kind.has_value() {
            return Err(CoreError::invalid_node_kind(kind, "kind carries no value"));
        }
        Ok(())
    }

    /// Computes the content hash of a node's kind, name and value.
    fn content_hash(&self, kind: NodeKind, name: Option<&str>, value: Option<&str>) -> u64 {
        match self.hash_function() {
            HashFunction::Sha256 => digest::<Sha256>(kind, name, value),
            HashFunction::Sha512Trunc => digest::<Sha512_256>(kind, name, value),
        }
    }

    /// Creates the document root present in every revision.
    fn create_document_root(&self) -> Node {
        Node::new(
            NodeKey::DOCUMENT_ROOT,
            None,
            NodeKind::Document,
            None,
            None,
            self.content_hash(NodeKind::Document, None, None),
        )
    }

    /// Creates an unlinked node for `content` below `parent`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidNodeKind` if the kind belongs to another model or the
    /// content is missing a required name or value.
    fn create_node(&self, key: NodeKey, parent: NodeKey, content: &NodeContent) -> CoreResult<Node> {
        let kind = content.kind;
        if kind.resource_kind() != Some(self.resource_kind()) {
            return Err(CoreError::invalid_node_kind(
                kind,
                format!("not a {:?} node kind", self.resource_kind()),
            ));
        }
        if kind.is_named() != content.name.is_some() {
            return Err(CoreError::invalid_node_kind(kind, "name mismatch"));
        }
        match (&content.value, kind.has_value()) {
            (Some(value), _) => self.check_value(kind, value)?,
            (None, true) => return Err(CoreError::invalid_node_kind(kind, "value required")),
            (None, false) => {}
        }

        Ok(Node::new(
            key,
            Some(parent),
            kind,
            content.name.clone(),
            content.value.clone(),
            self.content_hash(kind, content.name.as_deref(), content.value.as_deref()),
        ))
    }
}

fn digest<D: Digest>(kind: NodeKind, name: Option<&str>, value: Option<&str>) -> u64 {
    let mut hasher = D::new();
    hasher.update([kind.tag()]);
    for part in [name, value] {
        match part {
            Some(s) => {
                hasher.update([1u8]);
                hasher.update((s.len() as u64).to_le_bytes());
                hasher.update(s.as_bytes());
            }
            None => hasher.update([0u8]),
        }
    }
    let out = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&out[..8]);
    u64::from_be_bytes(bytes)
}

/// Factory for JSON resources.
#[derive(Debug, Clone, Copy)]
pub struct JsonNodeFactory {
    hash_function: HashFunction,
}

impl JsonNodeFactory {
    /// Creates a JSON factory hashing with `hash_function`.
    #[must_use]
    pub const fn new(hash_function: HashFunction) -> Self {
        Self { hash_function }
    }
}

impl NodeFactory for JsonNodeFactory {
    fn resource_kind(&self) -> ResourceKind {
        ResourceKind::Json
    }

    fn hash_function(&self) -> HashFunction {
        self.hash_function
    }

    fn check_placement(
        &self,
        parent: &Node,
        child: NodeKind,
        _has_child: &dyn Fn(NodeKind) -> bool,
    ) -> CoreResult<()> {
        let allowed = match parent.kind {
            // A document and an object member each hold exactly one value.
            NodeKind::Document | NodeKind::JsonObjectKey => {
                child.is_json_value() && parent.child_count == 0
            }
            NodeKind::JsonObject => child == NodeKind::JsonObjectKey,
            NodeKind::JsonArray => child.is_json_value(),
            _ => false,
        };
        if allowed {
            Ok(())
        } else {
            Err(CoreError::invalid_node_kind(
                child,
                format!("not allowed below {} {}", parent.kind, parent.key),
            ))
        }
    }

    fn check_value(&self, kind: NodeKind, value: &str) -> CoreResult<()> {
        match kind {
            NodeKind::JsonString => Ok(()),
            NodeKind::JsonNumber if value.parse::<f64>().is_ok_and(f64::is_finite) => Ok(()),
            NodeKind::JsonBoolean if value == "true" || value == "false" => Ok(()),
            NodeKind::JsonNumber | NodeKind::JsonBoolean => Err(CoreError::invalid_node_kind(
                kind,
                format!("malformed value '{value}'"),
            )),
            _ => Err(CoreError::invalid_node_kind(kind, "kind carries no value")),
        }
    }
}

/// Factory for XML resources.
#[derive(Debug, Clone, Copy)]
pub struct XmlNodeFactory {
    hash_function: HashFunction,
}

impl XmlNodeFactory {
    /// Creates an XML factory hashing with `hash_function`.
    #[must_use]
    pub const fn new(hash_function: HashFunction) -> Self {
        Self { hash_function }
    }
}

impl NodeFactory for XmlNodeFactory {
    fn resource_kind(&self) -> ResourceKind {
        ResourceKind::Xml
    }

    fn hash_function(&self) -> HashFunction {
        self.hash_function
    }

    fn check_placement(
        &self,
        parent: &Node,
        child: NodeKind,
        has_child: &dyn Fn(NodeKind) -> bool,
    ) -> CoreResult<()> {
        let allowed = match (parent.kind, child) {
            // At most one root element; comments and PIs may surround it.
            (NodeKind::Document, NodeKind::XmlElement) => !has_child(NodeKind::XmlElement),
            (NodeKind::Document, NodeKind::XmlComment | NodeKind::XmlProcessingInstruction) => true,
            (
                NodeKind::XmlElement,
                NodeKind::XmlElement
                | NodeKind::XmlAttribute
                | NodeKind::XmlText
                | NodeKind::XmlComment
                | NodeKind::XmlProcessingInstruction,
            ) => true,
            _ => false,
        };
        if allowed {
            Ok(())
        } else {
            Err(CoreError::invalid_node_kind(
                child,
                format!("not allowed below {} {}", parent.kind, parent.key),
            ))
        }
    }
}

/// Returns the factory for a resource kind.
pub(crate) fn factory_for(kind: ResourceKind, hash_function: HashFunction) -> Arc<dyn NodeFactory> {
    match kind {
        ResourceKind::Json => Arc::new(JsonNodeFactory::new(hash_function)),
        ResourceKind::Xml => Arc::new(XmlNodeFactory::new(hash_function)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn json() -> JsonNodeFactory {
        JsonNodeFactory::new(HashFunction::Sha256)
    }

    fn no_children(_: NodeKind) -> bool {
        false
    }

    #[test]
    fn json_rejects_xml_kinds() {
        let err = json()
            .create_node(NodeKey::new(1), NodeKey::DOCUMENT_ROOT, &NodeContent::element("a"))
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidNodeKind { .. }));
    }

    #[test]
    fn json_document_holds_one_value() {
        let factory = json();
        let mut root = factory.create_document_root();
        assert!(factory.check_placement(&root, NodeKind::JsonObject, &no_children).is_ok());
        assert!(factory.check_placement(&root, NodeKind::JsonObjectKey, &no_children).is_err());

        root.child_count = 1;
        assert!(factory.check_placement(&root, NodeKind::JsonArray, &no_children).is_err());
    }

    #[test]
    fn json_objects_only_take_keys() {
        let factory = json();
        let object = factory
            .create_node(NodeKey::new(1), NodeKey::DOCUMENT_ROOT, &NodeContent::object())
            .unwrap();
        assert!(factory.check_placement(&object, NodeKind::JsonObjectKey, &no_children).is_ok());
        assert!(factory.check_placement(&object, NodeKind::JsonString, &no_children).is_err());
    }

    #[test]
    fn json_values_are_checked() {
        let factory = json();
        assert!(factory.check_value(NodeKind::JsonNumber, "12.5").is_ok());
        assert!(factory.check_value(NodeKind::JsonNumber, "twelve").is_err());
        assert!(factory.check_value(NodeKind::JsonBoolean, "yes").is_err());
        assert!(factory.check_value(NodeKind::JsonNull, "null").is_err());
    }

    #[test]
    fn json_numbers_must_be_finite() {
        let factory = json();
        for value in ["NaN", "inf", "-inf", "infinity"] {
            assert!(factory.check_value(NodeKind::JsonNumber, value).is_err(), "{value}");
        }
        assert!(factory.check_value(NodeKind::JsonNumber, "-0.5e3").is_ok());
        assert!(factory
            .create_node(NodeKey::new(1), NodeKey::DOCUMENT_ROOT, &NodeContent::number(f64::NAN))
            .is_err());
    }

    #[test]
    fn xml_document_holds_one_root_element() {
        let factory = XmlNodeFactory::new(HashFunction::Sha256);
        let mut root = factory.create_document_root();
        root.child_count = 1;
        let only_comment = |kind: NodeKind| kind == NodeKind::XmlComment;
        assert!(factory.check_placement(&root, NodeKind::XmlElement, &only_comment).is_ok());

        let has_element = |kind: NodeKind| kind == NodeKind::XmlElement;
        assert!(factory.check_placement(&root, NodeKind::XmlElement, &has_element).is_err());
        assert!(factory
            .check_placement(&root, NodeKind::XmlProcessingInstruction, &has_element)
            .is_ok());
    }

    #[test]
    fn xml_attributes_belong_to_elements() {
        let factory = XmlNodeFactory::new(HashFunction::Sha256);
        let root = factory.create_document_root();
        assert!(factory.check_placement(&root, NodeKind::XmlAttribute, &no_children).is_err());

        let element = factory
            .create_node(NodeKey::new(1), NodeKey::DOCUMENT_ROOT, &NodeContent::element("a"))
            .unwrap();
        assert!(factory.check_placement(&element, NodeKind::XmlAttribute, &no_children).is_ok());
        assert!(factory.check_placement(&element, NodeKind::XmlText, &no_children).is_ok());
    }

    #[test]
    fn missing_value_is_rejected() {
        let content = NodeContent {
            kind: NodeKind::JsonString,
            name: None,
            value: None,
        };
        assert!(json()
            .create_node(NodeKey::new(1), NodeKey::DOCUMENT_ROOT, &content)
            .is_err());
    }

    #[test]
    fn content_hash_depends_on_function_and_content() {
        let sha256 = json();
        let sha512 = JsonNodeFactory::new(HashFunction::Sha512Trunc);

        let a = sha256.content_hash(NodeKind::JsonString, None, Some("x"));
        assert_eq!(a, sha256.content_hash(NodeKind::JsonString, None, Some("x")));
        assert_ne!(a, sha256.content_hash(NodeKind::JsonString, None, Some("y")));
        assert_ne!(a, sha512.content_hash(NodeKind::JsonString, None, Some("x")));
        // Name and value are length-prefixed, so they cannot bleed into each other.
        assert_ne!(
            sha256.content_hash(NodeKind::XmlAttribute, Some("ab"), Some("c")),
            sha256.content_hash(NodeKind::XmlAttribute, Some("a"), Some("bc")),
        );
    }
}
