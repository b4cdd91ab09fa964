//! Node cursor shared by read-only and read-write transactions.

use crate::node::Node;
use crate::page::NodeSource;
use crate::types::NodeKey;

/// Position in a node tree.
///
/// Moves that would leave the tree return `false` and keep the position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Cursor {
    key: NodeKey,
}

impl Cursor {
    pub(crate) fn new() -> Self {
        Self {
            key: NodeKey::DOCUMENT_ROOT,
        }
    }

    pub(crate) fn key(self) -> NodeKey {
        self.key
    }

    /// Repositions without checking that `key` exists.
    pub(crate) fn set(&mut self, key: NodeKey) {
        self.key = key;
    }

    pub(crate) fn current<'a>(self, source: &'a impl NodeSource) -> Option<&'a Node> {
        source.node(self.key)
    }

    pub(crate) fn move_to(&mut self, source: &impl NodeSource, key: NodeKey) -> bool {
        if source.node(key).is_some() {
            self.key = key;
            true
        } else {
            false
        }
    }

    /// Follows one link of the current node.
    pub(crate) fn follow(
        &mut self,
        source: &impl NodeSource,
        link: impl FnOnce(&Node) -> Option<NodeKey>,
    ) -> bool {
        match self.current(source).and_then(link) {
            Some(key) => self.move_to(source, key),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HashFunction, ResourceKind};
    use crate::node::{JsonNodeFactory, NodeContent, NodeFactory};
    use crate::page::RevisionRoot;
    use crate::types::ResourceId;

    #[test]
    fn follows_links_and_stays_put_at_the_edge() {
        let factory = JsonNodeFactory::new(HashFunction::Sha256);
        let mut root = RevisionRoot::initial(
            ResourceId::generate(),
            ResourceKind::Json,
            factory.create_document_root(),
            0,
        );
        let child = factory
            .create_node(NodeKey::new(1), NodeKey::DOCUMENT_ROOT, &NodeContent::array())
            .unwrap();
        root.nodes.insert(child.key, child);
        if let Some(doc) = root.nodes.get_mut(&NodeKey::DOCUMENT_ROOT) {
            doc.first_child = Some(NodeKey::new(1));
            doc.last_child = Some(NodeKey::new(1));
            doc.child_count = 1;
        }

        let mut cursor = Cursor::new();
        assert!(!cursor.follow(&root, Node::parent));
        assert!(cursor.follow(&root, Node::first_child));
        assert_eq!(cursor.key(), NodeKey::new(1));
        assert!(!cursor.follow(&root, Node::right_sibling));
        assert_eq!(cursor.key(), NodeKey::new(1));
        assert!(!cursor.move_to(&root, NodeKey::new(9)));
        assert!(cursor.follow(&root, Node::parent));
        assert_eq!(cursor.key(), NodeKey::DOCUMENT_ROOT);
    }
}
