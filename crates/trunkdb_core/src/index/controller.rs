//! Per-revision index controller.

use super::{ChangeType, IndexDef, IndexKind, IndexMode};
use crate::error::{CoreError, CoreResult};
use crate::node::Node;
use crate::page::{NodeSource, RevisionRoot};
use crate::types::{NodeKey, PathNodeKey, Revision};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

#[derive(Debug, Default)]
struct IndexState {
    names: HashMap<String, BTreeSet<NodeKey>>,
    paths: HashMap<PathNodeKey, BTreeSet<NodeKey>>,
    contents: HashMap<(String, String), BTreeSet<NodeKey>>,
}

/// The secondary indexes of one revision.
///
/// Obtained from [`crate::ResourceManager::index_controller`] or from a
/// transaction. Lookups return node keys in ascending order.
#[derive(Debug)]
pub struct IndexController {
    revision: Revision,
    mode: IndexMode,
    definitions: Vec<IndexDef>,
    state: RwLock<IndexState>,
}

impl IndexController {
    /// Builds a controller by scanning `root`.
    pub(crate) fn build(
        revision: Revision,
        mode: IndexMode,
        definitions: &[IndexDef],
        root: &RevisionRoot,
    ) -> Self {
        let controller = Self {
            revision,
            mode,
            definitions: definitions.to_vec(),
            state: RwLock::new(IndexState::default()),
        };
        controller.reinitialize(root);
        controller
    }

    /// Discards all entries and rescans `root`.
    pub(crate) fn reinitialize(&self, root: &RevisionRoot) {
        let mut state = IndexState::default();
        if !self.definitions.is_empty() {
            for node in root.nodes.values() {
                let parent = node.parent.and_then(|p| root.node(p));
                let label = content_label(node, parent);
                self.apply(&mut state, ChangeType::Insert, node, &label);
            }
        }
        *self.state.write() = state;
        debug!(
            revision = %self.revision,
            mode = ?self.mode,
            nodes = root.nodes.len(),
            "index controller initialized"
        );
    }

    /// Applies one change of the writer.
    pub(crate) fn notify(&self, change: ChangeType, node: &Node, label: &str) {
        if self.definitions.is_empty() {
            return;
        }
        let mut state = self.state.write();
        self.apply(&mut state, change, node, label);
    }

    fn apply(&self, state: &mut IndexState, change: ChangeType, node: &Node, label: &str) {
        for def in &self.definitions {
            match def.kind {
                IndexKind::Name => {
                    if let Some(name) = node.name() {
                        update(&mut state.names, name.to_string(), node.key, change);
                    }
                }
                IndexKind::Path => {
                    if let Some(path) = node.path_node_key {
                        update(&mut state.paths, path, node.key, change);
                    }
                }
                IndexKind::Content => {
                    if let Some(value) = node.value() {
                        update(
                            &mut state.contents,
                            (label.to_string(), value.to_string()),
                            node.key,
                            change,
                        );
                    }
                }
            }
        }
    }

    /// Returns the revision this controller belongs to.
    #[must_use]
    pub fn revision(&self) -> Revision {
        self.revision
    }

    /// Returns whether the controller serves readers or the writer.
    #[must_use]
    pub fn mode(&self) -> IndexMode {
        self.mode
    }

    /// Returns the declared indexes.
    #[must_use]
    pub fn definitions(&self) -> &[IndexDef] {
        &self.definitions
    }

    /// Returns `true` if an index of `kind` is declared.
    #[must_use]
    pub fn has_index(&self, kind: IndexKind) -> bool {
        self.definitions.iter().any(|def| def.kind == kind)
    }

    /// Returns the nodes named `name`.
    ///
    /// # Errors
    ///
    /// Returns `IndexNotFound` if no name index is declared.
    pub fn lookup_name(&self, name: &str) -> CoreResult<Vec<NodeKey>> {
        self.require(IndexKind::Name)?;
        Ok(collect(self.state.read().names.get(name)))
    }

    /// Returns the nodes counted under a path summary node.
    ///
    /// # Errors
    ///
    /// Returns `IndexNotFound` if no path index is declared.
    pub fn lookup_path(&self, path: PathNodeKey) -> CoreResult<Vec<NodeKey>> {
        self.require(IndexKind::Path)?;
        Ok(collect(self.state.read().paths.get(&path)))
    }

    /// Returns the nodes holding `value` under `label`.
    ///
    /// # Errors
    ///
    /// Returns `IndexNotFound` if no content index is declared.
    pub fn lookup_content(&self, label: &str, value: &str) -> CoreResult<Vec<NodeKey>> {
        self.require(IndexKind::Content)?;
        let key = (label.to_string(), value.to_string());
        Ok(collect(self.state.read().contents.get(&key)))
    }

    fn require(&self, kind: IndexKind) -> CoreResult<()> {
        if self.has_index(kind) {
            Ok(())
        } else {
            Err(CoreError::IndexNotFound { kind })
        }
    }
}

fn update<K: std::hash::Hash + Eq>(
    map: &mut HashMap<K, BTreeSet<NodeKey>>,
    key: K,
    node: NodeKey,
    change: ChangeType,
) {
    match change {
        ChangeType::Insert => {
            map.entry(key).or_default().insert(node);
        }
        ChangeType::Delete => {
            if let Some(set) = map.get_mut(&key) {
                set.remove(&node);
                if set.is_empty() {
                    map.remove(&key);
                }
            }
        }
    }
}

fn collect(set: Option<&BTreeSet<NodeKey>>) -> Vec<NodeKey> {
    set.map(|s| s.iter().copied().collect()).unwrap_or_default()
}

/// Label a value is indexed under: the node's own name, else its parent's.
pub(crate) fn content_label(node: &Node, parent: Option<&Node>) -> String {
    node.name()
        .or_else(|| parent.and_then(Node::name))
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HashFunction, ResourceKind};
    use crate::node::{NodeFactory, NodeContent, XmlNodeFactory};
    use crate::types::ResourceId;

    /// `<book id="7">Dune</book>`
    fn revision() -> RevisionRoot {
        let factory = XmlNodeFactory::new(HashFunction::Sha256);
        let mut root = RevisionRoot::initial(
            ResourceId::generate(),
            ResourceKind::Xml,
            factory.create_document_root(),
            0,
        );
        let mut book = factory
            .create_node(NodeKey::new(1), NodeKey::DOCUMENT_ROOT, &NodeContent::element("book"))
            .unwrap();
        book.path_node_key = Some(PathNodeKey::new(1));
        let id = factory
            .create_node(NodeKey::new(2), NodeKey::new(1), &NodeContent::attribute("id", "7"))
            .unwrap();
        let text = factory
            .create_node(NodeKey::new(3), NodeKey::new(1), &NodeContent::text("Dune"))
            .unwrap();
        for node in [book, id, text] {
            root.nodes.insert(node.key, node);
        }
        root
    }

    fn all_indexes() -> Vec<IndexDef> {
        vec![IndexDef::name(1), IndexDef::path(2), IndexDef::content(3)]
    }

    #[test]
    fn build_scans_revision() {
        let controller =
            IndexController::build(Revision::ZERO, IndexMode::Read, &all_indexes(), &revision());

        assert_eq!(controller.lookup_name("book").unwrap(), vec![NodeKey::new(1)]);
        assert_eq!(
            controller.lookup_path(PathNodeKey::new(1)).unwrap(),
            vec![NodeKey::new(1)]
        );
        assert_eq!(
            controller.lookup_content("id", "7").unwrap(),
            vec![NodeKey::new(2)]
        );
        // Text takes the label of its element.
        assert_eq!(
            controller.lookup_content("book", "Dune").unwrap(),
            vec![NodeKey::new(3)]
        );
    }

    #[test]
    fn undeclared_index_is_an_error() {
        let controller =
            IndexController::build(Revision::ZERO, IndexMode::Read, &[IndexDef::name(1)], &revision());
        assert!(matches!(
            controller.lookup_content("id", "7"),
            Err(CoreError::IndexNotFound {
                kind: IndexKind::Content
            })
        ));
    }

    #[test]
    fn notifications_follow_changes() {
        let root = revision();
        let controller = IndexController::build(Revision::new(1), IndexMode::Write, &all_indexes(), &root);
        let book = root.node(NodeKey::new(1)).unwrap();

        controller.notify(ChangeType::Delete, book, "book");
        assert!(controller.lookup_name("book").unwrap().is_empty());

        controller.notify(ChangeType::Insert, book, "book");
        assert_eq!(controller.lookup_name("book").unwrap(), vec![NodeKey::new(1)]);
    }

    #[test]
    fn reinitialize_drops_uncommitted_entries() {
        let root = revision();
        let controller = IndexController::build(Revision::new(1), IndexMode::Write, &all_indexes(), &root);
        let mut ghost = root.node(NodeKey::new(3)).unwrap().clone();
        ghost.key = NodeKey::new(99);
        controller.notify(ChangeType::Insert, &ghost, "book");
        assert_eq!(controller.lookup_content("book", "Dune").unwrap().len(), 2);

        controller.reinitialize(&root);
        assert_eq!(
            controller.lookup_content("book", "Dune").unwrap(),
            vec![NodeKey::new(3)]
        );
    }
}
