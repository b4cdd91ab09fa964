//! Path summary: the distinct structural paths of a revision.
//!
//! Every object key, array, element and attribute is counted under the
//! path node for its label path (`/library/book/@id`, `/items/[]`). Path
//! nodes carry reference counts and vanish when the last node counted
//! under them and all their child paths are gone.

use crate::error::CoreResult;
use crate::node::{Node, NodeKind};
use crate::page::{NodeSource, PageTrx};
use crate::types::{NodeKey, PathNodeKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Label of the path node for JSON arrays.
pub const ARRAY_LABEL: &str = "[]";

/// One distinct path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathNode {
    key: PathNodeKey,
    parent: Option<PathNodeKey>,
    label: String,
    kind: NodeKind,
    level: u32,
    references: u64,
    children: Vec<PathNodeKey>,
}

impl PathNode {
    /// Returns the path node key.
    #[must_use]
    pub fn key(&self) -> PathNodeKey {
        self.key
    }

    /// Returns the parent path node; `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<PathNodeKey> {
        self.parent
    }

    /// Returns the last path step, e.g. `book`, `@id` or `[]`.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns the kind of the nodes counted here.
    #[must_use]
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Returns the depth; the root is level 0.
    #[must_use]
    pub fn level(&self) -> u32 {
        self.level
    }

    /// Returns how many nodes are counted under this path.
    #[must_use]
    pub fn references(&self) -> u64 {
        self.references
    }

    /// Returns the child paths.
    #[must_use]
    pub fn children(&self) -> &[PathNodeKey] {
        &self.children
    }
}

/// The path summary of one revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathSummary {
    nodes: BTreeMap<PathNodeKey, PathNode>,
    next_key: u64,
}

impl Default for PathSummary {
    fn default() -> Self {
        Self::new()
    }
}

impl PathSummary {
    pub(crate) fn new() -> Self {
        let root = PathNode {
            key: PathNodeKey::ROOT,
            parent: None,
            label: String::new(),
            kind: NodeKind::Document,
            level: 0,
            references: 1,
            children: Vec::new(),
        };
        let mut nodes = BTreeMap::new();
        nodes.insert(PathNodeKey::ROOT, root);
        Self {
            nodes,
            next_key: PathNodeKey::ROOT.as_u64() + 1,
        }
    }

    /// Returns the path node with `key`.
    #[must_use]
    pub fn get(&self, key: PathNodeKey) -> Option<&PathNode> {
        self.nodes.get(&key)
    }

    /// Returns the number of distinct paths, excluding the root.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len() - 1
    }

    /// Returns `true` if the summary holds no path besides the root.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Renders the full path of `key`, e.g. `/library/book/@id`.
    #[must_use]
    pub fn path(&self, key: PathNodeKey) -> Option<String> {
        let mut labels = Vec::new();
        let mut current = self.nodes.get(&key)?;
        while let Some(parent) = current.parent {
            labels.push(current.label.as_str());
            current = self.nodes.get(&parent)?;
        }
        if labels.is_empty() {
            return Some("/".to_string());
        }
        labels.reverse();
        Some(format!("/{}", labels.join("/")))
    }

    /// Finds the path node for a rendered path.
    #[must_use]
    pub fn find(&self, path: &str) -> Option<PathNodeKey> {
        let mut current = PathNodeKey::ROOT;
        for label in path.split('/').filter(|step| !step.is_empty()) {
            let node = self.nodes.get(&current)?;
            current = *node
                .children
                .iter()
                .find(|child| self.nodes.get(child).is_some_and(|c| c.label == label))?;
        }
        Some(current)
    }

    /// Returns every path with its reference count, in key order.
    #[must_use]
    pub fn paths(&self) -> Vec<(PathNodeKey, String, u64)> {
        self.nodes
            .values()
            .filter(|node| node.parent.is_some())
            .filter_map(|node| {
                self.path(node.key)
                    .map(|path| (node.key, path, node.references))
            })
            .collect()
    }

    fn child_with(&self, parent: PathNodeKey, label: &str, kind: NodeKind) -> Option<PathNodeKey> {
        self.nodes.get(&parent)?.children.iter().copied().find(|child| {
            self.nodes
                .get(child)
                .is_some_and(|c| c.label == label && c.kind == kind)
        })
    }

    /// Counts one more node under `(parent, label, kind)`, creating the
    /// path node if needed.
    fn acquire(&mut self, parent: PathNodeKey, label: String, kind: NodeKind) -> PathNodeKey {
        if let Some(existing) = self.child_with(parent, &label, kind) {
            if let Some(node) = self.nodes.get_mut(&existing) {
                node.references += 1;
            }
            return existing;
        }

        let key = PathNodeKey::new(self.next_key);
        self.next_key += 1;
        let level = self.nodes.get(&parent).map_or(1, |p| p.level + 1);
        self.nodes.insert(
            key,
            PathNode {
                key,
                parent: Some(parent),
                label,
                kind,
                level,
                references: 1,
                children: Vec::new(),
            },
        );
        if let Some(p) = self.nodes.get_mut(&parent) {
            p.children.push(key);
        }
        key
    }

    /// Counts one node less under `key` and drops path nodes that became
    /// unreferenced leaves, walking up.
    fn release(&mut self, key: PathNodeKey) {
        if let Some(node) = self.nodes.get_mut(&key) {
            node.references = node.references.saturating_sub(1);
        }

        let mut current = key;
        while current != PathNodeKey::ROOT {
            let Some(node) = self.nodes.get(&current) else {
                break;
            };
            if node.references > 0 || !node.children.is_empty() {
                break;
            }
            let parent = node.parent.unwrap_or(PathNodeKey::ROOT);
            self.nodes.remove(&current);
            if let Some(p) = self.nodes.get_mut(&parent) {
                p.children.retain(|child| *child != current);
            }
            current = parent;
        }
    }
}

/// Returns the path label of a node, `None` for kinds without a path.
pub(crate) fn path_label(node: &Node) -> Option<String> {
    match (node.kind, node.name()) {
        (NodeKind::JsonArray, _) => Some(ARRAY_LABEL.to_string()),
        (NodeKind::XmlAttribute, Some(name)) => Some(format!("@{name}")),
        (NodeKind::JsonObjectKey | NodeKind::XmlElement, Some(name)) => Some(name.to_string()),
        _ => None,
    }
}

/// Maintains the path summary of a read-write transaction.
///
/// Updates are applied to a private copy on every structural mutation and
/// written into the page transaction once per commit by [`flush`].
///
/// [`flush`]: PathSummaryWriter::flush
#[derive(Debug)]
pub(crate) struct PathSummaryWriter {
    summary: PathSummary,
    dirty: bool,
}

impl PathSummaryWriter {
    pub(crate) fn new(base: &PathSummary) -> Self {
        Self {
            summary: base.clone(),
            dirty: false,
        }
    }

    /// The summary including uncommitted changes.
    pub(crate) fn summary(&self) -> &PathSummary {
        &self.summary
    }

    /// Counts a freshly inserted node and stores its path node key.
    pub(crate) fn on_insert(&mut self, page: &mut PageTrx, key: NodeKey) -> CoreResult<()> {
        let (label, kind) = match page.node(key) {
            Some(node) => match path_label(node) {
                Some(label) => (label, node.kind),
                None => return Ok(()),
            },
            None => return Ok(()),
        };

        let parent_path = page
            .ancestors(key)
            .into_iter()
            .find_map(|ancestor| page.node(ancestor).and_then(Node::path_node_key))
            .unwrap_or(PathNodeKey::ROOT);

        let path_key = self.summary.acquire(parent_path, label, kind);
        page.node_mut(key)?.path_node_key = Some(path_key);
        self.dirty = true;
        Ok(())
    }

    /// Uncounts the nodes of a subtree given in pre-order.
    ///
    /// Descendants are released before their ancestors so that emptied
    /// child paths are gone by the time a parent path is checked.
    pub(crate) fn on_remove(&mut self, page: &mut PageTrx, subtree: &[NodeKey]) -> CoreResult<()> {
        for &key in subtree.iter().rev() {
            let Some(path_key) = page.node(key).and_then(Node::path_node_key) else {
                continue;
            };
            self.summary.release(path_key);
            page.node_mut(key)?.path_node_key = None;
            self.dirty = true;
        }
        Ok(())
    }

    /// Recounts a subtree (given in pre-order) after its root was renamed.
    pub(crate) fn on_reattach(&mut self, page: &mut PageTrx, subtree: &[NodeKey]) -> CoreResult<()> {
        for &key in subtree {
            self.on_insert(page, key)?;
        }
        Ok(())
    }

    /// Writes pending changes into the page transaction.
    pub(crate) fn flush(&mut self, page: &mut PageTrx) {
        if self.dirty {
            page.set_path_summary(self.summary.clone());
            self.dirty = false;
        }
    }

    /// Drops uncommitted changes.
    pub(crate) fn reset(&mut self, base: &PathSummary) {
        self.summary = base.clone();
        self.dirty = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary_with(paths: &[(&str, NodeKind)]) -> (PathSummary, Vec<PathNodeKey>) {
        let mut summary = PathSummary::new();
        let mut keys = Vec::new();
        for (path, kind) in paths {
            let mut parent = PathNodeKey::ROOT;
            let steps: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
            for (i, step) in steps.iter().enumerate() {
                let step_kind = if i + 1 == steps.len() {
                    *kind
                } else {
                    NodeKind::XmlElement
                };
                parent = match summary.child_with(parent, step, step_kind) {
                    Some(existing) if i + 1 < steps.len() => existing,
                    _ => summary.acquire(parent, (*step).to_string(), step_kind),
                };
            }
            keys.push(parent);
        }
        (summary, keys)
    }

    #[test]
    fn same_path_is_shared() {
        let (summary, keys) = summary_with(&[
            ("/lib/book", NodeKind::XmlElement),
            ("/lib/book", NodeKind::XmlElement),
        ]);
        assert_eq!(keys[0], keys[1]);
        assert_eq!(summary.get(keys[0]).unwrap().references(), 2);
        assert_eq!(summary.path(keys[0]).as_deref(), Some("/lib/book"));
        assert_eq!(summary.get(keys[0]).unwrap().level(), 2);
    }

    #[test]
    fn kind_separates_paths() {
        let mut summary = PathSummary::new();
        let element = summary.acquire(PathNodeKey::ROOT, "a".into(), NodeKind::XmlElement);
        let key = summary.acquire(PathNodeKey::ROOT, "a".into(), NodeKind::JsonObjectKey);
        assert_ne!(element, key);
        assert_eq!(summary.len(), 2);
    }

    #[test]
    fn release_prunes_empty_branches() {
        let (mut summary, keys) = summary_with(&[("/a/b/c", NodeKind::XmlElement)]);
        let b = summary.find("/a/b").unwrap();
        let a = summary.find("/a").unwrap();

        // Intermediate steps were acquired once each while building.
        summary.release(keys[0]);
        assert!(summary.get(keys[0]).is_none());
        assert!(summary.get(b).is_some());

        summary.release(b);
        summary.release(a);
        assert!(summary.is_empty());
        assert!(summary.get(PathNodeKey::ROOT).unwrap().children().is_empty());
    }

    #[test]
    fn referenced_parent_survives_child_removal() {
        let (mut summary, keys) = summary_with(&[("/a/b", NodeKind::XmlElement)]);
        let a = summary.find("/a").unwrap();
        summary.release(keys[0]);
        assert!(summary.get(a).is_some());
        assert_eq!(summary.paths(), vec![(a, "/a".to_string(), 1)]);
    }

    #[test]
    fn find_resolves_rendered_paths() {
        let (summary, keys) = summary_with(&[("/x/@id", NodeKind::XmlAttribute)]);
        assert_eq!(summary.find("/x/@id"), Some(keys[0]));
        assert_eq!(summary.find("/"), Some(PathNodeKey::ROOT));
        assert_eq!(summary.find("/missing"), None);
        assert_eq!(summary.path(PathNodeKey::ROOT).as_deref(), Some("/"));
    }

    #[test]
    fn labels_follow_node_kinds() {
        let key = NodeKey::new(1);
        let attr = Node::new(key, None, NodeKind::XmlAttribute, Some("id".into()), Some("7".into()), 0);
        let array = Node::new(key, None, NodeKind::JsonArray, None, None, 0);
        let text = Node::new(key, None, NodeKind::XmlText, None, Some("t".into()), 0);
        assert_eq!(path_label(&attr).as_deref(), Some("@id"));
        assert_eq!(path_label(&array).as_deref(), Some(ARRAY_LABEL));
        assert_eq!(path_label(&text), None);
    }
}
