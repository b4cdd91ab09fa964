//! Structural node hashes.
//!
//! The structural hash of a node is
//!
//! ```text
//! hash(n) = content_hash(n) + PRIME * sum(hash(c) for c in children(n))
//! ```
//!
//! in wrapping `u64` arithmetic. The formula is linear in every child hash,
//! so a change of `delta` at a node changes its parent by `PRIME * delta`,
//! its grandparent by `PRIME^2 * delta`, and so on. [`HashType::Rolling`]
//! applies these deltas eagerly on each mutation; [`HashType::Postorder`]
//! marks touched ancestors and recomputes them bottom-up at commit. Both
//! produce the same hashes for the same tree.

use crate::config::HashType;
use crate::error::CoreResult;
use crate::node::Node;
use crate::page::{NodeSource, PageTrx};
use crate::types::NodeKey;
use std::collections::BTreeSet;

/// Multiplier applied per tree level.
pub(crate) const PRIME: u64 = 77_081;

/// Hash a node starts with when it has no children.
pub(crate) fn leaf_hash(hash_type: HashType, node: &Node) -> u64 {
    match hash_type {
        HashType::None => 0,
        HashType::Rolling | HashType::Postorder => node.content_hash,
    }
}

/// Recomputes one node from its content hash and its children's hashes.
fn combine(source: &impl NodeSource, node: &Node) -> u64 {
    let mut sum = 0u64;
    let mut child = node.first_child;
    while let Some(key) = child {
        let Some(c) = source.node(key) else {
            break;
        };
        sum = sum.wrapping_add(c.hash);
        child = c.right_sibling;
    }
    node.content_hash.wrapping_add(PRIME.wrapping_mul(sum))
}

/// Keeps structural hashes of a read-write transaction up to date.
#[derive(Debug)]
pub(crate) struct NodeHashing {
    hash_type: HashType,
    dirty: BTreeSet<NodeKey>,
}

impl NodeHashing {
    pub(crate) fn new(hash_type: HashType) -> Self {
        Self {
            hash_type,
            dirty: BTreeSet::new(),
        }
    }

    /// Hashes a freshly inserted leaf and updates its ancestors.
    pub(crate) fn after_insert(&mut self, page: &mut PageTrx, key: NodeKey) -> CoreResult<()> {
        match self.hash_type {
            HashType::None => Ok(()),
            HashType::Rolling => {
                let node = page.node_mut(key)?;
                node.hash = node.content_hash;
                let delta = node.hash;
                propagate(page, key, delta)
            }
            HashType::Postorder => {
                self.mark_with_ancestors(page, key);
                Ok(())
            }
        }
    }

    /// Updates the ancestors of a removed subtree whose root hashed to
    /// `removed_hash` and hung below `parent`.
    pub(crate) fn after_remove(
        &mut self,
        page: &mut PageTrx,
        parent: NodeKey,
        removed_hash: u64,
    ) -> CoreResult<()> {
        match self.hash_type {
            HashType::None => Ok(()),
            HashType::Rolling => {
                let delta = PRIME.wrapping_mul(removed_hash).wrapping_neg();
                let node = page.node_mut(parent)?;
                node.hash = node.hash.wrapping_add(delta);
                propagate(page, parent, delta)
            }
            HashType::Postorder => {
                self.mark_with_ancestors(page, parent);
                Ok(())
            }
        }
    }

    /// Updates hashes after the content hash of `key` changed from
    /// `old_content_hash`.
    pub(crate) fn after_update(
        &mut self,
        page: &mut PageTrx,
        key: NodeKey,
        old_content_hash: u64,
    ) -> CoreResult<()> {
        match self.hash_type {
            HashType::None => Ok(()),
            HashType::Rolling => {
                let node = page.node_mut(key)?;
                let delta = node.content_hash.wrapping_sub(old_content_hash);
                node.hash = node.hash.wrapping_add(delta);
                propagate(page, key, delta)
            }
            HashType::Postorder => {
                self.mark_with_ancestors(page, key);
                Ok(())
            }
        }
    }

    /// Finalizes the hashes of every node touched since the last commit.
    pub(crate) fn flush(&mut self, page: &mut PageTrx) -> CoreResult<()> {
        if self.dirty.is_empty() {
            return Ok(());
        }

        // Deepest first, so children are final before their parents.
        let mut ordered: Vec<(usize, NodeKey)> = std::mem::take(&mut self.dirty)
            .into_iter()
            .filter(|key| page.node(*key).is_some())
            .map(|key| (page.ancestors(key).len(), key))
            .collect();
        ordered.sort_unstable_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

        for (_, key) in ordered {
            let hash = match page.node(key) {
                Some(node) => combine(&*page, node),
                None => continue,
            };
            page.node_mut(key)?.hash = hash;
        }
        Ok(())
    }

    /// Forgets pending work after a rollback.
    pub(crate) fn reset(&mut self) {
        self.dirty.clear();
    }

    fn mark_with_ancestors(&mut self, page: &PageTrx, key: NodeKey) {
        self.dirty.insert(key);
        self.dirty.extend(page.ancestors(key));
    }
}

/// Adds `delta` (already applied at `key`) to every ancestor, scaled by
/// `PRIME` per level.
fn propagate(page: &mut PageTrx, key: NodeKey, delta: u64) -> CoreResult<()> {
    let mut delta = delta;
    for ancestor in page.ancestors(key) {
        delta = delta.wrapping_mul(PRIME);
        let node = page.node_mut(ancestor)?;
        node.hash = node.hash.wrapping_add(delta);
    }
    Ok(())
}

/// Recomputes the hash of a whole subtree from scratch.
#[cfg(test)]
pub(crate) fn recompute(source: &impl NodeSource, key: NodeKey) -> u64 {
    let Some(node) = source.node(key) else {
        return 0;
    };
    let mut sum = 0u64;
    let mut child = node.first_child;
    while let Some(c) = child {
        sum = sum.wrapping_add(recompute(source, c));
        child = source.node(c).and_then(Node::right_sibling);
    }
    node.content_hash.wrapping_add(PRIME.wrapping_mul(sum))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_mode_has_zero_leaf_hash() {
        let node = Node::new(NodeKey::new(1), None, crate::node::NodeKind::JsonNull, None, None, 42);
        assert_eq!(leaf_hash(HashType::None, &node), 0);
        assert_eq!(leaf_hash(HashType::Rolling, &node), 42);
        assert_eq!(leaf_hash(HashType::Postorder, &node), 42);
    }
}
