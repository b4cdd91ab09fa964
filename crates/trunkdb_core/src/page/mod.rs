//! Copy-on-write page layer.
//!
//! Each committed revision is one immutable [`RevisionRoot`] snapshot. The
//! [`PageStore`] appends snapshots to the storage backend as framed CBOR
//! commit records and rebuilds its revision directory from them on open.
//! Decoded snapshots are shared through the [`BufferManager`].
//!
//! Transactions never touch the store directly: a [`PageReadOnlyTrx`] pins
//! one committed snapshot, a [`PageTrx`] owns a private working copy of the
//! next revision and publishes it on commit.

mod buffer;
mod snapshot;
mod store;
mod trx;

pub(crate) use buffer::BufferManager;
pub use snapshot::RevisionInfo;
pub(crate) use snapshot::{commit_timestamp, now_millis, RevisionRoot};
pub(crate) use store::PageStore;
pub(crate) use trx::{PageReadOnlyTrx, PageTrx};

use crate::node::Node;
use crate::types::NodeKey;

/// Read access to the nodes of one revision.
pub(crate) trait NodeSource {
    /// Returns the node with `key`, if it exists in this revision.
    fn node(&self, key: NodeKey) -> Option<&Node>;

    /// Returns the parent chain of `key`, nearest ancestor first.
    fn ancestors(&self, key: NodeKey) -> Vec<NodeKey> {
        let mut chain = Vec::new();
        let mut current = self.node(key).and_then(Node::parent);
        while let Some(parent) = current {
            chain.push(parent);
            current = self.node(parent).and_then(Node::parent);
        }
        chain
    }

    /// Returns the subtree rooted at `key` in pre-order, including `key`.
    fn subtree(&self, key: NodeKey) -> Vec<NodeKey> {
        let mut out = Vec::new();
        let mut stack = vec![key];
        while let Some(current) = stack.pop() {
            let Some(node) = self.node(current) else {
                continue;
            };
            out.push(current);
            // Push children right-to-left so the leftmost is visited first.
            let mut child = node.last_child;
            while let Some(c) = child {
                stack.push(c);
                child = self.node(c).and_then(Node::left_sibling);
            }
        }
        out
    }
}
