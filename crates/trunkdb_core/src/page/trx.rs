//! Read-only and read-write page transactions.

use super::{commit_timestamp, NodeSource, PageStore, RevisionInfo, RevisionRoot};
use crate::error::{CoreError, CoreResult};
use crate::node::Node;
use crate::path_summary::PathSummary;
use crate::types::{NodeKey, Revision, TransactionId};
use std::sync::Arc;

/// A view pinned to one committed revision.
#[derive(Debug, Clone)]
pub(crate) struct PageReadOnlyTrx {
    root: Arc<RevisionRoot>,
}

impl PageReadOnlyTrx {
    pub(crate) fn open(store: &PageStore, revision: Revision) -> CoreResult<Self> {
        Ok(Self {
            root: store.load(revision)?,
        })
    }

    pub(crate) fn root(&self) -> &Arc<RevisionRoot> {
        &self.root
    }

    pub(crate) fn revision(&self) -> Revision {
        self.root.revision()
    }
}

impl NodeSource for PageReadOnlyTrx {
    fn node(&self, key: NodeKey) -> Option<&Node> {
        self.root.node(key)
    }
}

/// Private working copy of the next revision.
///
/// Changes stay invisible to every reader until [`PageTrx::commit`] has
/// appended the revision to the store.
#[derive(Debug)]
pub(crate) struct PageTrx {
    store: Arc<PageStore>,
    base: Arc<RevisionRoot>,
    working: RevisionRoot,
}

impl PageTrx {
    /// Opens a working copy on top of the most recent revision.
    pub(crate) fn open(store: Arc<PageStore>) -> CoreResult<Self> {
        let base = store.load(store.latest_revision())?;
        let working = base.next_working_copy();
        Ok(Self {
            store,
            base,
            working,
        })
    }

    /// Revision this transaction will commit.
    pub(crate) fn revision(&self) -> Revision {
        self.working.revision()
    }

    /// The committed revision the working copy started from.
    pub(crate) fn base(&self) -> &Arc<RevisionRoot> {
        &self.base
    }

    pub(crate) fn node_mut(&mut self, key: NodeKey) -> CoreResult<&mut Node> {
        self.working
            .nodes
            .get_mut(&key)
            .ok_or(CoreError::NodeNotFound { key })
    }

    /// Key the next [`allocate_node_key`](Self::allocate_node_key) returns.
    pub(crate) fn next_node_key(&self) -> NodeKey {
        NodeKey::new(self.working.next_node_key)
    }

    pub(crate) fn allocate_node_key(&mut self) -> NodeKey {
        let key = NodeKey::new(self.working.next_node_key);
        self.working.next_node_key += 1;
        key
    }

    pub(crate) fn put_node(&mut self, node: Node) {
        self.working.nodes.insert(node.key, node);
    }

    pub(crate) fn remove_node(&mut self, key: NodeKey) -> Option<Node> {
        self.working.nodes.remove(&key)
    }

    pub(crate) fn set_path_summary(&mut self, summary: PathSummary) {
        self.working.path_summary = summary;
    }

    pub(crate) fn record_revisions(&self, key: NodeKey) -> &[Revision] {
        self.working.record_revisions(key)
    }

    /// Tags `key` as modified in the working revision.
    pub(crate) fn append_record_revision(&mut self, key: NodeKey) {
        let revision = self.working.revision();
        let revisions = self.working.record_revisions.entry(key).or_default();
        if revisions.last() != Some(&revision) {
            revisions.push(revision);
        }
    }

    /// Publishes the working copy and starts the next one on top of it.
    ///
    /// On error the working copy is left as it was.
    pub(crate) fn commit(
        &mut self,
        trx_id: TransactionId,
        message: Option<String>,
        automatic: bool,
    ) -> CoreResult<Revision> {
        let mut root = self.working.clone();
        root.info = RevisionInfo {
            revision: self.working.revision(),
            committed_at_millis: commit_timestamp(self.base.info.committed_at_millis),
            message,
            trx_id,
            automatic,
        };

        let committed = self.store.append_revision(root)?;
        let revision = committed.revision();
        self.working = committed.next_working_copy();
        self.base = committed;
        Ok(revision)
    }

    /// Discards every change of the working copy.
    pub(crate) fn rollback(&mut self) {
        self.working = self.base.next_working_copy();
    }
}

impl NodeSource for PageTrx {
    fn node(&self, key: NodeKey) -> Option<&Node> {
        self.working.node(key)
    }
}
