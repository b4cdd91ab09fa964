//! Read-only node transaction.

use super::cursor::Cursor;
use crate::error::CoreResult;
use crate::index::{IndexController, IndexMode};
use crate::node::{Node, NodeKind};
use crate::page::{NodeSource, PageReadOnlyTrx, RevisionInfo};
use crate::path_summary::PathSummary;
use crate::resource::ResourceShared;
use crate::types::{NodeKey, PathNodeKey, Revision, TransactionId};
use std::sync::Arc;

/// A cursor over one committed revision.
///
/// The revision is pinned for the lifetime of the transaction: commits by a
/// concurrent writer never change what it sees. Any number of read-only
/// transactions may be open on a resource at the same time.
///
/// # Example
///
/// ```rust,ignore
/// let mut rtx = resource.begin_node_read_only_trx_at(Revision::new(3))?;
/// if rtx.move_to_first_child() {
///     println!("{:?} {:?}", rtx.kind(), rtx.name());
/// }
/// ```
pub struct NodeReadOnlyTrx {
    shared: Arc<ResourceShared>,
    id: TransactionId,
    page: PageReadOnlyTrx,
    cursor: Cursor,
}

impl NodeReadOnlyTrx {
    pub(crate) fn new(shared: Arc<ResourceShared>, id: TransactionId, page: PageReadOnlyTrx) -> Self {
        shared.stats.record_read_trx_open();
        Self {
            shared,
            id,
            page,
            cursor: Cursor::new(),
        }
    }

    /// Returns the transaction id.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Returns the revision this transaction reads.
    #[must_use]
    pub fn revision_number(&self) -> Revision {
        self.page.revision()
    }

    /// Returns the commit metadata of the revision.
    #[must_use]
    pub fn revision_info(&self) -> &RevisionInfo {
        &self.page.root().info
    }

    /// Moves to `key`; returns `false` if no such node exists.
    pub fn move_to(&mut self, key: NodeKey) -> bool {
        self.cursor.move_to(&self.page, key)
    }

    /// Moves to the document root.
    pub fn move_to_document_root(&mut self) -> bool {
        self.move_to(NodeKey::DOCUMENT_ROOT)
    }

    /// Moves to the parent.
    pub fn move_to_parent(&mut self) -> bool {
        self.cursor.follow(&self.page, Node::parent)
    }

    /// Moves to the first child.
    pub fn move_to_first_child(&mut self) -> bool {
        self.cursor.follow(&self.page, Node::first_child)
    }

    /// Moves to the last child.
    pub fn move_to_last_child(&mut self) -> bool {
        self.cursor.follow(&self.page, Node::last_child)
    }

    /// Moves to the left sibling.
    pub fn move_to_left_sibling(&mut self) -> bool {
        self.cursor.follow(&self.page, Node::left_sibling)
    }

    /// Moves to the right sibling.
    pub fn move_to_right_sibling(&mut self) -> bool {
        self.cursor.follow(&self.page, Node::right_sibling)
    }

    /// Returns the node under the cursor.
    #[must_use]
    pub fn current(&self) -> Option<&Node> {
        self.cursor.current(&self.page)
    }

    /// Returns any node of the revision.
    #[must_use]
    pub fn node(&self, key: NodeKey) -> Option<&Node> {
        self.page.node(key)
    }

    /// Key of the node under the cursor.
    #[must_use]
    pub fn node_key(&self) -> NodeKey {
        self.cursor.key()
    }

    /// Kind of the node under the cursor.
    #[must_use]
    pub fn kind(&self) -> Option<NodeKind> {
        self.current().map(Node::kind)
    }

    /// Name of the node under the cursor.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.current().and_then(Node::name)
    }

    /// Value of the node under the cursor.
    #[must_use]
    pub fn value(&self) -> Option<&str> {
        self.current().and_then(Node::value)
    }

    /// Structural hash of the node under the cursor.
    #[must_use]
    pub fn hash(&self) -> u64 {
        self.current().map_or(0, Node::hash)
    }

    /// Number of children of the node under the cursor.
    #[must_use]
    pub fn child_count(&self) -> u64 {
        self.current().map_or(0, Node::child_count)
    }

    /// Number of descendants of the node under the cursor.
    #[must_use]
    pub fn descendant_count(&self) -> u64 {
        self.current().map_or(0, Node::descendant_count)
    }

    /// Path summary node of the node under the cursor.
    #[must_use]
    pub fn path_node_key(&self) -> Option<PathNodeKey> {
        self.current().and_then(Node::path_node_key)
    }

    /// Revisions in which the record `key` was modified, oldest first.
    #[must_use]
    pub fn record_revisions(&self, key: NodeKey) -> &[Revision] {
        self.page.root().record_revisions(key)
    }

    /// The path summary of the revision.
    #[must_use]
    pub fn path_summary(&self) -> &PathSummary {
        &self.page.root().path_summary
    }

    /// The reader index controller of the revision.
    ///
    /// # Errors
    ///
    /// Fails if the controller cannot be built.
    pub fn index_controller(&self) -> CoreResult<Arc<IndexController>> {
        self.shared
            .index_controller(self.revision_number(), IndexMode::Read)
    }

    /// Ends the transaction.
    pub fn close(self) {}
}

impl Drop for NodeReadOnlyTrx {
    fn drop(&mut self) {
        self.shared.stats.record_read_trx_close();
    }
}

impl std::fmt::Debug for NodeReadOnlyTrx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeReadOnlyTrx")
            .field("resource", &self.shared.name)
            .field("id", &self.id)
            .field("revision", &self.revision_number())
            .field("node_key", &self.cursor.key())
            .finish()
    }
}
