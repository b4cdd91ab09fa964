//! Read-write node transaction.
//!
//! A [`NodeTrx`] owns the write lock of its resource for its whole life. It
//! mutates a private working copy of the next revision and keeps the
//! writer-side structures in step with every mutation:
//!
//! - the path summary (when the resource keeps one)
//! - structural hashes, per the configured [`HashType`](crate::HashType)
//! - the record-to-revisions index
//! - the writer index controller of the in-progress revision
//!
//! # Commit
//!
//! A commit flushes the path summary, finalizes hashes and tags modified
//! records, in that order, and then publishes the working copy as a new
//! revision. Readers see either all of it or nothing. If any step fails the
//! in-progress revision is rolled back and the caller gets
//! [`CoreError::CommitFailure`].
//!
//! # Auto-commit
//!
//! With `max_node_count > 0` the transaction commits by itself after that
//! many mutations. With a nonzero time threshold a background thread
//! commits periodically; the transaction state then sits behind a mutex
//! that serializes foreground calls against those commits.

use super::committer::Committer;
use super::cursor::Cursor;
use super::lock::WriteGuard;
use super::state::TransactionState;
use crate::config::{AfterCommitState, CommitPolicy};
use crate::error::{CoreError, CoreResult};
use crate::hashing::NodeHashing;
use crate::index::{content_label, ChangeType, IndexController};
use crate::node::{Node, NodeContent, NodeKind};
use crate::page::{NodeSource, PageTrx};
use crate::path_summary::{PathSummary, PathSummaryWriter};
use crate::record_index::RecordToRevisionsIndex;
use crate::resource::ResourceShared;
use crate::types::{NodeKey, PathNodeKey, Revision, TransactionId};
use parking_lot::Mutex;
use std::iter;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy)]
enum Position {
    FirstChild,
    LastChild,
    RightSibling,
}

/// Everything a read-write transaction mutates.
pub(crate) struct WriteState {
    shared: Arc<ResourceShared>,
    id: TransactionId,
    page: PageTrx,
    cursor: Cursor,
    path_summary: Option<PathSummaryWriter>,
    hashing: NodeHashing,
    record_index: RecordToRevisionsIndex,
    index: Arc<IndexController>,
    policy: CommitPolicy,
    modifications: u64,
    last_commit: Instant,
    state: TransactionState,
    background_failure: Option<CoreError>,
}

impl WriteState {
    fn new(shared: Arc<ResourceShared>, id: TransactionId, policy: CommitPolicy) -> CoreResult<Self> {
        let page = PageTrx::open(Arc::clone(&shared.store))?;
        let path_summary = shared
            .config
            .with_path_summary
            .then(|| PathSummaryWriter::new(&page.base().path_summary));
        let index = shared.writer_index_controller(page.revision(), page.base())?;

        Ok(Self {
            hashing: NodeHashing::new(shared.config.hash_type),
            shared,
            id,
            page,
            cursor: Cursor::new(),
            path_summary,
            record_index: RecordToRevisionsIndex::new(),
            index,
            policy,
            modifications: 0,
            last_commit: Instant::now(),
            state: TransactionState::Active,
            background_failure: None,
        })
    }

    /// Surfaces a failed background commit, then checks the state.
    fn check_active(&mut self, operation: &'static str) -> CoreResult<()> {
        if let Some(err) = self.background_failure.take() {
            return Err(err);
        }
        self.state.ensure_active(operation)
    }

    fn current_node(&self) -> CoreResult<&Node> {
        let key = self.cursor.key();
        self.page.node(key).ok_or(CoreError::NodeNotFound { key })
    }

    fn notify_index(&self, change: ChangeType, keys: &[NodeKey]) {
        if self.index.definitions().is_empty() {
            return;
        }
        for &key in keys {
            if let Some(node) = self.page.node(key) {
                let parent = node.parent.and_then(|p| self.page.node(p));
                self.index.notify(change, node, &content_label(node, parent));
            }
        }
    }

    fn insert(&mut self, position: Position, content: &NodeContent) -> CoreResult<NodeKey> {
        self.check_active("insert")?;

        let anchor = self.current_node()?;
        let (parent_key, left, right) = match position {
            Position::FirstChild => (anchor.key, None, anchor.first_child),
            Position::LastChild => (anchor.key, anchor.last_child, None),
            Position::RightSibling => {
                let parent = anchor.parent.ok_or_else(|| {
                    CoreError::invalid_operation("the document root has no siblings")
                })?;
                (parent, Some(anchor.key), anchor.right_sibling)
            }
        };
        let parent = self
            .page
            .node(parent_key)
            .ok_or(CoreError::NodeNotFound { key: parent_key })?;

        let page = &self.page;
        let has_child = |kind: NodeKind| {
            let mut next = parent.first_child;
            while let Some(node) = next.and_then(|key| page.node(key)) {
                if node.kind == kind {
                    return true;
                }
                next = node.right_sibling;
            }
            false
        };
        let factory = &self.shared.factory;
        factory.check_placement(parent, content.kind(), &has_child)?;
        let mut node = factory.create_node(self.page.next_node_key(), parent_key, content)?;
        let key = self.page.allocate_node_key();
        node.left_sibling = left;
        node.right_sibling = right;
        self.page.put_node(node);

        if let Some(left) = left {
            self.page.node_mut(left)?.right_sibling = Some(key);
        }
        if let Some(right) = right {
            self.page.node_mut(right)?.left_sibling = Some(key);
        }
        let parent = self.page.node_mut(parent_key)?;
        parent.child_count += 1;
        if left.is_none() {
            parent.first_child = Some(key);
        }
        if right.is_none() {
            parent.last_child = Some(key);
        }
        for ancestor in iter::once(parent_key).chain(self.page.ancestors(parent_key)) {
            self.page.node_mut(ancestor)?.descendant_count += 1;
        }

        if let Some(summary) = &mut self.path_summary {
            summary.on_insert(&mut self.page, key)?;
        }
        self.hashing.after_insert(&mut self.page, key)?;
        self.record_index.record(key);
        self.notify_index(ChangeType::Insert, &[key]);

        self.cursor.set(key);
        self.after_mutation()?;
        Ok(key)
    }

    fn set_value(&mut self, value: &str) -> CoreResult<()> {
        self.check_active("set value")?;

        let node = self.current_node()?;
        let (key, kind) = (node.key, node.kind);
        self.shared.factory.check_value(kind, value)?;
        let content_hash = self
            .shared
            .factory
            .content_hash(kind, node.name(), Some(value));

        self.notify_index(ChangeType::Delete, &[key]);
        let node = self.page.node_mut(key)?;
        let old_content_hash = node.content_hash;
        node.value = Some(value.to_string());
        node.content_hash = content_hash;

        self.hashing
            .after_update(&mut self.page, key, old_content_hash)?;
        self.record_index.record(key);
        self.notify_index(ChangeType::Insert, &[key]);
        self.after_mutation()
    }

    fn set_name(&mut self, name: &str) -> CoreResult<()> {
        self.check_active("set name")?;

        let node = self.current_node()?;
        let (key, kind) = (node.key, node.kind);
        if !kind.is_named() {
            return Err(CoreError::invalid_node_kind(kind, "kind carries no name"));
        }
        let content_hash = self
            .shared
            .factory
            .content_hash(kind, Some(name), node.value());

        // Paths and content labels below the node change with its name.
        let subtree = self.page.subtree(key);
        self.notify_index(ChangeType::Delete, &subtree);
        if let Some(summary) = &mut self.path_summary {
            summary.on_remove(&mut self.page, &subtree)?;
        }

        let node = self.page.node_mut(key)?;
        let old_content_hash = node.content_hash;
        node.name = Some(name.to_string());
        node.content_hash = content_hash;

        if let Some(summary) = &mut self.path_summary {
            summary.on_reattach(&mut self.page, &subtree)?;
        }
        self.hashing
            .after_update(&mut self.page, key, old_content_hash)?;
        self.record_index.record(key);
        self.notify_index(ChangeType::Insert, &subtree);
        self.after_mutation()
    }

    fn remove(&mut self) -> CoreResult<()> {
        self.check_active("remove")?;

        let node = self.current_node()?.clone();
        let Some(parent_key) = node.parent else {
            return Err(CoreError::invalid_operation(
                "cannot remove the document root",
            ));
        };

        let subtree = self.page.subtree(node.key);
        self.notify_index(ChangeType::Delete, &subtree);
        if let Some(summary) = &mut self.path_summary {
            summary.on_remove(&mut self.page, &subtree)?;
        }

        if let Some(left) = node.left_sibling {
            self.page.node_mut(left)?.right_sibling = node.right_sibling;
        }
        if let Some(right) = node.right_sibling {
            self.page.node_mut(right)?.left_sibling = node.left_sibling;
        }
        let parent = self.page.node_mut(parent_key)?;
        parent.child_count = parent.child_count.saturating_sub(1);
        if parent.first_child == Some(node.key) {
            parent.first_child = node.right_sibling;
        }
        if parent.last_child == Some(node.key) {
            parent.last_child = node.left_sibling;
        }
        let removed = subtree.len() as u64;
        for ancestor in iter::once(parent_key).chain(self.page.ancestors(parent_key)) {
            let ancestor = self.page.node_mut(ancestor)?;
            ancestor.descendant_count = ancestor.descendant_count.saturating_sub(removed);
        }

        for &key in &subtree {
            self.page.remove_node(key);
            self.record_index.record(key);
        }
        self.hashing
            .after_remove(&mut self.page, parent_key, node.hash)?;

        self.cursor.set(
            node.left_sibling
                .or(node.right_sibling)
                .unwrap_or(parent_key),
        );
        self.after_mutation()
    }

    fn after_mutation(&mut self) -> CoreResult<()> {
        self.modifications += 1;
        if self.policy.max_node_count > 0 && self.modifications >= self.policy.max_node_count {
            self.commit_internal(None, true)?;
        }
        Ok(())
    }

    fn commit(&mut self, message: Option<String>) -> CoreResult<Revision> {
        self.check_active("commit")?;
        let revision = self.commit_internal(message, false)?;
        if self.policy.after_commit == AfterCommitState::Close {
            self.state = TransactionState::Committed;
        }
        Ok(revision)
    }

    fn commit_internal(&mut self, message: Option<String>, automatic: bool) -> CoreResult<Revision> {
        let revision = self.page.revision();
        match self.write_revision(message, automatic) {
            Ok(committed) => {
                self.modifications = 0;
                self.last_commit = Instant::now();
                self.shared.stats.record_commit(automatic);
                self.index = self
                    .shared
                    .writer_index_controller(self.page.revision(), self.page.base())?;
                debug!(
                    resource = %self.shared.name,
                    trx_id = %self.id,
                    revision = %committed,
                    automatic,
                    "revision committed"
                );
                Ok(committed)
            }
            Err(err) => {
                warn!(
                    resource = %self.shared.name,
                    trx_id = %self.id,
                    %revision,
                    error = %err,
                    "commit failed, rolling back"
                );
                self.rollback_internal();
                self.shared.stats.record_commit_failure();
                Err(CoreError::commit_failure(revision, err))
            }
        }
    }

    fn write_revision(&mut self, message: Option<String>, automatic: bool) -> CoreResult<Revision> {
        if let Some(summary) = &mut self.path_summary {
            summary.flush(&mut self.page);
        }
        self.hashing.flush(&mut self.page)?;
        self.record_index.flush(&mut self.page);
        self.page.commit(self.id, message, automatic)
    }

    fn rollback(&mut self) -> CoreResult<Revision> {
        self.check_active("rollback")?;
        self.rollback_internal();
        self.shared.stats.record_rollback();
        Ok(self.page.base().revision())
    }

    fn rollback_internal(&mut self) {
        self.page.rollback();
        if let Some(summary) = &mut self.path_summary {
            summary.reset(&self.page.base().path_summary);
        }
        self.hashing.reset();
        self.record_index.reset();
        self.index.reinitialize(self.page.base());
        self.modifications = 0;
        self.cursor = Cursor::new();
    }

    fn close(&mut self) -> CoreResult<()> {
        let failure = self.background_failure.take();
        if self.state.is_active() {
            if self.modifications > 0 {
                self.rollback_internal();
                self.shared.stats.record_rollback();
                self.state = TransactionState::RolledBack;
            } else {
                self.state = TransactionState::Closed;
            }
            debug!(resource = %self.shared.name, trx_id = %self.id, state = %self.state, "write transaction closed");
        }
        failure.map_or(Ok(()), Err)
    }

    /// One tick of the background committer.
    pub(crate) fn tick(&mut self, interval: Duration) {
        if !self.state.is_active()
            || self.modifications == 0
            || self.last_commit.elapsed() < interval
        {
            return;
        }
        if let Err(err) = self.commit_internal(None, true) {
            self.background_failure = Some(err);
        }
    }
}

/// The transaction state, behind a mutex only when a committer thread
/// shares it.
enum WriteCell {
    Exclusive(Box<WriteState>),
    Shared(Arc<Mutex<WriteState>>),
}

impl WriteCell {
    fn read<R>(&self, f: impl FnOnce(&WriteState) -> R) -> R {
        match self {
            Self::Exclusive(state) => f(&**state),
            Self::Shared(state) => f(&*state.lock()),
        }
    }

    fn write<R>(&mut self, f: impl FnOnce(&mut WriteState) -> R) -> R {
        match self {
            Self::Exclusive(state) => f(&mut **state),
            Self::Shared(state) => f(&mut *state.lock()),
        }
    }
}

/// A read-write transaction over the next revision of a resource.
///
/// At most one exists per resource at any time; it holds the resource's
/// write lock until it is closed or dropped. The cursor starts at the
/// document root, and every insert moves it to the new node.
///
/// Accessors return owned values because the state may be shared with the
/// background committer.
///
/// # Example
///
/// ```rust,ignore
/// let mut wtx = resource.begin_node_trx(CommitPolicy::new())?;
/// wtx.insert_first_child(&NodeContent::object())?;
/// wtx.insert_first_child(&NodeContent::object_key("title"))?;
/// wtx.insert_first_child(&NodeContent::string("Dune"))?;
/// let revision = wtx.commit()?;
/// wtx.close()?;
/// ```
pub struct NodeTrx {
    id: TransactionId,
    resource: String,
    cell: WriteCell,
    committer: Option<Committer>,
    guard: Option<WriteGuard>,
}

impl NodeTrx {
    pub(crate) fn begin(shared: Arc<ResourceShared>, policy: CommitPolicy) -> CoreResult<Self> {
        let id = shared.next_trx_id();
        let guard = shared
            .write_lock
            .acquire(&shared.name, id, shared.config.write_lock_timeout)?;

        let interval = policy.time_threshold();
        let committer = if interval.is_zero() {
            None
        } else {
            Some(Committer::spawn(&shared.name)?)
        };

        let resource = shared.name.clone();
        let state = WriteState::new(Arc::clone(&shared), id, policy)?;
        let cell = match &committer {
            Some(committer) => {
                let state = Arc::new(Mutex::new(state));
                committer.bind(&state, interval);
                WriteCell::Shared(state)
            }
            None => WriteCell::Exclusive(Box::new(state)),
        };
        shared.stats.record_write_trx_start();
        debug!(resource = %resource, trx_id = %id, ?policy, "write transaction started");

        Ok(Self {
            id,
            resource,
            cell,
            committer,
            guard: Some(guard),
        })
    }

    /// Returns the transaction id.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Returns the revision the next commit will create.
    #[must_use]
    pub fn revision_number(&self) -> Revision {
        self.cell.read(|s| s.page.revision())
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.cell.read(|s| s.state)
    }

    /// Returns the number of mutations since the last commit.
    #[must_use]
    pub fn modification_count(&self) -> u64 {
        self.cell.read(|s| s.modifications)
    }

    /// Returns `true` if a count or time threshold is configured.
    #[must_use]
    pub fn is_auto_committing(&self) -> bool {
        self.cell.read(|s| s.policy.is_auto_committing())
    }

    /// Returns the commit policy.
    #[must_use]
    pub fn commit_policy(&self) -> CommitPolicy {
        self.cell.read(|s| s.policy)
    }

    /// Moves to `key`; returns `false` if no such node exists.
    pub fn move_to(&mut self, key: NodeKey) -> bool {
        self.cell.write(|s| s.cursor.move_to(&s.page, key))
    }

    /// Moves to the document root.
    pub fn move_to_document_root(&mut self) -> bool {
        self.move_to(NodeKey::DOCUMENT_ROOT)
    }

    /// Moves to the parent.
    pub fn move_to_parent(&mut self) -> bool {
        self.cell.write(|s| s.cursor.follow(&s.page, Node::parent))
    }

    /// Moves to the first child.
    pub fn move_to_first_child(&mut self) -> bool {
        self.cell.write(|s| s.cursor.follow(&s.page, Node::first_child))
    }

    /// Moves to the last child.
    pub fn move_to_last_child(&mut self) -> bool {
        self.cell.write(|s| s.cursor.follow(&s.page, Node::last_child))
    }

    /// Moves to the left sibling.
    pub fn move_to_left_sibling(&mut self) -> bool {
        self.cell.write(|s| s.cursor.follow(&s.page, Node::left_sibling))
    }

    /// Moves to the right sibling.
    pub fn move_to_right_sibling(&mut self) -> bool {
        self.cell.write(|s| s.cursor.follow(&s.page, Node::right_sibling))
    }

    /// Returns a copy of the node under the cursor.
    #[must_use]
    pub fn current(&self) -> Option<Node> {
        self.cell.read(|s| s.cursor.current(&s.page).cloned())
    }

    /// Returns a copy of any node of the working copy.
    #[must_use]
    pub fn node(&self, key: NodeKey) -> Option<Node> {
        self.cell.read(|s| s.page.node(key).cloned())
    }

    /// Key of the node under the cursor.
    #[must_use]
    pub fn node_key(&self) -> NodeKey {
        self.cell.read(|s| s.cursor.key())
    }

    /// Kind of the node under the cursor.
    #[must_use]
    pub fn kind(&self) -> Option<NodeKind> {
        self.cell.read(|s| s.cursor.current(&s.page).map(Node::kind))
    }

    /// Name of the node under the cursor.
    #[must_use]
    pub fn name(&self) -> Option<String> {
        self.cell
            .read(|s| s.cursor.current(&s.page).and_then(Node::name).map(str::to_string))
    }

    /// Value of the node under the cursor.
    #[must_use]
    pub fn value(&self) -> Option<String> {
        self.cell
            .read(|s| s.cursor.current(&s.page).and_then(Node::value).map(str::to_string))
    }

    /// Structural hash of the node under the cursor.
    ///
    /// With [`HashType::Postorder`](crate::HashType::Postorder) hashes of
    /// touched nodes are final only after the next commit.
    #[must_use]
    pub fn hash(&self) -> u64 {
        self.cell.read(|s| s.cursor.current(&s.page).map_or(0, Node::hash))
    }

    /// Number of children of the node under the cursor.
    #[must_use]
    pub fn child_count(&self) -> u64 {
        self.cell
            .read(|s| s.cursor.current(&s.page).map_or(0, Node::child_count))
    }

    /// Number of descendants of the node under the cursor.
    #[must_use]
    pub fn descendant_count(&self) -> u64 {
        self.cell
            .read(|s| s.cursor.current(&s.page).map_or(0, Node::descendant_count))
    }

    /// Path summary node of the node under the cursor.
    #[must_use]
    pub fn path_node_key(&self) -> Option<PathNodeKey> {
        self.cell
            .read(|s| s.cursor.current(&s.page).and_then(Node::path_node_key))
    }

    /// Committed revisions in which the record `key` was modified.
    #[must_use]
    pub fn record_revisions(&self, key: NodeKey) -> Vec<Revision> {
        self.cell.read(|s| s.page.record_revisions(key).to_vec())
    }

    /// The path summary including uncommitted changes, `None` if the
    /// resource keeps no path summary.
    #[must_use]
    pub fn path_summary(&self) -> Option<PathSummary> {
        self.cell
            .read(|s| s.path_summary.as_ref().map(|w| w.summary().clone()))
    }

    /// The writer index controller of the in-progress revision.
    #[must_use]
    pub fn index_controller(&self) -> Arc<IndexController> {
        self.cell.read(|s| Arc::clone(&s.index))
    }

    /// Inserts a node as the first child of the current node and moves to it.
    ///
    /// # Errors
    ///
    /// `InvalidNodeKind` if the node factory rejects the content here,
    /// `InvalidTransactionState` unless active, or the failure of an
    /// automatic commit this insert triggered.
    pub fn insert_first_child(&mut self, content: &NodeContent) -> CoreResult<NodeKey> {
        self.cell.write(|s| s.insert(Position::FirstChild, content))
    }

    /// Inserts a node as the last child of the current node and moves to it.
    ///
    /// # Errors
    ///
    /// Same as [`insert_first_child`](Self::insert_first_child).
    pub fn insert_last_child(&mut self, content: &NodeContent) -> CoreResult<NodeKey> {
        self.cell.write(|s| s.insert(Position::LastChild, content))
    }

    /// Inserts a node as the right sibling of the current node and moves to it.
    ///
    /// # Errors
    ///
    /// Same as [`insert_first_child`](Self::insert_first_child);
    /// `InvalidOperation` on the document root.
    pub fn insert_right_sibling(&mut self, content: &NodeContent) -> CoreResult<NodeKey> {
        self.cell.write(|s| s.insert(Position::RightSibling, content))
    }

    /// Replaces the value of the current node.
    ///
    /// # Errors
    ///
    /// `InvalidNodeKind` if the kind carries no value or rejects this one.
    pub fn set_value(&mut self, value: &str) -> CoreResult<()> {
        self.cell.write(|s| s.set_value(value))
    }

    /// Renames the current node.
    ///
    /// # Errors
    ///
    /// `InvalidNodeKind` if the kind carries no name.
    pub fn set_name(&mut self, name: &str) -> CoreResult<()> {
        self.cell.write(|s| s.set_name(name))
    }

    /// Removes the subtree rooted at the current node.
    ///
    /// The cursor moves to the left sibling, else the right sibling, else
    /// the parent.
    ///
    /// # Errors
    ///
    /// `InvalidOperation` on the document root.
    pub fn remove(&mut self) -> CoreResult<()> {
        self.cell.write(WriteState::remove)
    }

    /// Commits the working copy as a new revision.
    ///
    /// # Errors
    ///
    /// `CommitFailure` if a commit step failed; the in-progress revision is
    /// rolled back and the transaction stays active.
    pub fn commit(&mut self) -> CoreResult<Revision> {
        self.commit_with(None)
    }

    /// Commits with a message stored in the revision metadata.
    ///
    /// # Errors
    ///
    /// Same as [`commit`](Self::commit).
    pub fn commit_with_message(&mut self, message: impl Into<String>) -> CoreResult<Revision> {
        self.commit_with(Some(message.into()))
    }

    fn commit_with(&mut self, message: Option<String>) -> CoreResult<Revision> {
        let (result, active) = self.cell.write(|s| (s.commit(message), s.state.is_active()));
        if !active {
            self.release();
        }
        result
    }

    /// Discards all uncommitted changes. The transaction stays active.
    ///
    /// Returns the revision the working copy is based on again.
    ///
    /// # Errors
    ///
    /// `InvalidTransactionState` unless active.
    pub fn rollback(&mut self) -> CoreResult<Revision> {
        self.cell.write(WriteState::rollback)
    }

    /// Closes the transaction, rolling back uncommitted changes, and
    /// releases the write lock. Closing again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns a background commit failure that was not reported yet. The
    /// lock is released regardless.
    pub fn close(&mut self) -> CoreResult<()> {
        // The committer must be stopped before taking the state lock.
        if let Some(mut committer) = self.committer.take() {
            committer.shutdown();
        }
        let result = self.cell.write(WriteState::close);
        self.release();
        result
    }

    fn release(&mut self) {
        if let Some(mut committer) = self.committer.take() {
            committer.shutdown();
        }
        self.guard = None;
    }
}

impl Drop for NodeTrx {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(resource = %self.resource, trx_id = %self.id, error = %err, "error closing dropped write transaction");
        }
    }
}

impl std::fmt::Debug for NodeTrx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeTrx")
            .field("resource", &self.resource)
            .field("id", &self.id)
            .field("state", &self.state())
            .field("revision", &self.revision_number())
            .finish_non_exhaustive()
    }
}
