//! Resource manager: the entry point to a resource.

use crate::config::{CommitPolicy, ResourceConfig};
use crate::error::{CoreError, CoreResult};
use crate::hashing::leaf_hash;
use crate::index::{IndexController, IndexControllerCache, IndexMode};
use crate::node::{factory_for, NodeFactory};
use crate::page::{now_millis, PageReadOnlyTrx, PageStore, RevisionInfo, RevisionRoot};
use crate::stats::ResourceStats;
use crate::transaction::{NodeReadOnlyTrx, NodeTrx, WriteLock};
use crate::types::{ResourceId, Revision, TransactionId};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;
use trunkdb_storage::StorageBackend;

/// State shared by a resource manager and all of its transactions.
pub(crate) struct ResourceShared {
    pub(crate) name: String,
    pub(crate) config: ResourceConfig,
    pub(crate) store: Arc<PageStore>,
    pub(crate) write_lock: Arc<WriteLock>,
    pub(crate) factory: Arc<dyn NodeFactory>,
    pub(crate) stats: ResourceStats,
    indexes: IndexControllerCache,
    next_trx_id: AtomicU64,
    closed: AtomicBool,
}

impl ResourceShared {
    pub(crate) fn next_trx_id(&self) -> TransactionId {
        TransactionId::new(self.next_trx_id.fetch_add(1, Ordering::SeqCst))
    }

    fn ensure_open(&self) -> CoreResult<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(CoreError::ResourceClosed {
                name: self.name.clone(),
            })
        } else {
            Ok(())
        }
    }

    /// Cached controller for `(revision, mode)`.
    ///
    /// A reader controller scans the committed `revision`. A writer
    /// controller for a committed `revision` holds that revision's state;
    /// for the revision in progress it starts from the latest committed
    /// one, which is what the running writer started from.
    pub(crate) fn index_controller(
        &self,
        revision: Revision,
        mode: IndexMode,
    ) -> CoreResult<Arc<IndexController>> {
        let latest = self.store.latest_revision();
        let base = match mode {
            IndexMode::Read => revision,
            IndexMode::Write if revision.as_u32() > latest.as_u32() + 1 => {
                return Err(CoreError::RevisionNotFound { revision, latest });
            }
            IndexMode::Write if revision.as_u32() <= latest.as_u32() => revision,
            IndexMode::Write => latest,
        };
        self.indexes.get_or_build(revision, mode, &self.stats, || {
            let root = self.store.load(base)?;
            Ok(IndexController::build(
                revision,
                mode,
                &self.config.indexes,
                &root,
            ))
        })
    }

    /// Writer controller for `revision`, built from the writer's own base.
    pub(crate) fn writer_index_controller(
        &self,
        revision: Revision,
        base: &RevisionRoot,
    ) -> CoreResult<Arc<IndexController>> {
        self.indexes
            .get_or_build(revision, IndexMode::Write, &self.stats, || {
                Ok(IndexController::build(
                    revision,
                    IndexMode::Write,
                    &self.config.indexes,
                    base,
                ))
            })
    }
}

/// Handle to one resource.
///
/// A `ResourceManager` creates the transactions of its resource, enforces
/// that at most one read-write transaction is open at a time, and owns the
/// caches shared by all transactions. It is cheap to clone; clones refer
/// to the same resource.
///
/// # Example
///
/// ```rust,ignore
/// use trunkdb_core::{CommitPolicy, NodeContent, ResourceConfig, ResourceManager};
/// use trunkdb_storage::InMemoryBackend;
/// use std::sync::Arc;
///
/// let resource = ResourceManager::create(
///     "books",
///     Arc::new(InMemoryBackend::new()),
///     ResourceConfig::default(),
/// )?;
///
/// let mut wtx = resource.begin_node_trx(CommitPolicy::new())?;
/// wtx.insert_first_child(&NodeContent::array())?;
/// wtx.commit()?;
/// wtx.close()?;
///
/// let rtx = resource.begin_node_read_only_trx()?;
/// assert_eq!(rtx.revision_number().as_u32(), 1);
/// ```
#[derive(Clone)]
pub struct ResourceManager {
    shared: Arc<ResourceShared>,
}

impl ResourceManager {
    /// Creates a new resource on an empty backend.
    ///
    /// Commits revision 0, which holds only the document root.
    ///
    /// # Errors
    ///
    /// `ResourceExists` if the backend is not empty, `InvalidOperation` for
    /// an invalid configuration, or a storage error.
    pub fn create(
        name: impl Into<String>,
        backend: Arc<dyn StorageBackend>,
        config: ResourceConfig,
    ) -> CoreResult<Self> {
        let name = name.into();
        config.validate()?;
        if backend.size()? > 0 {
            return Err(CoreError::ResourceExists { name });
        }

        let factory = factory_for(config.resource_kind, config.node_hash_function);
        let mut document_root = factory.create_document_root();
        document_root.hash = leaf_hash(config.hash_type, &document_root);
        let initial = RevisionRoot::initial(
            ResourceId::generate(),
            config.resource_kind,
            document_root,
            now_millis(),
        );
        let store = PageStore::create(backend, capacity(&config)?, initial)?;
        info!(resource = %name, id = %store.resource_id(), kind = ?config.resource_kind, "resource created");

        Ok(Self::assemble(name, config, store, factory, 1))
    }

    /// Opens an existing resource, recovering its revision history.
    ///
    /// A torn record at the end of the log, left by a crash during a
    /// commit, is cut off; the resource then ends at the last intact
    /// revision.
    ///
    /// # Errors
    ///
    /// `ResourceNotFound` if the backend is empty, `InvalidFormat` if the
    /// log is malformed or holds another document model than configured.
    pub fn open(
        name: impl Into<String>,
        backend: Arc<dyn StorageBackend>,
        config: ResourceConfig,
    ) -> CoreResult<Self> {
        let name = name.into();
        config.validate()?;
        if backend.size()? == 0 {
            return Err(CoreError::ResourceNotFound { name });
        }

        let (store, latest, report) = PageStore::open(backend, capacity(&config)?)?;
        if latest.resource_kind != config.resource_kind {
            return Err(CoreError::invalid_format(format!(
                "resource '{name}' stores {:?} documents, configured for {:?}",
                latest.resource_kind, config.resource_kind
            )));
        }
        let next_trx_id = store
            .history()
            .iter()
            .map(|info| info.trx_id().as_u64())
            .max()
            .unwrap_or(0)
            + 1;
        info!(
            resource = %name,
            id = %store.resource_id(),
            revisions = report.revisions,
            truncated_bytes = report.truncated_bytes,
            "resource opened"
        );

        let factory = factory_for(config.resource_kind, config.node_hash_function);
        Ok(Self::assemble(name, config, store, factory, next_trx_id))
    }

    fn assemble(
        name: String,
        config: ResourceConfig,
        store: PageStore,
        factory: Arc<dyn NodeFactory>,
        next_trx_id: u64,
    ) -> Self {
        Self {
            shared: Arc::new(ResourceShared {
                name,
                config,
                store: Arc::new(store),
                write_lock: WriteLock::new(),
                factory,
                stats: ResourceStats::new(),
                indexes: IndexControllerCache::new(),
                next_trx_id: AtomicU64::new(next_trx_id),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Opens a read-only transaction on the most recent revision.
    ///
    /// # Errors
    ///
    /// `ResourceClosed` after [`close`](Self::close).
    pub fn begin_node_read_only_trx(&self) -> CoreResult<NodeReadOnlyTrx> {
        self.begin_node_read_only_trx_at(self.most_recent_revision())
    }

    /// Opens a read-only transaction on a committed revision.
    ///
    /// # Errors
    ///
    /// `RevisionNotFound` if `revision` is not committed.
    pub fn begin_node_read_only_trx_at(&self, revision: Revision) -> CoreResult<NodeReadOnlyTrx> {
        self.shared.ensure_open()?;
        let page = PageReadOnlyTrx::open(&self.shared.store, revision)?;
        let id = self.shared.next_trx_id();
        Ok(NodeReadOnlyTrx::new(Arc::clone(&self.shared), id, page))
    }

    /// Opens a read-only transaction on the revision that was current at
    /// `time`: the last one committed at or before it, or revision 0.
    ///
    /// # Errors
    ///
    /// `ResourceClosed` after [`close`](Self::close).
    pub fn begin_node_read_only_trx_at_time(&self, time: SystemTime) -> CoreResult<NodeReadOnlyTrx> {
        let millis = time
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0);
        self.begin_node_read_only_trx_at(self.shared.store.revision_at(millis))
    }

    /// Opens the read-write transaction of this resource.
    ///
    /// Blocks while another read-write transaction is open, at most for
    /// the configured `write_lock_timeout`.
    ///
    /// # Errors
    ///
    /// `LockTimeout` if the write lock was not acquired in time,
    /// `ResourceClosed` after [`close`](Self::close).
    pub fn begin_node_trx(&self, policy: CommitPolicy) -> CoreResult<NodeTrx> {
        self.shared.ensure_open()?;
        NodeTrx::begin(Arc::clone(&self.shared), policy)
    }

    /// Returns the index controller for `(revision, mode)`, building it on
    /// first access.
    ///
    /// Concurrent first accesses build it once and all get the same
    /// instance. The writer controller of the in-progress revision is the
    /// one the running [`NodeTrx`] updates.
    ///
    /// # Errors
    ///
    /// `RevisionNotFound` for a reader controller of an uncommitted
    /// revision or a writer controller beyond the next one.
    pub fn index_controller(
        &self,
        revision: Revision,
        mode: IndexMode,
    ) -> CoreResult<Arc<IndexController>> {
        self.shared.ensure_open()?;
        self.shared.index_controller(revision, mode)
    }

    /// Returns the most recent committed revision.
    #[must_use]
    pub fn most_recent_revision(&self) -> Revision {
        self.shared.store.latest_revision()
    }

    /// Returns the metadata of every committed revision, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<RevisionInfo> {
        self.shared.store.history()
    }

    /// Returns `true` while a read-write transaction is open.
    #[must_use]
    pub fn has_running_node_trx(&self) -> bool {
        self.shared.write_lock.holder().is_some()
    }

    /// Returns the id of the open read-write transaction.
    #[must_use]
    pub fn node_trx_id(&self) -> Option<TransactionId> {
        self.shared.write_lock.holder()
    }

    /// Returns the resource name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Returns the id assigned when the resource was created.
    #[must_use]
    pub fn resource_id(&self) -> ResourceId {
        self.shared.store.resource_id()
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &ResourceConfig {
        &self.shared.config
    }

    /// Returns the statistics.
    #[must_use]
    pub fn stats(&self) -> &ResourceStats {
        &self.shared.stats
    }

    /// Refuses new transactions from now on.
    ///
    /// Open transactions stay usable until they are closed.
    pub fn close(&self) {
        if !self.shared.closed.swap(true, Ordering::AcqRel) {
            info!(resource = %self.shared.name, "resource closed");
        }
    }

    /// Returns `true` after [`close`](Self::close).
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for ResourceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceManager")
            .field("name", &self.shared.name)
            .field("id", &self.resource_id())
            .field("latest", &self.most_recent_revision())
            .finish_non_exhaustive()
    }
}

fn capacity(config: &ResourceConfig) -> CoreResult<NonZeroUsize> {
    NonZeroUsize::new(config.buffer_capacity)
        .ok_or_else(|| CoreError::invalid_operation("buffer capacity must be at least 1"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HashType, ResourceKind};
    use crate::index::IndexDef;
    use crate::node::NodeContent;
    use std::time::Duration;
    use trunkdb_storage::{FileBackend, InMemoryBackend};

    fn create(config: ResourceConfig) -> (ResourceManager, InMemoryBackend) {
        let backend = InMemoryBackend::new();
        let manager = ResourceManager::create("books", Arc::new(backend.clone()), config).unwrap();
        (manager, backend)
    }

    #[test]
    fn create_commits_revision_zero() {
        let (resource, _) = create(ResourceConfig::default());
        assert_eq!(resource.most_recent_revision(), Revision::ZERO);
        assert_eq!(resource.history().len(), 1);

        let rtx = resource.begin_node_read_only_trx().unwrap();
        assert_eq!(rtx.kind(), Some(crate::node::NodeKind::Document));
        assert_eq!(rtx.child_count(), 0);
        assert_ne!(rtx.hash(), 0);
    }

    #[test]
    fn create_on_used_backend_fails() {
        let (_, backend) = create(ResourceConfig::default());
        let err = ResourceManager::create("books", Arc::new(backend), ResourceConfig::default())
            .unwrap_err();
        assert!(matches!(err, CoreError::ResourceExists { .. }));
    }

    #[test]
    fn open_on_empty_backend_fails() {
        let err = ResourceManager::open(
            "books",
            Arc::new(InMemoryBackend::new()),
            ResourceConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::ResourceNotFound { .. }));
    }

    #[test]
    fn open_rejects_other_document_model() {
        let (_, backend) = create(ResourceConfig::default());
        let err = ResourceManager::open(
            "books",
            Arc::new(backend),
            ResourceConfig::new().resource_kind(ResourceKind::Xml),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::InvalidFormat { .. }));
    }

    #[test]
    fn reopen_continues_transaction_ids() {
        let (resource, backend) = create(ResourceConfig::default());
        let mut wtx = resource.begin_node_trx(CommitPolicy::new()).unwrap();
        let id = wtx.id();
        wtx.insert_first_child(&NodeContent::null()).unwrap();
        wtx.commit().unwrap();
        wtx.close().unwrap();

        let reopened =
            ResourceManager::open("books", Arc::new(backend), ResourceConfig::default()).unwrap();
        assert_eq!(reopened.resource_id(), resource.resource_id());
        assert_eq!(reopened.most_recent_revision(), Revision::new(1));
        let wtx = reopened.begin_node_trx(CommitPolicy::new()).unwrap();
        assert!(wtx.id() > id);
    }

    #[test]
    fn unknown_revision_is_reported() {
        let (resource, _) = create(ResourceConfig::default());
        let err = resource
            .begin_node_read_only_trx_at(Revision::new(4))
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::RevisionNotFound { revision, latest }
                if revision == Revision::new(4) && latest == Revision::ZERO
        ));
    }

    #[test]
    fn closed_resource_refuses_transactions() {
        let (resource, _) = create(ResourceConfig::default());
        resource.close();
        assert!(resource.is_closed());
        assert!(matches!(
            resource.begin_node_trx(CommitPolicy::new()),
            Err(CoreError::ResourceClosed { .. })
        ));
        assert!(matches!(
            resource.begin_node_read_only_trx(),
            Err(CoreError::ResourceClosed { .. })
        ));
    }

    #[test]
    fn running_writer_is_visible() {
        let (resource, _) = create(ResourceConfig::default());
        assert!(!resource.has_running_node_trx());
        let mut wtx = resource.begin_node_trx(CommitPolicy::new()).unwrap();
        assert_eq!(resource.node_trx_id(), Some(wtx.id()));
        wtx.close().unwrap();
        assert_eq!(resource.node_trx_id(), None);
    }

    #[test]
    fn lock_timeout_applies_to_second_writer() {
        let (resource, _) = create(
            ResourceConfig::new().write_lock_timeout(Duration::from_millis(30)),
        );
        let _wtx = resource.begin_node_trx(CommitPolicy::new()).unwrap();
        let err = resource.begin_node_trx(CommitPolicy::new()).unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn read_gauge_tracks_open_readers() {
        let (resource, _) = create(ResourceConfig::default());
        let a = resource.begin_node_read_only_trx().unwrap();
        let b = resource.begin_node_read_only_trx().unwrap();
        assert_eq!(resource.stats().open_read_trxs(), 2);
        a.close();
        drop(b);
        assert_eq!(resource.stats().open_read_trxs(), 0);
        assert_eq!(resource.stats().read_trxs_started(), 2);
    }

    #[test]
    fn reader_controller_reflects_committed_state() {
        let (resource, _) = create(
            ResourceConfig::new()
                .resource_kind(ResourceKind::Xml)
                .hash_type(HashType::None)
                .index(IndexDef::name(1))
                .index(IndexDef::path(2)),
        );
        let mut wtx = resource.begin_node_trx(CommitPolicy::new()).unwrap();
        let book = wtx.insert_first_child(&NodeContent::element("book")).unwrap();
        wtx.commit().unwrap();

        let rtx = resource.begin_node_read_only_trx().unwrap();
        let controller = rtx.index_controller().unwrap();
        assert_eq!(controller.lookup_name("book").unwrap(), vec![book]);
        let path = rtx.path_summary().find("/book").unwrap();
        assert_eq!(controller.lookup_path(path).unwrap(), vec![book]);
        assert!(Arc::ptr_eq(
            &controller,
            &resource.index_controller(Revision::new(1), IndexMode::Read).unwrap()
        ));
    }

    #[test]
    fn writer_controller_beyond_next_revision_is_rejected() {
        let (resource, _) = create(ResourceConfig::default());
        assert!(resource.index_controller(Revision::new(1), IndexMode::Write).is_ok());
        assert!(matches!(
            resource.index_controller(Revision::new(2), IndexMode::Write),
            Err(CoreError::RevisionNotFound { .. })
        ));
        assert!(matches!(
            resource.index_controller(Revision::new(1), IndexMode::Read),
            Err(CoreError::RevisionNotFound { .. })
        ));
    }

    #[test]
    fn writer_controller_of_committed_revision_is_stable_across_reopen() {
        let config = ResourceConfig::new().index(IndexDef::name(1));
        let (resource, backend) = create(config.clone());
        let mut wtx = resource.begin_node_trx(CommitPolicy::new()).unwrap();
        wtx.insert_first_child(&NodeContent::object()).unwrap();
        let title = wtx.insert_first_child(&NodeContent::object_key("title")).unwrap();
        wtx.insert_first_child(&NodeContent::string("x")).unwrap();
        wtx.commit().unwrap();
        wtx.close().unwrap();

        let live = resource.index_controller(Revision::new(1), IndexMode::Write).unwrap();
        let reopened = ResourceManager::open("books", Arc::new(backend), config).unwrap();
        let cold = reopened.index_controller(Revision::new(1), IndexMode::Write).unwrap();

        assert_eq!(live.lookup_name("title").unwrap(), vec![title]);
        assert_eq!(cold.lookup_name("title").unwrap(), vec![title]);

        let next = reopened.index_controller(Revision::new(2), IndexMode::Write).unwrap();
        assert_eq!(next.lookup_name("title").unwrap(), vec![title]);
    }

    #[test]
    fn file_backed_resource_keeps_history() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("books.trk");
        let resource = ResourceManager::create(
            "books",
            Arc::new(FileBackend::open(&path).unwrap()),
            ResourceConfig::default(),
        )
        .unwrap();
        let mut wtx = resource.begin_node_trx(CommitPolicy::new()).unwrap();
        wtx.insert_first_child(&NodeContent::string("Dune")).unwrap();
        wtx.commit_with_message("first").unwrap();
        wtx.close().unwrap();
        let hash = resource.begin_node_read_only_trx().unwrap().hash();

        let reopened = ResourceManager::open(
            "books",
            Arc::new(FileBackend::open(&path).unwrap()),
            ResourceConfig::default(),
        )
        .unwrap();
        assert_eq!(reopened.most_recent_revision(), Revision::new(1));
        assert_eq!(reopened.history()[1].message(), Some("first"));
        assert_eq!(reopened.begin_node_read_only_trx().unwrap().hash(), hash);
    }
}
