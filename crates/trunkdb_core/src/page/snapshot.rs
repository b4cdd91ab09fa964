//! Revision snapshots and their metadata.

use super::NodeSource;
use crate::config::ResourceKind;
use crate::node::Node;
use crate::path_summary::PathSummary;
use crate::types::{NodeKey, ResourceId, Revision, TransactionId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Metadata of a committed revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionInfo {
    pub(crate) revision: Revision,
    pub(crate) committed_at_millis: u64,
    pub(crate) message: Option<String>,
    pub(crate) trx_id: TransactionId,
    pub(crate) automatic: bool,
}

impl RevisionInfo {
    pub(crate) fn pending(revision: Revision) -> Self {
        Self {
            revision,
            committed_at_millis: 0,
            message: None,
            trx_id: TransactionId::default(),
            automatic: false,
        }
    }

    /// Returns the revision number.
    #[must_use]
    pub fn revision(&self) -> Revision {
        self.revision
    }

    /// Returns the commit time in milliseconds since the Unix epoch.
    #[must_use]
    pub fn committed_at_millis(&self) -> u64 {
        self.committed_at_millis
    }

    /// Returns the commit time.
    #[must_use]
    pub fn committed_at(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(self.committed_at_millis)
    }

    /// Returns the commit message, if one was given.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Returns the transaction that committed the revision.
    #[must_use]
    pub fn trx_id(&self) -> TransactionId {
        self.trx_id
    }

    /// Returns `true` if the revision was produced by an automatic commit.
    #[must_use]
    pub fn is_automatic(&self) -> bool {
        self.automatic
    }
}

/// Immutable root of one revision.
///
/// Holds the full node tree together with the derived structures that
/// become visible in the same commit: the path summary and the
/// record-to-revision index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct RevisionRoot {
    pub(crate) resource_id: ResourceId,
    pub(crate) resource_kind: ResourceKind,
    pub(crate) info: RevisionInfo,
    pub(crate) next_node_key: u64,
    pub(crate) nodes: BTreeMap<NodeKey, Node>,
    pub(crate) path_summary: PathSummary,
    pub(crate) record_revisions: BTreeMap<NodeKey, Vec<Revision>>,
}

impl RevisionRoot {
    /// Builds revision 0, which holds only the document root.
    pub(crate) fn initial(
        resource_id: ResourceId,
        resource_kind: ResourceKind,
        document_root: Node,
        committed_at_millis: u64,
    ) -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(document_root.key, document_root);
        let mut record_revisions = BTreeMap::new();
        record_revisions.insert(NodeKey::DOCUMENT_ROOT, vec![Revision::ZERO]);

        Self {
            resource_id,
            resource_kind,
            info: RevisionInfo {
                committed_at_millis,
                ..RevisionInfo::pending(Revision::ZERO)
            },
            next_node_key: NodeKey::DOCUMENT_ROOT.as_u64() + 1,
            nodes,
            path_summary: PathSummary::new(),
            record_revisions,
        }
    }

    pub(crate) fn revision(&self) -> Revision {
        self.info.revision
    }

    pub(crate) fn record_revisions(&self, key: NodeKey) -> &[Revision] {
        self.record_revisions
            .get(&key)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Clones this root as the uncommitted working copy of the next revision.
    pub(crate) fn next_working_copy(&self) -> Self {
        let mut next = self.clone();
        next.info = RevisionInfo::pending(self.info.revision.next());
        next
    }
}

impl NodeSource for RevisionRoot {
    fn node(&self, key: NodeKey) -> Option<&Node> {
        self.nodes.get(&key)
    }
}

/// Milliseconds since the Unix epoch for the current wall-clock time.
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Commit time in Unix millis, never earlier than the `previous` commit so
/// that the history stays ordered by time even if the clock steps back.
pub(crate) fn commit_timestamp(previous: u64) -> u64 {
    now_millis().max(previous)
}
