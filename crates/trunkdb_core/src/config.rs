//! Resource and commit-policy configuration.

use crate::error::{CoreError, CoreResult};
use crate::index::{IndexDef, IndexKind};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// The document model stored in a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    /// JSON documents (objects, arrays, keys and scalar values).
    Json,
    /// XML documents (elements, attributes, text, comments).
    Xml,
}

/// How structural node hashes are maintained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashType {
    /// No structural hashes are kept; every hash reads as zero.
    None,
    /// Hashes are updated eagerly along the ancestor path on each mutation.
    Rolling,
    /// Touched ancestors are recomputed bottom-up once, at commit.
    Postorder,
}

/// Digest used for a node's own content hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashFunction {
    /// SHA-256.
    Sha256,
    /// SHA-512 truncated to 256 bits (SHA-512/256).
    Sha512Trunc,
}

/// Configuration of a resource.
#[derive(Debug, Clone)]
pub struct ResourceConfig {
    /// Document model of the resource.
    pub resource_kind: ResourceKind,

    /// Whether a path summary is maintained.
    pub with_path_summary: bool,

    /// Structural hashing mode.
    pub hash_type: HashType,

    /// Digest used for node content hashes.
    pub node_hash_function: HashFunction,

    /// Upper bound on waiting for the write lock (`None` = wait forever).
    pub write_lock_timeout: Option<Duration>,

    /// Secondary indexes maintained for every revision.
    pub indexes: Vec<IndexDef>,

    /// Number of decoded revisions kept by the buffer manager.
    pub buffer_capacity: usize,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            resource_kind: ResourceKind::Json,
            with_path_summary: true,
            hash_type: HashType::Rolling,
            node_hash_function: HashFunction::Sha256,
            write_lock_timeout: None,
            indexes: Vec::new(),
            buffer_capacity: 64,
        }
    }
}

impl ResourceConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the document model.
    #[must_use]
    pub fn resource_kind(mut self, kind: ResourceKind) -> Self {
        self.resource_kind = kind;
        self
    }

    /// Enables or disables the path summary.
    #[must_use]
    pub fn with_path_summary(mut self, value: bool) -> Self {
        self.with_path_summary = value;
        self
    }

    /// Sets the structural hashing mode.
    #[must_use]
    pub fn hash_type(mut self, hash_type: HashType) -> Self {
        self.hash_type = hash_type;
        self
    }

    /// Sets the node content digest.
    #[must_use]
    pub fn node_hash_function(mut self, function: HashFunction) -> Self {
        self.node_hash_function = function;
        self
    }

    /// Bounds how long `begin_node_trx` waits for the write lock.
    #[must_use]
    pub fn write_lock_timeout(mut self, timeout: Duration) -> Self {
        self.write_lock_timeout = Some(timeout);
        self
    }

    /// Declares a secondary index.
    #[must_use]
    pub fn index(mut self, def: IndexDef) -> Self {
        self.indexes.push(def);
        self
    }

    /// Sets the buffer manager capacity in revisions.
    #[must_use]
    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    /// Checks the configuration for contradictions.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` if the buffer capacity is zero, an index
    /// id is declared twice, or a path index is declared without a path
    /// summary.
    pub fn validate(&self) -> CoreResult<()> {
        if self.buffer_capacity == 0 {
            return Err(CoreError::invalid_operation(
                "buffer capacity must be at least 1",
            ));
        }

        let mut ids = HashSet::new();
        for def in &self.indexes {
            if !ids.insert(def.id) {
                return Err(CoreError::invalid_operation(format!(
                    "index id {} declared twice",
                    def.id
                )));
            }
            if def.kind == IndexKind::Path && !self.with_path_summary {
                return Err(CoreError::invalid_operation(
                    "a path index requires the path summary",
                ));
            }
        }
        Ok(())
    }
}

/// What a read-write transaction does after an explicit commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AfterCommitState {
    /// Continue against the next revision.
    #[default]
    KeepOpen,
    /// Close the transaction and release the write lock.
    Close,
}

/// Auto-commit and after-commit policy of a read-write transaction.
///
/// The time threshold is `auto_commit_delay`, or `max_time` when the delay
/// is zero. Auto-commit is enabled when `max_node_count > 0` or the time
/// threshold is nonzero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CommitPolicy {
    /// Commit automatically after this many modifications (0 = never).
    pub max_node_count: u64,

    /// Commit automatically after this much time (used when `auto_commit_delay` is zero).
    pub max_time: Duration,

    /// Interval of the background committer.
    pub auto_commit_delay: Duration,

    /// Behaviour after an explicit commit.
    pub after_commit: AfterCommitState,
}

impl CommitPolicy {
    /// Creates a policy without auto-commit that stays open after commits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the modification count threshold.
    #[must_use]
    pub const fn max_node_count(mut self, count: u64) -> Self {
        self.max_node_count = count;
        self
    }

    /// Sets the maximum time between commits.
    #[must_use]
    pub const fn max_time(mut self, time: Duration) -> Self {
        self.max_time = time;
        self
    }

    /// Sets the background commit interval.
    #[must_use]
    pub const fn auto_commit_delay(mut self, delay: Duration) -> Self {
        self.auto_commit_delay = delay;
        self
    }

    /// Sets the after-commit behaviour.
    #[must_use]
    pub const fn after_commit(mut self, state: AfterCommitState) -> Self {
        self.after_commit = state;
        self
    }

    /// Returns the effective time threshold.
    #[must_use]
    pub const fn time_threshold(&self) -> Duration {
        if self.auto_commit_delay.is_zero() {
            self.max_time
        } else {
            self.auto_commit_delay
        }
    }

    /// Returns `true` if any auto-commit trigger is configured.
    #[must_use]
    pub const fn is_auto_committing(&self) -> bool {
        self.max_node_count > 0 || !self.time_threshold().is_zero()
    }
}
