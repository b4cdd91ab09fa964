//! Resource statistics.
//!
//! Counters are updated by the resource manager and its transactions and can
//! be read at any time through [`crate::ResourceManager::stats`].

use std::sync::atomic::{AtomicU64, Ordering};

/// Resource statistics.
///
/// All counters are atomic and monotonically increasing, except
/// `open_read_trxs`, which is a gauge.
#[derive(Debug, Default)]
pub struct ResourceStats {
    read_trxs_started: AtomicU64,
    open_read_trxs: AtomicU64,
    write_trxs_started: AtomicU64,
    commits: AtomicU64,
    auto_commits: AtomicU64,
    rollbacks: AtomicU64,
    commit_failures: AtomicU64,
    index_controllers_constructed: AtomicU64,
}

impl ResourceStats {
    /// Creates a new stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_read_trx_open(&self) {
        self.read_trxs_started.fetch_add(1, Ordering::Relaxed);
        self.open_read_trxs.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_read_trx_close(&self) {
        self.open_read_trxs.fetch_sub(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write_trx_start(&self) {
        self.write_trxs_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a successful commit, automatic or explicit.
    pub(crate) fn record_commit(&self, automatic: bool) {
        self.commits.fetch_add(1, Ordering::Relaxed);
        if automatic {
            self.auto_commits.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_rollback(&self) {
        self.rollbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_commit_failure(&self) {
        self.commit_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_index_controller_constructed(&self) {
        self.index_controllers_constructed
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of read-only transactions begun.
    pub fn read_trxs_started(&self) -> u64 {
        self.read_trxs_started.load(Ordering::Relaxed)
    }

    /// Returns the number of read-only transactions currently open.
    pub fn open_read_trxs(&self) -> u64 {
        self.open_read_trxs.load(Ordering::Relaxed)
    }

    /// Returns the number of read-write transactions begun.
    pub fn write_trxs_started(&self) -> u64 {
        self.write_trxs_started.load(Ordering::Relaxed)
    }

    /// Returns the number of committed revisions, excluding revision 0.
    pub fn commits(&self) -> u64 {
        self.commits.load(Ordering::Relaxed)
    }

    /// Returns how many of the commits were automatic.
    pub fn auto_commits(&self) -> u64 {
        self.auto_commits.load(Ordering::Relaxed)
    }

    /// Returns the number of rollbacks, including implicit ones.
    pub fn rollbacks(&self) -> u64 {
        self.rollbacks.load(Ordering::Relaxed)
    }

    /// Returns the number of failed commits.
    pub fn commit_failures(&self) -> u64 {
        self.commit_failures.load(Ordering::Relaxed)
    }

    /// Returns the number of index controllers built.
    pub fn index_controllers_constructed(&self) -> u64 {
        self.index_controllers_constructed.load(Ordering::Relaxed)
    }

    /// Returns a snapshot of all stats.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            read_trxs_started: self.read_trxs_started(),
            open_read_trxs: self.open_read_trxs(),
            write_trxs_started: self.write_trxs_started(),
            commits: self.commits(),
            auto_commits: self.auto_commits(),
            rollbacks: self.rollbacks(),
            commit_failures: self.commit_failures(),
            index_controllers_constructed: self.index_controllers_constructed(),
        }
    }
}

/// A point-in-time snapshot of resource statistics.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Read-only transactions begun.
    pub read_trxs_started: u64,
    /// Read-only transactions currently open.
    pub open_read_trxs: u64,
    /// Read-write transactions begun.
    pub write_trxs_started: u64,
    /// Successful commits.
    pub commits: u64,
    /// Successful automatic commits.
    pub auto_commits: u64,
    /// Rollbacks, including implicit ones.
    pub rollbacks: u64,
    /// Failed commits.
    pub commit_failures: u64,
    /// Index controllers built.
    pub index_controllers_constructed: u64,
}
