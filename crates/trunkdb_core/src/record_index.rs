//! Reverse index from records to the revisions that modified them.

use crate::page::PageTrx;
use crate::types::NodeKey;
use std::collections::BTreeSet;

/// Collects the records modified by a read-write transaction and tags them
/// with the revision number when it commits.
///
/// Entries are only ever appended; the history of a record in earlier
/// revisions is never rewritten.
#[derive(Debug, Default)]
pub(crate) struct RecordToRevisionsIndex {
    modified: BTreeSet<NodeKey>,
}

impl RecordToRevisionsIndex {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&mut self, key: NodeKey) {
        self.modified.insert(key);
    }

    /// Appends the in-progress revision to every modified record.
    pub(crate) fn flush(&mut self, page: &mut PageTrx) {
        for key in std::mem::take(&mut self.modified) {
            page.append_record_revision(key);
        }
    }

    pub(crate) fn reset(&mut self) {
        self.modified.clear();
    }

    #[cfg(test)]
    pub(crate) fn pending(&self) -> usize {
        self.modified.len()
    }
}
