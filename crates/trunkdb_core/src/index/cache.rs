//! Cache of index controllers per revision and mode.

use super::{IndexController, IndexMode};
use crate::error::CoreResult;
use crate::stats::ResourceStats;
use crate::types::Revision;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Lazily built index controllers of one resource.
///
/// Reader and writer controllers live in separate maps. Lookups of cached
/// controllers only take the map's read lock; a miss takes the construction
/// lock and checks again, so concurrent first accesses to the same key
/// build exactly one controller. Entries are never evicted.
#[derive(Debug, Default)]
pub(crate) struct IndexControllerCache {
    readers: RwLock<HashMap<Revision, Arc<IndexController>>>,
    writers: RwLock<HashMap<Revision, Arc<IndexController>>>,
    construction: Mutex<()>,
}

impl IndexControllerCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn map(&self, mode: IndexMode) -> &RwLock<HashMap<Revision, Arc<IndexController>>> {
        match mode {
            IndexMode::Read => &self.readers,
            IndexMode::Write => &self.writers,
        }
    }

    /// Returns the cached controller for `(revision, mode)` or builds it.
    pub(crate) fn get_or_build(
        &self,
        revision: Revision,
        mode: IndexMode,
        stats: &ResourceStats,
        build: impl FnOnce() -> CoreResult<IndexController>,
    ) -> CoreResult<Arc<IndexController>> {
        let map = self.map(mode);
        if let Some(controller) = map.read().get(&revision) {
            return Ok(Arc::clone(controller));
        }

        let _construction = self.construction.lock();
        if let Some(controller) = map.read().get(&revision) {
            return Ok(Arc::clone(controller));
        }

        let controller = Arc::new(build()?);
        map.write().insert(revision, Arc::clone(&controller));
        stats.record_index_controller_constructed();
        debug!(%revision, ?mode, "index controller cached");
        Ok(controller)
    }

    #[cfg(test)]
    pub(crate) fn len(&self, mode: IndexMode) -> usize {
        self.map(mode).read().len()
    }
}
