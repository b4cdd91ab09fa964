//! Buffer manager caching decoded revision snapshots.

use super::RevisionRoot;
use crate::types::{ResourceId, Revision};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Cache key of a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct PageKey {
    resource: ResourceId,
    revision: Revision,
}

/// Bounded LRU cache of committed revision snapshots.
///
/// Only committed, immutable snapshots are inserted, so a cached entry can
/// be handed to any number of readers without copying.
pub(crate) struct BufferManager {
    cache: Mutex<LruCache<PageKey, Arc<RevisionRoot>>>,
}

impl BufferManager {
    pub(crate) fn new(capacity: NonZeroUsize) -> Self {
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub(crate) fn get(&self, resource: ResourceId, revision: Revision) -> Option<Arc<RevisionRoot>> {
        self.cache
            .lock()
            .get(&PageKey { resource, revision })
            .cloned()
    }

    pub(crate) fn insert(&self, root: Arc<RevisionRoot>) {
        let key = PageKey {
            resource: root.resource_id,
            revision: root.revision(),
        };
        self.cache.lock().put(key, root);
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.cache.lock().len()
    }
}

impl std::fmt::Debug for BufferManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cache = self.cache.lock();
        f.debug_struct("BufferManager")
            .field("len", &cache.len())
            .field("capacity", &cache.cap())
            .finish()
    }
}
