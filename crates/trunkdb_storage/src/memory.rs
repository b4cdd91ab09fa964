//! In-memory storage backend.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Shared {
    data: RwLock<Vec<u8>>,
    failing_appends: AtomicUsize,
}

/// An in-memory storage backend.
///
/// Clones share the same bytes, which lets a test drop a resource and
/// reopen it from "the same disk". Writes can be made to fail on purpose
/// with [`InMemoryBackend::fail_next_appends`] to exercise commit failure
/// paths.
///
/// # Example
///
/// ```rust
/// use trunkdb_storage::{InMemoryBackend, StorageBackend};
///
/// let backend = InMemoryBackend::new();
/// let reopened = backend.clone();
/// backend.append(b"abc").unwrap();
/// assert_eq!(reopened.size().unwrap(), 3);
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    shared: Arc<Shared>,
}

impl InMemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend preloaded with `data`.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            shared: Arc::new(Shared {
                data: RwLock::new(data),
                failing_appends: AtomicUsize::new(0),
            }),
        }
    }

    /// Returns a copy of the stored bytes.
    #[must_use]
    pub fn bytes(&self) -> Vec<u8> {
        self.shared.data.read().clone()
    }

    /// Makes the next `count` appends fail with [`StorageError::InjectedFault`].
    pub fn fail_next_appends(&self, count: usize) {
        self.shared.failing_appends.store(count, Ordering::SeqCst);
    }

    fn take_fault(&self) -> bool {
        self.shared
            .failing_appends
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl StorageBackend for InMemoryBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let data = self.shared.data.read();
        let size = data.len() as u64;
        let end = offset.saturating_add(len as u64);

        if end > size {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }

        Ok(data[offset as usize..end as usize].to_vec())
    }

    fn append(&self, bytes: &[u8]) -> StorageResult<u64> {
        if self.take_fault() {
            return Err(StorageError::InjectedFault);
        }
        let mut data = self.shared.data.write();
        let offset = data.len() as u64;
        data.extend_from_slice(bytes);
        Ok(offset)
    }

    fn sync(&self) -> StorageResult<()> {
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.shared.data.read().len() as u64)
    }

    fn truncate(&self, new_size: u64) -> StorageResult<()> {
        let mut data = self.shared.data.write();
        let size = data.len() as u64;
        if new_size > size {
            return Err(StorageError::TruncateBeyondEnd {
                requested: new_size,
                size,
            });
        }
        data.truncate(new_size as usize);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn append_returns_running_offsets() {
        let backend = InMemoryBackend::new();
        assert_eq!(backend.append(b"rev0").unwrap(), 0);
        assert_eq!(backend.append(b"rev1!").unwrap(), 4);
        assert_eq!(backend.size().unwrap(), 9);
    }

    #[test]
    fn read_back_slices() {
        let backend = InMemoryBackend::new();
        backend.append(b"hello world").unwrap();
        assert_eq!(backend.read_at(6, 5).unwrap(), b"world");
        assert!(backend.read_at(11, 0).unwrap().is_empty());
    }

    #[test]
    fn read_past_end_fails() {
        let backend = InMemoryBackend::new();
        backend.append(b"hello").unwrap();
        assert!(matches!(
            backend.read_at(3, 10),
            Err(StorageError::ReadPastEnd { size: 5, .. })
        ));
    }

    #[test]
    fn clones_share_bytes() {
        let backend = InMemoryBackend::new();
        let other = backend.clone();
        backend.append(b"shared").unwrap();
        assert_eq!(other.bytes(), b"shared");
    }

    #[test]
    fn injected_faults_leave_store_untouched() {
        let backend = InMemoryBackend::new();
        backend.append(b"ok").unwrap();
        backend.fail_next_appends(2);

        assert!(matches!(
            backend.append(b"lost"),
            Err(StorageError::InjectedFault)
        ));
        assert!(backend.append(b"lost").is_err());
        assert_eq!(backend.size().unwrap(), 2);

        backend.append(b"!").unwrap();
        assert_eq!(backend.bytes(), b"ok!");
    }

    #[test]
    fn truncate_drops_tail() {
        let backend = InMemoryBackend::with_data(b"good-torn".to_vec());
        backend.truncate(4).unwrap();
        assert_eq!(backend.bytes(), b"good");
        assert!(matches!(
            backend.truncate(10),
            Err(StorageError::TruncateBeyondEnd { requested: 10, size: 4 })
        ));
    }

    #[derive(Debug, Clone)]
    enum Step {
        Append(Vec<u8>),
        Truncate(u64),
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![
            3 => prop::collection::vec(any::<u8>(), 0..64).prop_map(Step::Append),
            1 => (0u64..256).prop_map(Step::Truncate),
        ]
    }

    proptest! {
        #[test]
        fn backends_behave_like_a_byte_vector(steps in prop::collection::vec(step(), 1..32)) {
            let dir = tempfile::tempdir().unwrap();
            let file = crate::FileBackend::open(&dir.path().join("log")).unwrap();
            let memory = InMemoryBackend::new();
            let backends: [&dyn StorageBackend; 2] = [&memory, &file];
            let mut model: Vec<u8> = Vec::new();

            for step in &steps {
                match step {
                    Step::Append(bytes) => {
                        for backend in backends {
                            prop_assert_eq!(backend.append(bytes).unwrap(), model.len() as u64);
                        }
                        model.extend_from_slice(bytes);
                    }
                    Step::Truncate(size) => {
                        for backend in backends {
                            let result = backend.truncate(*size);
                            prop_assert_eq!(result.is_ok(), *size <= model.len() as u64);
                        }
                        if *size <= model.len() as u64 {
                            model.truncate(*size as usize);
                        }
                    }
                }
            }

            for backend in backends {
                prop_assert_eq!(backend.size().unwrap(), model.len() as u64);
                prop_assert_eq!(backend.read_at(0, model.len()).unwrap(), model.clone());
                let past_end = backend.read_at(model.len() as u64, 1).is_err();
                prop_assert!(past_end);
            }
        }
    }
}
