//! Test fixtures for trunkdb.

use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Once};
use tempfile::TempDir;
use trunkdb_core::{ResourceConfig, ResourceManager};
use trunkdb_storage::{FileBackend, InMemoryBackend};
use tracing_subscriber::EnvFilter;

const RESOURCE_NAME: &str = "fixture";

/// Where a [`TestResource`] keeps its bytes.
enum Location {
    Memory(InMemoryBackend),
    File {
        path: PathBuf,
        // Held so the directory outlives the resource.
        _dir: TempDir,
    },
}

/// A test resource that cleans up after itself.
pub struct TestResource {
    resource: ResourceManager,
    config: ResourceConfig,
    location: Location,
}

impl TestResource {
    /// Creates a resource on an in-memory backend.
    pub fn memory(config: ResourceConfig) -> Self {
        let backend = InMemoryBackend::new();
        let resource =
            ResourceManager::create(RESOURCE_NAME, Arc::new(backend.clone()), config.clone())
                .expect("Failed to create in-memory resource");
        Self {
            resource,
            config,
            location: Location::Memory(backend),
        }
    }

    /// Creates a resource in a temporary directory.
    pub fn file(config: ResourceConfig) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("resource.trk");
        let backend = FileBackend::open(&path).expect("Failed to open file backend");
        let resource = ResourceManager::create(RESOURCE_NAME, Arc::new(backend), config.clone())
            .expect("Failed to create file resource");
        Self {
            resource,
            config,
            location: Location::File { path, _dir: dir },
        }
    }

    /// Returns the resource manager.
    pub fn resource(&self) -> &ResourceManager {
        &self.resource
    }

    /// Returns the in-memory backend, for fault injection.
    ///
    /// # Panics
    ///
    /// Panics for file-backed fixtures.
    pub fn memory_backend(&self) -> &InMemoryBackend {
        match &self.location {
            Location::Memory(backend) => backend,
            Location::File { .. } => panic!("fixture is file-backed"),
        }
    }

    /// Returns the log file path, if file-backed.
    pub fn path(&self) -> Option<&Path> {
        match &self.location {
            Location::Memory(_) => None,
            Location::File { path, .. } => Some(path),
        }
    }

    /// Closes the resource and opens it again from the same bytes.
    pub fn reopen(&mut self) {
        self.resource.close();
        let resource = match &self.location {
            Location::Memory(backend) => ResourceManager::open(
                RESOURCE_NAME,
                Arc::new(backend.clone()),
                self.config.clone(),
            ),
            Location::File { path, .. } => {
                let backend = FileBackend::open(path).expect("Failed to reopen file backend");
                ResourceManager::open(RESOURCE_NAME, Arc::new(backend), self.config.clone())
            }
        };
        self.resource = resource.expect("Failed to reopen resource");
    }
}

impl Deref for TestResource {
    type Target = ResourceManager;

    fn deref(&self) -> &Self::Target {
        &self.resource
    }
}

/// Runs a test with an in-memory resource using the default configuration.
pub fn with_memory_resource<F, R>(f: F) -> R
where
    F: FnOnce(&ResourceManager) -> R,
{
    let fixture = TestResource::memory(ResourceConfig::default());
    f(&fixture)
}

/// Runs a test with a file-backed resource using the default configuration.
pub fn with_file_resource<F, R>(f: F) -> R
where
    F: FnOnce(&ResourceManager) -> R,
{
    let fixture = TestResource::file(ResourceConfig::default());
    f(&fixture)
}

/// Installs a `tracing` subscriber honouring `RUST_LOG`, once per process.
pub fn init_test_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        // Another harness may already have installed a subscriber.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use trunkdb_core::{CommitPolicy, NodeContent, Revision};

    #[test]
    fn memory_fixture_reopens_with_history() {
        let mut fixture = TestResource::memory(ResourceConfig::default());
        let mut wtx = fixture.begin_node_trx(CommitPolicy::new()).unwrap();
        wtx.insert_first_child(&NodeContent::object()).unwrap();
        wtx.commit().unwrap();
        wtx.close().unwrap();

        fixture.reopen();
        assert_eq!(fixture.most_recent_revision(), Revision::new(1));
        assert!(fixture.path().is_none());
    }

    #[test]
    fn file_fixture_reopens_with_history() {
        let mut fixture = TestResource::file(ResourceConfig::default());
        assert!(fixture.path().unwrap().exists());
        let mut wtx = fixture.begin_node_trx(CommitPolicy::new()).unwrap();
        wtx.insert_first_child(&NodeContent::array()).unwrap();
        wtx.commit().unwrap();
        wtx.close().unwrap();

        fixture.reopen();
        let rtx = fixture.begin_node_read_only_trx().unwrap();
        assert_eq!(rtx.revision_number(), Revision::new(1));
        assert_eq!(rtx.descendant_count(), 1);
    }

    #[test]
    fn with_memory_resource_starts_at_revision_zero() {
        let revision = with_memory_resource(|resource| resource.most_recent_revision());
        assert_eq!(revision, Revision::ZERO);
    }
}
