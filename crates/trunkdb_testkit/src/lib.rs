//! # trunkdb Testkit
//!
//! Test utilities for trunkdb resources.
//!
//! This crate provides:
//! - Fixtures creating resources on in-memory or temporary file backends
//! - Property-based generators of document mutations
//! - Stress helpers for writer contention and concurrent readers
//!
//! ## Usage
//!
//! ```rust,ignore
//! use trunkdb_testkit::prelude::*;
//!
//! let fixture = TestResource::memory(ResourceConfig::default());
//! let mut wtx = fixture.begin_node_trx(CommitPolicy::new()).unwrap();
//! wtx.insert_first_child(&NodeContent::object()).unwrap();
//! wtx.commit().unwrap();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod stress;

/// Re-exports for convenient testing.
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
    pub use trunkdb_core::{
        CommitPolicy, CoreError, HashType, IndexDef, IndexMode, NodeContent, NodeKey, NodeKind,
        ResourceConfig, ResourceKind, ResourceManager, Revision, TransactionState,
    };
    pub use trunkdb_storage::{FileBackend, InMemoryBackend, StorageBackend};
}
