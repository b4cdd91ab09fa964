//! # trunkdb Core
//!
//! Resource transaction engine of trunkdb, a versioned store for JSON and
//! XML documents.
//!
//! A resource holds one document tree evolving across immutable,
//! numbered revisions. This crate provides:
//! - [`ResourceManager`], the entry point creating transactions
//! - [`NodeReadOnlyTrx`], a cursor pinned to one committed revision
//! - [`NodeTrx`], the single read-write transaction of a resource, with
//!   explicit and automatic commits
//! - per-revision [`IndexController`]s over name, path and content indexes
//! - a [`PathSummary`] of the distinct structural paths of each revision
//! - incremental structural hashes of every subtree
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use trunkdb_core::{CommitPolicy, NodeContent, ResourceConfig, ResourceManager};
//! use trunkdb_storage::InMemoryBackend;
//!
//! let resource = ResourceManager::create(
//!     "books",
//!     Arc::new(InMemoryBackend::new()),
//!     ResourceConfig::default(),
//! )?;
//!
//! let mut wtx = resource.begin_node_trx(CommitPolicy::new().max_node_count(1000))?;
//! wtx.insert_first_child(&NodeContent::object())?;
//! wtx.insert_first_child(&NodeContent::object_key("title"))?;
//! wtx.insert_first_child(&NodeContent::string("Dune"))?;
//! wtx.commit()?;
//! wtx.close()?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod hashing;
mod index;
mod node;
mod page;
mod path_summary;
mod record_index;
mod resource;
mod stats;
mod transaction;
mod types;

pub use config::{
    AfterCommitState, CommitPolicy, HashFunction, HashType, ResourceConfig, ResourceKind,
};
pub use error::{CoreError, CoreResult};
pub use index::{IndexController, IndexDef, IndexKind, IndexMode};
pub use node::{JsonNodeFactory, Node, NodeContent, NodeFactory, NodeKind, XmlNodeFactory};
pub use page::RevisionInfo;
pub use path_summary::{PathNode, PathSummary, ARRAY_LABEL};
pub use resource::ResourceManager;
pub use stats::{ResourceStats, StatsSnapshot};
pub use transaction::{NodeReadOnlyTrx, NodeTrx, TransactionState};
pub use types::{NodeKey, PathNodeKey, ResourceId, Revision, TransactionId};
