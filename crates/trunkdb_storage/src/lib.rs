//! # trunkdb Storage
//!
//! Byte-store backends underneath the trunkdb revision log.
//!
//! A backend is an **opaque, append-only byte store**. It knows nothing
//! about revisions, pages or nodes; `trunkdb_core` frames and interprets
//! every byte it writes here.
//!
//! ## Design Principles
//!
//! - Appends are the only way data enters a backend
//! - `truncate` exists solely to cut a torn tail off during recovery
//! - All methods take `&self`, so one backend can be shared behind an `Arc`
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - Cloneable in-memory store with fault injection
//! - [`FileBackend`] - Single-file store using OS file APIs
//!
//! ## Example
//!
//! ```rust
//! use trunkdb_storage::{InMemoryBackend, StorageBackend};
//!
//! let backend = InMemoryBackend::new();
//! let offset = backend.append(b"revision 0").unwrap();
//! assert_eq!(backend.read_at(offset, 10).unwrap(), b"revision 0");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
