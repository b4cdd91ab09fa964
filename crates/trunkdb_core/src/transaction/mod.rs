//! Node transactions.
//!
//! trunkdb follows a single-writer/multi-reader model per resource:
//! - any number of [`NodeReadOnlyTrx`] may be open, each pinned to one
//!   committed revision
//! - at most one [`NodeTrx`] is open, holding the resource's write lock and
//!   working on the next revision
//!
//! Both are obtained from a [`crate::ResourceManager`].

mod committer;
mod cursor;
mod lock;
mod read;
mod state;
mod write;

pub(crate) use lock::WriteLock;
pub use read::NodeReadOnlyTrx;
pub use state::TransactionState;
pub use write::NodeTrx;
