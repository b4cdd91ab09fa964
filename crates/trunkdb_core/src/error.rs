//! Error types for trunkdb core.

use crate::index::IndexKind;
use crate::node::NodeKind;
use crate::transaction::TransactionState;
use crate::types::{NodeKey, Revision};
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in trunkdb core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] trunkdb_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A commit record could not be encoded or decoded.
    #[error("codec error: {message}")]
    Codec {
        /// Description of the codec failure.
        message: String,
    },

    /// The write lock was not acquired within the configured timeout.
    #[error("write lock on resource '{resource}' not acquired within {waited:?}")]
    LockTimeout {
        /// Name of the resource.
        resource: String,
        /// How long the caller waited.
        waited: Duration,
    },

    /// The requested revision does not exist or is not committed yet.
    #[error("revision {revision} not found (most recent is {latest})")]
    RevisionNotFound {
        /// The requested revision.
        revision: Revision,
        /// The most recent committed revision.
        latest: Revision,
    },

    /// An operation was attempted outside its valid lifecycle state.
    #[error("cannot {operation} in transaction state {state}")]
    InvalidTransactionState {
        /// The state the transaction was in.
        state: TransactionState,
        /// The rejected operation.
        operation: &'static str,
    },

    /// A commit step failed; the in-progress revision was rolled back.
    #[error("commit of revision {revision} failed: {source}")]
    CommitFailure {
        /// The revision that was being committed.
        revision: Revision,
        /// The step failure that aborted the commit.
        source: Box<CoreError>,
    },

    /// No node with the given key exists in the revision.
    #[error("node {key} not found")]
    NodeNotFound {
        /// The missing node key.
        key: NodeKey,
    },

    /// The node factory rejected a node kind at this position.
    #[error("invalid node kind {kind}: {message}")]
    InvalidNodeKind {
        /// The rejected kind.
        kind: NodeKind,
        /// Why it was rejected.
        message: String,
    },

    /// The commit log or a record inside it is malformed.
    #[error("invalid resource format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },

    /// The resource does not declare an index of this kind.
    #[error("no {kind:?} index configured")]
    IndexNotFound {
        /// The requested index kind.
        kind: IndexKind,
    },

    /// The resource manager was closed.
    #[error("resource '{name}' is closed")]
    ResourceClosed {
        /// Name of the resource.
        name: String,
    },

    /// `create` was called on a backend that already holds a resource.
    #[error("resource '{name}' already exists")]
    ResourceExists {
        /// Name of the resource.
        name: String,
    },

    /// `open` was called on an empty backend.
    #[error("resource '{name}' not found")]
    ResourceNotFound {
        /// Name of the resource.
        name: String,
    },
}

impl CoreError {
    /// Creates a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates an invalid node kind error.
    pub fn invalid_node_kind(kind: NodeKind, message: impl Into<String>) -> Self {
        Self::InvalidNodeKind {
            kind,
            message: message.into(),
        }
    }

    /// Wraps a failed commit step.
    pub fn commit_failure(revision: Revision, source: CoreError) -> Self {
        Self::CommitFailure {
            revision,
            source: Box::new(source),
        }
    }

    /// Returns `true` for errors a caller may resolve by retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LockTimeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn commit_failure_exposes_cause() {
        let cause = CoreError::from(trunkdb_storage::StorageError::InjectedFault);
        let err = CoreError::commit_failure(Revision::new(3), cause);

        assert!(err.to_string().contains("revision 3"));
        let source = err.source().unwrap();
        assert!(source.to_string().contains("injected write fault"));
    }

    #[test]
    fn lock_timeout_is_retryable() {
        let err = CoreError::LockTimeout {
            resource: "docs".into(),
            waited: Duration::from_millis(5),
        };
        assert!(err.is_retryable());
        assert!(!CoreError::invalid_operation("x").is_retryable());
    }

    #[test]
    fn state_errors_name_the_operation() {
        let err = CoreError::InvalidTransactionState {
            state: TransactionState::Committed,
            operation: "insert",
        };
        assert_eq!(
            err.to_string(),
            "cannot insert in transaction state committed"
        );
    }
}
