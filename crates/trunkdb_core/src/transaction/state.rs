//! Transaction lifecycle state.

use crate::error::{CoreError, CoreResult};
use std::fmt;

/// State of a node transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionState {
    /// The transaction accepts reads and mutations.
    Active,
    /// The transaction committed and closed itself.
    Committed,
    /// The transaction was closed with uncommitted changes, which were
    /// discarded.
    RolledBack,
    /// The transaction was closed without pending changes.
    Closed,
}

impl TransactionState {
    /// Returns `true` if the transaction is still usable.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }

    pub(crate) fn ensure_active(self, operation: &'static str) -> CoreResult<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(CoreError::InvalidTransactionState {
                state: self,
                operation,
            })
        }
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Active => "active",
            Self::Committed => "committed",
            Self::RolledBack => "rolled-back",
            Self::Closed => "closed",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_active_passes() {
        assert!(TransactionState::Active.ensure_active("commit").is_ok());
        for state in [
            TransactionState::Committed,
            TransactionState::RolledBack,
            TransactionState::Closed,
        ] {
            assert!(matches!(
                state.ensure_active("commit"),
                Err(CoreError::InvalidTransactionState {
                    operation: "commit",
                    ..
                })
            ));
        }
    }
}
