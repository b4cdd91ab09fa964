//! Core type definitions for trunkdb.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Number of an immutable revision of a resource.
///
/// Revision 0 is created together with the resource and holds only the
/// document root. Revisions are committed in strictly increasing order
/// without gaps.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Revision(pub u32);

impl Revision {
    /// The initial revision of every resource.
    pub const ZERO: Self = Self(0);

    /// Creates a revision number.
    #[must_use]
    pub const fn new(revision: u32) -> Self {
        Self(revision)
    }

    /// Returns the raw revision number.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Returns the following revision.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the preceding revision, if any.
    #[must_use]
    pub const fn previous(self) -> Option<Self> {
        match self.0.checked_sub(1) {
            Some(n) => Some(Self(n)),
            None => None,
        }
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable identity of a node across revisions.
///
/// Keys are allocated monotonically per resource and a committed key is
/// never reused, so a key identifies the same logical record in every
/// revision it exists in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeKey(pub u64);

impl NodeKey {
    /// Key of the document root node.
    pub const DOCUMENT_ROOT: Self = Self(0);

    /// Creates a node key.
    #[must_use]
    pub const fn new(key: u64) -> Self {
        Self(key)
    }

    /// Returns the raw key value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Key of a node in the path summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PathNodeKey(pub u64);

impl PathNodeKey {
    /// Key of the path summary root.
    pub const ROOT: Self = Self(0);

    /// Creates a path node key.
    #[must_use]
    pub const fn new(key: u64) -> Self {
        Self(key)
    }

    /// Returns the raw key value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PathNodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "path:{}", self.0)
    }
}

/// Unique identifier for a node transaction.
///
/// Transaction IDs are monotonically increasing per resource and never reused.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Creates a new transaction ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "trx:{}", self.0)
    }
}

/// Identity of a resource, assigned at creation and stored in every
/// commit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceId(Uuid);

impl ResourceId {
    /// Generates a fresh random resource ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revision_navigation() {
        let r = Revision::new(4);
        assert_eq!(r.next(), Revision::new(5));
        assert_eq!(r.previous(), Some(Revision::new(3)));
        assert_eq!(Revision::ZERO.previous(), None);
    }

    #[test]
    fn transaction_id_ordering() {
        let t1 = TransactionId::new(1);
        let t2 = TransactionId::new(2);
        assert!(t1 < t2);
        assert_eq!(format!("{t2}"), "trx:2");
    }

    #[test]
    fn node_key_display() {
        assert_eq!(NodeKey::new(42).to_string(), "#42");
        assert_eq!(NodeKey::DOCUMENT_ROOT.as_u64(), 0);
    }

    #[test]
    fn resource_ids_are_unique() {
        let a = ResourceId::generate();
        let b = ResourceId::generate();
        assert_ne!(a, b);
        assert_eq!(ResourceId::from_uuid(*a.as_uuid()), a);
    }
}
