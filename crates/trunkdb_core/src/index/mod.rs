//! Secondary indexes over the nodes of a revision.
//!
//! A resource declares its indexes once, as [`IndexDef`]s in its
//! configuration. For every revision an [`IndexController`] holds the
//! declared indexes for that snapshot. Controllers are built lazily and
//! cached per revision and [`IndexMode`]:
//!
//! - a `Read` controller is built by scanning a committed revision and is
//!   never changed afterwards
//! - a `Write` controller is built from the revision a writer started on
//!   and then follows the writer's uncommitted changes
//!
//! # Index Kinds
//!
//! - [`IndexKind::Path`]: node keys by path summary node
//! - [`IndexKind::Name`]: node keys by node name
//! - [`IndexKind::Content`]: node keys by (label, value), where the label is
//!   the node's own name or, for unnamed values, the name of its parent

mod cache;
mod controller;

pub(crate) use cache::IndexControllerCache;
pub use controller::IndexController;
pub(crate) use controller::content_label;

/// Kind of a secondary index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexKind {
    /// Node keys by path summary node.
    Path,
    /// Node keys by node name.
    Name,
    /// Node keys by label and value.
    Content,
}

/// Declaration of a secondary index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexDef {
    /// Identifier, unique within the resource.
    pub id: u32,
    /// What the index maps.
    pub kind: IndexKind,
}

impl IndexDef {
    /// Declares a path index.
    #[must_use]
    pub const fn path(id: u32) -> Self {
        Self {
            id,
            kind: IndexKind::Path,
        }
    }

    /// Declares a name index.
    #[must_use]
    pub const fn name(id: u32) -> Self {
        Self {
            id,
            kind: IndexKind::Name,
        }
    }

    /// Declares a content index.
    #[must_use]
    pub const fn content(id: u32) -> Self {
        Self {
            id,
            kind: IndexKind::Content,
        }
    }
}

/// Whether a controller serves readers or the writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexMode {
    /// Reflects one committed revision.
    Read,
    /// Follows the uncommitted changes of the writer.
    Write,
}

/// A change reported by the writer to its index controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChangeType {
    Insert,
    Delete,
}
