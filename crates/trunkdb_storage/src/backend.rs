//! Storage backend trait definition.

use crate::error::StorageResult;

/// An append-only byte store holding a resource's revision log.
///
/// # Invariants
///
/// - `append` returns the offset where the data begins
/// - `read_at` returns exactly the bytes previously appended at that offset
/// - after `sync` returns, every appended byte survives process termination
/// - a failed `append` leaves the store size unchanged
///
/// Backends use interior mutability and must be `Send + Sync`; the page
/// store shares one backend between its commit path and concurrent readers
/// that fault revisions back in.
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::ReadPastEnd`] if the range is not
    /// fully inside the store, or an I/O error.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends `data` to the end of the store and returns its offset.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails. The store is unchanged then.
    fn append(&self, data: &[u8]) -> StorageResult<u64>;

    /// Makes all appended data durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the data cannot be synced.
    fn sync(&self) -> StorageResult<()>;

    /// Returns the current size of the store in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;

    /// Shrinks the store to `new_size` bytes.
    ///
    /// Used by recovery to drop a torn trailing record.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::TruncateBeyondEnd`] if `new_size` is
    /// larger than the current size.
    fn truncate(&self, new_size: u64) -> StorageResult<()>;
}
