//! Append-only revision log.
//!
//! # Record format
//!
//! ```text
//! | magic (4) | version (2) | len (4) | CBOR payload (len) | checksum (4) |
//! ```
//!
//! The checksum is the first four bytes of the payload's SHA-256 digest.
//! Records are written back to back starting at offset 0, one per
//! revision, in revision order. A record only counts once `sync` has
//! returned; an incomplete or damaged tail left by a crash is cut off on
//! open.

use super::{BufferManager, RevisionInfo, RevisionRoot};
use crate::error::{CoreError, CoreResult};
use crate::types::{ResourceId, Revision};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::{debug, warn};
use trunkdb_storage::StorageBackend;

/// Magic bytes opening every commit record.
pub(crate) const RECORD_MAGIC: [u8; 4] = *b"TRKR";

/// Current commit record format version.
pub(crate) const RECORD_VERSION: u16 = 1;

/// magic (4) + version (2) + length (4).
const HEADER_SIZE: usize = 10;

const CHECKSUM_SIZE: usize = 4;

/// Where a committed revision lives in the log.
#[derive(Debug, Clone)]
struct DirectoryEntry {
    payload_offset: u64,
    payload_len: usize,
    info: RevisionInfo,
}

/// Outcome of scanning the log on open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RecoveryReport {
    /// Number of intact revisions found.
    pub(crate) revisions: usize,
    /// Bytes cut off the end of the log.
    pub(crate) truncated_bytes: u64,
}

/// The revision log of one resource.
pub(crate) struct PageStore {
    resource_id: ResourceId,
    backend: Arc<dyn StorageBackend>,
    buffer: BufferManager,
    directory: RwLock<Vec<DirectoryEntry>>,
}

impl PageStore {
    /// Writes revision 0 to an empty backend.
    pub(crate) fn create(
        backend: Arc<dyn StorageBackend>,
        capacity: NonZeroUsize,
        initial: RevisionRoot,
    ) -> CoreResult<Self> {
        let store = Self {
            resource_id: initial.resource_id,
            backend,
            buffer: BufferManager::new(capacity),
            directory: RwLock::new(Vec::new()),
        };
        store.append_revision(initial)?;
        Ok(store)
    }

    /// Rebuilds the revision directory from a non-empty backend.
    ///
    /// Returns the store together with the most recent snapshot.
    pub(crate) fn open(
        backend: Arc<dyn StorageBackend>,
        capacity: NonZeroUsize,
    ) -> CoreResult<(Self, Arc<RevisionRoot>, RecoveryReport)> {
        let size = backend.size()?;
        let mut offset = 0u64;
        let mut directory: Vec<DirectoryEntry> = Vec::new();
        let mut latest: Option<RevisionRoot> = None;

        while offset < size {
            let Some((root, payload_len)) = read_record(backend.as_ref(), offset, size)? else {
                break;
            };

            let expected = Revision::new(u32::try_from(directory.len()).map_err(|_| {
                CoreError::invalid_format("too many revisions in commit log")
            })?);
            if root.revision() != expected {
                return Err(CoreError::invalid_format(format!(
                    "record at offset {offset} holds revision {}, expected {expected}",
                    root.revision()
                )));
            }
            if let Some(previous) = &latest {
                if previous.resource_id != root.resource_id {
                    return Err(CoreError::invalid_format(format!(
                        "record at offset {offset} belongs to resource {}",
                        root.resource_id
                    )));
                }
            }

            directory.push(DirectoryEntry {
                payload_offset: offset + HEADER_SIZE as u64,
                payload_len,
                info: root.info.clone(),
            });
            offset += (HEADER_SIZE + payload_len + CHECKSUM_SIZE) as u64;
            latest = Some(root);
        }

        let Some(latest) = latest else {
            return Err(CoreError::invalid_format(
                "commit log holds no intact revision 0",
            ));
        };

        let truncated_bytes = size - offset;
        if truncated_bytes > 0 {
            warn!(
                offset,
                truncated_bytes, "discarding torn tail of commit log"
            );
            backend.truncate(offset)?;
            backend.sync()?;
        }

        let report = RecoveryReport {
            revisions: directory.len(),
            truncated_bytes,
        };
        let latest = Arc::new(latest);
        let store = Self {
            resource_id: latest.resource_id,
            backend,
            buffer: BufferManager::new(capacity),
            directory: RwLock::new(directory),
        };
        store.buffer.insert(Arc::clone(&latest));
        Ok((store, latest, report))
    }

    pub(crate) fn resource_id(&self) -> ResourceId {
        self.resource_id
    }

    /// Returns the most recent committed revision.
    pub(crate) fn latest_revision(&self) -> Revision {
        let len = self.directory.read().len();
        // The directory always holds revision 0.
        Revision::new(u32::try_from(len.saturating_sub(1)).unwrap_or(u32::MAX))
    }

    /// Returns the metadata of every committed revision, oldest first.
    pub(crate) fn history(&self) -> Vec<RevisionInfo> {
        self.directory
            .read()
            .iter()
            .map(|entry| entry.info.clone())
            .collect()
    }

    /// Returns the revision current at `millis`: the last one committed at
    /// or before it, or revision 0 if all are later.
    pub(crate) fn revision_at(&self, millis: u64) -> Revision {
        let directory = self.directory.read();
        let count = directory.partition_point(|entry| entry.info.committed_at_millis <= millis);
        Revision::new(u32::try_from(count.saturating_sub(1)).unwrap_or(u32::MAX))
    }

    /// Loads the snapshot of a committed revision.
    pub(crate) fn load(&self, revision: Revision) -> CoreResult<Arc<RevisionRoot>> {
        if let Some(root) = self.buffer.get(self.resource_id, revision) {
            return Ok(root);
        }

        let (offset, len) = {
            let directory = self.directory.read();
            let entry = directory.get(revision.as_u32() as usize).ok_or_else(|| {
                CoreError::RevisionNotFound {
                    revision,
                    latest: Revision::new(
                        u32::try_from(directory.len().saturating_sub(1)).unwrap_or(u32::MAX),
                    ),
                }
            })?;
            (entry.payload_offset, entry.payload_len)
        };

        let payload = self.backend.read_at(offset, len)?;
        let root: RevisionRoot = decode(&payload)?;
        let root = Arc::new(root);
        self.buffer.insert(Arc::clone(&root));
        Ok(root)
    }

    /// Appends the next revision and makes it durable and visible.
    ///
    /// Nothing becomes visible unless the record was synced. On failure the
    /// log is cut back to its previous size.
    pub(crate) fn append_revision(&self, root: RevisionRoot) -> CoreResult<Arc<RevisionRoot>> {
        let expected = Revision::new(u32::try_from(self.directory.read().len()).unwrap_or(u32::MAX));
        if root.revision() != expected {
            return Err(CoreError::invalid_operation(format!(
                "cannot append revision {}, next is {expected}",
                root.revision()
            )));
        }

        let payload = encode(&root)?;
        let payload_len = u32::try_from(payload.len()).map_err(|_| {
            CoreError::invalid_operation(format!(
                "revision {} is too large to store ({} bytes)",
                root.revision(),
                payload.len()
            ))
        })?;

        let mut record = Vec::with_capacity(HEADER_SIZE + payload.len() + CHECKSUM_SIZE);
        record.extend_from_slice(&RECORD_MAGIC);
        record.extend_from_slice(&RECORD_VERSION.to_le_bytes());
        record.extend_from_slice(&payload_len.to_le_bytes());
        record.extend_from_slice(&payload);
        record.extend_from_slice(&checksum(&payload));

        let before = self.backend.size()?;
        let offset = self.backend.append(&record)?;
        if let Err(e) = self.backend.sync() {
            if let Err(cleanup) = self.backend.truncate(before) {
                warn!(error = %cleanup, "could not cut back unsynced commit record");
            }
            return Err(e.into());
        }

        debug!(
            revision = %root.revision(),
            bytes = record.len(),
            offset,
            "revision appended"
        );

        let root = Arc::new(root);
        self.directory.write().push(DirectoryEntry {
            payload_offset: offset + HEADER_SIZE as u64,
            payload_len: payload.len(),
            info: root.info.clone(),
        });
        self.buffer.insert(Arc::clone(&root));
        Ok(root)
    }
}

impl std::fmt::Debug for PageStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageStore")
            .field("resource_id", &self.resource_id)
            .field("latest_revision", &self.latest_revision())
            .field("buffer", &self.buffer)
            .finish()
    }
}

/// Reads one record at `offset`. `Ok(None)` marks a torn tail.
fn read_record(
    backend: &dyn StorageBackend,
    offset: u64,
    size: u64,
) -> CoreResult<Option<(RevisionRoot, usize)>> {
    if size - offset < (HEADER_SIZE + CHECKSUM_SIZE) as u64 {
        return Ok(None);
    }
    let header = backend.read_at(offset, HEADER_SIZE)?;
    if header[0..4] != RECORD_MAGIC {
        return Ok(None);
    }
    let version = u16::from_le_bytes([header[4], header[5]]);
    let payload_len = u32::from_le_bytes([header[6], header[7], header[8], header[9]]) as usize;

    let body_len = (payload_len + CHECKSUM_SIZE) as u64;
    if size - offset - (HEADER_SIZE as u64) < body_len {
        return Ok(None);
    }
    let body = backend.read_at(offset + HEADER_SIZE as u64, payload_len + CHECKSUM_SIZE)?;
    let (payload, stored) = body.split_at(payload_len);
    if stored != checksum(payload).as_slice() {
        return Ok(None);
    }
    if version != RECORD_VERSION {
        return Err(CoreError::invalid_format(format!(
            "unsupported commit record version {version}"
        )));
    }

    match decode(payload) {
        Ok(root) => Ok(Some((root, payload_len))),
        Err(e) => {
            warn!(offset, error = %e, "undecodable commit record");
            Ok(None)
        }
    }
}

fn checksum(payload: &[u8]) -> [u8; CHECKSUM_SIZE] {
    let digest = Sha256::digest(payload);
    let mut out = [0u8; CHECKSUM_SIZE];
    out.copy_from_slice(&digest[..CHECKSUM_SIZE]);
    out
}

fn encode(root: &RevisionRoot) -> CoreResult<Vec<u8>> {
    let mut out = Vec::new();
    ciborium::ser::into_writer(root, &mut out).map_err(|e| CoreError::codec(e.to_string()))?;
    Ok(out)
}

fn decode(payload: &[u8]) -> CoreResult<RevisionRoot> {
    ciborium::de::from_reader(payload).map_err(|e| CoreError::codec(e.to_string()))
}
