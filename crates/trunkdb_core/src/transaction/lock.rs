//! Resource-scoped write lock.

use crate::error::{CoreError, CoreResult};
use crate::types::TransactionId;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Admits at most one read-write transaction per resource.
///
/// The lock remembers which transaction holds it. It is released when the
/// returned [`WriteGuard`] is dropped, on every exit path of the writer.
#[derive(Debug, Default)]
pub(crate) struct WriteLock {
    holder: Mutex<Option<TransactionId>>,
    released: Condvar,
}

impl WriteLock {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Waits for the lock, at most `timeout` if one is given.
    pub(crate) fn acquire(
        self: &Arc<Self>,
        resource: &str,
        trx_id: TransactionId,
        timeout: Option<Duration>,
    ) -> CoreResult<WriteGuard> {
        let started = Instant::now();
        let mut holder = self.holder.lock();
        match timeout {
            None => {
                while holder.is_some() {
                    self.released.wait(&mut holder);
                }
            }
            Some(timeout) => {
                let deadline = started + timeout;
                while holder.is_some() {
                    if self.released.wait_until(&mut holder, deadline).timed_out()
                        && holder.is_some()
                    {
                        return Err(CoreError::LockTimeout {
                            resource: resource.to_string(),
                            waited: started.elapsed(),
                        });
                    }
                }
            }
        }
        *holder = Some(trx_id);
        debug!(resource, %trx_id, waited = ?started.elapsed(), "write lock acquired");

        Ok(WriteGuard {
            lock: Arc::clone(self),
            trx_id,
        })
    }

    /// Returns the transaction currently holding the lock.
    pub(crate) fn holder(&self) -> Option<TransactionId> {
        *self.holder.lock()
    }

    fn release(&self, trx_id: TransactionId) {
        let mut holder = self.holder.lock();
        if *holder == Some(trx_id) {
            *holder = None;
            self.released.notify_one();
            debug!(%trx_id, "write lock released");
        }
    }
}

/// Proof of holding the write lock; releases it on drop.
#[derive(Debug)]
pub(crate) struct WriteGuard {
    lock: Arc<WriteLock>,
    trx_id: TransactionId,
}

impl Drop for WriteGuard {
    fn drop(&mut self) {
        self.lock.release(self.trx_id);
    }
}
