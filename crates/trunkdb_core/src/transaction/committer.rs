//! Background committer for time-based auto-commit.

use super::write::WriteState;
use crate::error::CoreResult;
use parking_lot::Mutex;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

enum Message {
    Start {
        state: Weak<Mutex<WriteState>>,
        interval: Duration,
    },
    Shutdown,
}

/// Handle to the committer thread of one read-write transaction.
///
/// The thread is spawned before the transaction state exists and waits for
/// [`bind`](Committer::bind) before its first tick. It then wakes up every
/// `interval` and commits if anything changed since the last commit. The
/// thread stops on [`shutdown`](Committer::shutdown), when the handle is
/// dropped, or when the transaction state is gone.
pub(crate) struct Committer {
    sender: Sender<Message>,
    handle: Option<JoinHandle<()>>,
}

impl Committer {
    pub(crate) fn spawn(resource: &str) -> CoreResult<Self> {
        let (sender, receiver) = mpsc::channel();
        let handle = thread::Builder::new()
            .name(format!("trunkdb-commit-{resource}"))
            .spawn(move || run(&receiver))?;
        Ok(Self {
            sender,
            handle: Some(handle),
        })
    }

    /// Hands the fully built transaction state to the thread.
    pub(crate) fn bind(&self, state: &Arc<Mutex<WriteState>>, interval: Duration) {
        let start = Message::Start {
            state: Arc::downgrade(state),
            interval,
        };
        if self.sender.send(start).is_err() {
            warn!("committer thread exited before it was bound");
        }
    }

    /// Stops the thread and waits for it. Must not be called while holding
    /// the transaction state lock.
    pub(crate) fn shutdown(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        // A send error means the thread already returned.
        let _ = self.sender.send(Message::Shutdown);
        if handle.join().is_err() {
            warn!("committer thread panicked");
        }
    }
}

impl Drop for Committer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(receiver: &mpsc::Receiver<Message>) {
    let (state, interval) = match receiver.recv() {
        Ok(Message::Start { state, interval }) => (state, interval),
        Ok(Message::Shutdown) | Err(_) => return,
    };
    debug!(?interval, "committer started");

    loop {
        match receiver.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(Message::Start { .. }) => continue,
            Ok(Message::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
        }
        let Some(state) = state.upgrade() else {
            break;
        };
        state.lock().tick(interval);
    }
    debug!("committer stopped");
}
