//! Bounded hand-off between watcher loops and relocation workers
//!
//! Every watcher holds a [`DispatchSender`]; every worker holds a clone of the
//! single [`DispatchReceiver`]. A full channel blocks the sending watcher,
//! which delays its next poll until a worker catches up.

use crate::error::DispatchError;
use crate::registry::SourceSnapshot;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};

/// A settled file on its way to a worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchEvent {
    pub path: PathBuf,
    pub snapshot: SourceSnapshot,
    /// Size observed on the tick that declared the file settled
    pub size: u64,
    pub stabilized_at: DateTime<Utc>,
}

/// Create a dispatch channel holding at most `capacity` pending events
pub fn dispatch_channel(capacity: usize) -> (DispatchSender, DispatchReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (DispatchSender { tx }, DispatchReceiver { rx: Arc::new(Mutex::new(rx)) })
}

/// Producer half, one clone per watcher loop
#[derive(Debug, Clone)]
pub struct DispatchSender {
    tx: mpsc::Sender<DispatchEvent>,
}

impl DispatchSender {
    /// Queue an event, waiting for room if the channel is full
    pub async fn send(&self, event: DispatchEvent) -> Result<(), DispatchError> {
        self.tx
            .send(event)
            .await
            .map_err(|mpsc::error::SendError(event)| DispatchError { path: event.path })
    }

    /// Free slots left before senders start blocking
    pub fn remaining_capacity(&self) -> usize {
        self.tx.capacity()
    }
}

/// Consumer half, shared by every worker in the pool
#[derive(Debug, Clone)]
pub struct DispatchReceiver {
    rx: Arc<Mutex<mpsc::Receiver<DispatchEvent>>>,
}

impl DispatchReceiver {
    /// Wait for the next event; `None` once every sender is gone and the queue is drained
    pub async fn recv(&self) -> Option<DispatchEvent> {
        let mut rx = self.rx.lock().await;
        rx.recv().await
    }
}
