// src/engine/dispatcher.rs

//! Worker → owner hand-off.
//!
//! The worker thread never runs consumer code. It posts each batch into an
//! unbounded channel and goes straight back to waiting; the owner drains the
//! channel whenever it pumps. One channel per run, so nothing queued in one
//! run can surface in the next.

use std::path::Path;

use tokio::sync::mpsc;
use tracing::debug;

use super::Notification;
use crate::errors::WatchError;
use crate::types::ChangeRecord;

/// A fresh sender/receiver pair for one run.
pub fn channel() -> (EventDispatcher, EventQueue) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventDispatcher { tx }, EventQueue { rx })
}

/// Sending half, owned by the worker (and by `start()` before the worker
/// exists).
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    tx: mpsc::UnboundedSender<Notification>,
}

impl EventDispatcher {
    /// Post one batch. Empty batches are not posted.
    ///
    /// Returns `false` if the owner side is gone.
    pub fn post(&self, folder: &Path, records: Vec<ChangeRecord>) -> bool {
        if records.is_empty() {
            return true;
        }
        debug!(folder = %folder.display(), records = records.len(), "posting batch");
        self.send(Notification::Changed {
            folder: folder.to_path_buf(),
            records,
        })
    }

    pub fn post_error(&self, folder: &Path, error: WatchError) -> bool {
        self.send(Notification::WatchError {
            folder: folder.to_path_buf(),
            error,
        })
    }

    fn send(&self, notification: Notification) -> bool {
        match self.tx.send(notification) {
            Ok(()) => true,
            Err(_) => {
                debug!("notification queue closed; dropping");
                false
            }
        }
    }
}

/// Receiving half, owned by the controller for the duration of one run.
#[derive(Debug)]
pub struct EventQueue {
    rx: mpsc::UnboundedReceiver<Notification>,
}

impl EventQueue {
    /// Everything queued right now, oldest first. Never blocks.
    pub fn drain(&mut self) -> Vec<Notification> {
        let mut out = Vec::new();
        while let Ok(notification) = self.rx.try_recv() {
            out.push(notification);
        }
        out
    }

    /// Wait for the next notification. `None` once every sender is gone and
    /// the queue is empty.
    pub async fn recv(&mut self) -> Option<Notification> {
        self.rx.recv().await
    }
}
