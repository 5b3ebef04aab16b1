// src/engine/worker.rs

//! The background thread of a run.
//!
//! The worker owns the multiplexer and every open Watch from the moment it
//! is spawned until it terminates. It blocks in `wait_next` and handles one
//! completion at a time:
//! - `Ok`: decode, re-arm, post the batch
//! - `BufferOverflow`: resync, re-arm, post one `Rescan` record
//! - `Cancelled`: leave the Watch idle
//! - `HandleInvalid`: post whatever was decoded, then retire the Watch and
//!   report it lost
//!
//! On a stop request every armed Watch is cancelled and the loop keeps
//! consuming completions until no read is in flight, so no buffer is freed
//! while the OS may still write into it.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use tracing::{debug, error, info, trace, warn};

use super::dispatcher::EventDispatcher;
use crate::errors::WatchError;
use crate::mux::{CompletionEvent, Multiplexer, Outcome, Wakeup};
use crate::types::{ChangeAction, ChangeRecord, WatchState};
use crate::watch::{WatchKey, WatchRegistry, WatchTable};

/// Name of the worker thread, visible in logs.
pub const WORKER_THREAD_NAME: &str = "foldermon-worker";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Waiting,
    Decoding,
    Rearming,
    Draining,
    Terminated,
}

pub struct WorkerLoop<M: Multiplexer> {
    mux: M,
    watches: WatchTable<M::Handle>,
    dispatcher: EventDispatcher,
    registry: WatchRegistry,
    state: WorkerState,
}

impl<M: Multiplexer> std::fmt::Debug for WorkerLoop<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerLoop")
            .field("watches", &self.watches.len())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<M: Multiplexer> WorkerLoop<M> {
    pub fn new(
        mux: M,
        watches: WatchTable<M::Handle>,
        dispatcher: EventDispatcher,
        registry: WatchRegistry,
    ) -> Self {
        Self {
            mux,
            watches,
            dispatcher,
            registry,
            state: WorkerState::Idle,
        }
    }

    /// Move the loop onto its own named thread.
    ///
    /// If the thread cannot be created the loop is handed back, so the
    /// caller can still [`shutdown`](Self::shutdown) it in place.
    pub fn spawn(self) -> Result<JoinHandle<()>, (io::Error, Self)> {
        let (tx, rx) = mpsc::sync_channel::<Self>(1);
        let spawned = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || {
                if let Ok(worker) = rx.recv() {
                    worker.run();
                }
            });

        match spawned {
            Ok(join) => match tx.send(self) {
                Ok(()) => Ok(join),
                Err(mpsc::SendError(worker)) => Err((
                    io::Error::other("worker thread exited before it was started"),
                    worker,
                )),
            },
            Err(err) => Err((err, self)),
        }
    }

    /// Main loop. Returns once every Watch is released.
    pub fn run(mut self) {
        info!(watches = self.watches.len(), "worker started");
        self.transition(WorkerState::Waiting);

        loop {
            match self.mux.wait_next(&mut self.watches, None) {
                Ok(Wakeup::Completion(event)) => {
                    self.on_completion(event);
                    self.transition(WorkerState::Waiting);
                }
                Ok(Wakeup::StopRequested) => {
                    debug!("stop requested");
                    break;
                }
                Ok(Wakeup::TimedOut) => continue,
                Err(err) => {
                    error!(error = %err, "completion wait failed; abandoning all watches");
                    self.fail_all(&err);
                    break;
                }
            }
        }

        self.shutdown();
    }

    /// Cancel, drain and release every Watch without entering the loop.
    pub fn shutdown(mut self) {
        self.drain();
        self.transition(WorkerState::Terminated);
        info!("worker stopped");
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    fn transition(&mut self, next: WorkerState) {
        trace!(from = ?self.state, to = ?next, "worker state");
        self.state = next;
    }

    fn on_completion(&mut self, event: CompletionEvent) {
        let key = event.key;
        let Some(watch) = self.watches.get_mut(key) else {
            warn!(key = ?key, "completion for unknown watch; ignoring");
            return;
        };
        if watch.complete_op().is_none() {
            debug!(key = ?key, outcome = ?event.outcome, "completion for idle watch; ignoring");
            return;
        }
        let folder = watch.spec().path.clone();
        debug!(
            folder = %folder.display(),
            bytes = event.bytes_transferred,
            outcome = ?event.outcome,
            "read completed"
        );

        match event.outcome {
            Outcome::Ok => {
                self.transition(WorkerState::Decoding);
                let records = self.decode(key, event.bytes_transferred);
                self.transition(WorkerState::Rearming);
                let rearmed = self.rearm(key);
                self.dispatcher.post(&folder, records);
                if let Err(err) = rearmed {
                    self.lose(key, folder, format!("re-arm failed: {err}"));
                }
            }
            Outcome::BufferOverflow => {
                warn!(folder = %folder.display(), "notification buffer overflowed; requesting rescan");
                self.resync(key, &folder);
                self.transition(WorkerState::Rearming);
                let rearmed = self.rearm(key);
                let rescan = ChangeRecord::new(
                    ChangeAction::Rescan,
                    folder.to_string_lossy().into_owned(),
                    true,
                );
                self.dispatcher.post(&folder, vec![rescan]);
                if let Err(err) = rearmed {
                    self.lose(key, folder, format!("re-arm failed: {err}"));
                }
            }
            Outcome::Cancelled => {
                debug!(folder = %folder.display(), "read cancelled");
            }
            Outcome::HandleInvalid => {
                if event.bytes_transferred > 0 {
                    self.transition(WorkerState::Decoding);
                    let records = self.decode(key, event.bytes_transferred);
                    self.dispatcher.post(&folder, records);
                }
                self.lose(key, folder, "directory handle is no longer valid".to_string());
            }
        }
    }

    fn decode(&mut self, key: WatchKey, len: usize) -> Vec<ChangeRecord> {
        match self.watches.get_mut(key) {
            Some(watch) => self.mux.decode(watch, len),
            None => Vec::new(),
        }
    }

    /// Failure is not fatal: the rescan still goes out and the Watch keeps
    /// whatever coverage it had.
    fn resync(&mut self, key: WatchKey, folder: &Path) {
        let Some(watch) = self.watches.get_mut(key) else {
            return;
        };
        if let Err(err) = self.mux.resync(watch) {
            warn!(folder = %folder.display(), error = %err, "resync after overflow failed");
        }
    }

    fn rearm(&mut self, key: WatchKey) -> io::Result<()> {
        let watch = self
            .watches
            .get_mut(key)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "watch is gone"))?;
        self.mux.arm(watch)?;
        watch.begin_op();
        Ok(())
    }

    /// Retire one Watch and tell the owner. The other Watches keep running.
    fn lose(&mut self, key: WatchKey, folder: PathBuf, reason: String) {
        if let Some(watch) = self.watches.get_mut(key) {
            watch.retire();
        }
        warn!(folder = %folder.display(), %reason, "watch lost");
        self.registry.set_state(&folder, WatchState::Lost);
        self.dispatcher
            .post_error(&folder, WatchError::WatchLost { reason });
    }

    fn fail_all(&mut self, err: &io::Error) {
        let folders: Vec<PathBuf> = self
            .watches
            .iter()
            .filter(|w| w.is_open())
            .map(|w| w.spec().path.clone())
            .collect();
        for folder in folders {
            self.registry.set_state(&folder, WatchState::Lost);
            self.dispatcher.post_error(
                &folder,
                WatchError::WatchLost {
                    reason: format!("completion wait failed: {err}"),
                },
            );
        }
    }

    fn drain(&mut self) {
        self.transition(WorkerState::Draining);

        let mut cancelled = 0usize;
        let mut stuck = Vec::new();
        for watch in self.watches.iter_mut() {
            if watch.pending().is_none() {
                continue;
            }
            match self.mux.cancel(watch) {
                Ok(()) => cancelled += 1,
                Err(err) => {
                    warn!(folder = %watch.spec().path.display(), error = %err, "cancel failed");
                    stuck.push(watch.key());
                }
            }
        }
        debug!(cancelled, "waiting for cancelled reads");

        let waiting_on = |watches: &WatchTable<M::Handle>| {
            watches
                .iter()
                .any(|w| w.pending().is_some() && !stuck.contains(&w.key()))
        };

        while waiting_on(&self.watches) {
            match self.mux.wait_next(&mut self.watches, None) {
                Ok(Wakeup::Completion(event)) => {
                    if let Some(watch) = self.watches.get_mut(event.key) {
                        watch.complete_op();
                    }
                }
                Ok(Wakeup::StopRequested | Wakeup::TimedOut) => continue,
                Err(err) => {
                    error!(error = %err, "drain failed");
                    break;
                }
            }
        }

        let leaked = self.watches.leak_pending();
        if leaked > 0 {
            warn!(leaked, "reads still owned by the OS; leaking their watches");
        }
        for watch in self.watches.iter_mut() {
            watch.retire();
        }
    }
}
