// src/engine/controller.rs

//! Owner-facing API of the engine.
//!
//! A [`Controller`] is an explicit instance: several can run side by side,
//! each with its own registry, worker thread and notification queue.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;

use tracing::{debug, error, info, warn};

use super::dispatcher::{self, EventQueue};
use super::worker::WorkerLoop;
use super::{ControllerOptions, MIN_BUFFER_SIZE, Notification};
use crate::errors::{FoldermonError, RegistryError, StartError, WatchError};
use crate::mux::{Multiplexer, StopSignal};
use crate::types::{ChangeRecord, EngineState, WatchState};
use crate::watch::{Watch, WatchRegistry, WatchTable};

#[cfg(any(target_os = "linux", windows))]
use crate::mux::PlatformMultiplexer;

/// Consumer callback. Only ever invoked on the thread that pumps.
pub type Callback = Box<dyn FnMut(Notification) + Send>;

type Factory<M> = Box<dyn FnMut() -> io::Result<M> + Send>;

/// One Active period: between a successful `start()` and `stop()`.
struct ActiveRun<M: Multiplexer> {
    stop: M::Stop,
    worker: Option<JoinHandle<()>>,
    queue: EventQueue,
}

pub struct Controller<M: Multiplexer> {
    registry: WatchRegistry,
    options: ControllerOptions,
    factory: Factory<M>,
    callback: Callback,
    enabled: bool,
    run: Option<ActiveRun<M>>,
}

impl<M: Multiplexer> fmt::Debug for Controller<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("registry", &self.registry)
            .field("options", &self.options)
            .field("enabled", &self.enabled)
            .field("active", &self.run.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(any(target_os = "linux", windows))]
impl Controller<PlatformMultiplexer> {
    /// Controller on the native backend for this platform.
    pub fn new<C>(options: ControllerOptions, callback: C) -> Self
    where
        C: FnMut(Notification) + Send + 'static,
    {
        Self::with_multiplexer(options, PlatformMultiplexer::new, callback)
    }
}

impl<M: Multiplexer> Controller<M> {
    /// Controller on a custom backend. `factory` is called once per
    /// `start()`.
    pub fn with_multiplexer<F, C>(options: ControllerOptions, factory: F, callback: C) -> Self
    where
        F: FnMut() -> io::Result<M> + Send + 'static,
        C: FnMut(Notification) + Send + 'static,
    {
        Self {
            registry: WatchRegistry::new(),
            options,
            factory: Box::new(factory),
            callback: Box::new(callback),
            enabled: true,
            run: None,
        }
    }

    pub fn registry(&self) -> &WatchRegistry {
        &self.registry
    }

    pub fn options(&self) -> &ControllerOptions {
        &self.options
    }

    /// Returns the canonical path the folder is registered under.
    pub fn add_folder(
        &mut self,
        path: impl AsRef<Path>,
        watch_subtree: bool,
    ) -> Result<PathBuf, RegistryError> {
        self.registry.add(path, watch_subtree)
    }

    pub fn remove_folder(&mut self, path: impl AsRef<Path>) -> Result<(), RegistryError> {
        self.registry.remove(path)
    }

    pub fn clear_folders(&mut self) -> Result<(), RegistryError> {
        self.registry.clear()
    }

    pub fn state(&self) -> EngineState {
        if self.run.is_some() {
            EngineState::Active
        } else {
            EngineState::Stopped
        }
    }

    pub fn watch_state(&self, path: impl AsRef<Path>) -> Option<WatchState> {
        self.registry.state_of(path)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether notifications reach the callback. Watches keep running
    /// either way; while disabled, pumped notifications are dropped.
    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled != enabled {
            info!(enabled, "notification delivery toggled");
        }
        self.enabled = enabled;
    }

    pub fn is_actionable(&self, record: &ChangeRecord) -> bool {
        self.options.actionable.allows(record.action)
    }

    /// Open a Watch per registered folder and spawn the worker.
    ///
    /// Folders that cannot be opened are skipped and reported through the
    /// notification queue ahead of any change.
    pub fn start(&mut self) -> Result<(), StartError> {
        if self.run.is_some() {
            debug!("start() while active; nothing to do");
            return Ok(());
        }
        if self.registry.is_empty() {
            if self.options.require_folders {
                return Err(StartError::NoFoldersRegistered);
            }
            info!("no folders registered; staying stopped");
            return Ok(());
        }

        let mut mux = (self.factory)().map_err(StartError::Multiplexer)?;
        let Some(specs) = self.registry.activate() else {
            return Ok(());
        };

        let buffer_size = self.options.buffer_size.max(MIN_BUFFER_SIZE);
        let (dispatcher, queue) = dispatcher::channel();
        let mut watches = WatchTable::new();

        for spec in specs {
            let key = watches.next_key();
            let opened = mux.open(&spec, key, self.options.filter).and_then(|handle| {
                let mut watch = Watch::new(key, spec.clone(), handle, buffer_size);
                mux.arm(&mut watch)?;
                watch.begin_op();
                Ok(watch)
            });

            match opened {
                Ok(watch) => {
                    info!(folder = %spec.path.display(), subtree = spec.watch_subtree, "watching folder");
                    watches.insert(watch);
                    self.registry.set_state(&spec.path, WatchState::Armed);
                }
                Err(err) => {
                    warn!(folder = %spec.path.display(), error = %err, "cannot watch folder; skipping");
                    self.registry.set_state(&spec.path, WatchState::Skipped);
                    dispatcher.post_error(&spec.path, WatchError::HandleOpenFailed { source: err });
                }
            }
        }

        let stop = mux.stop_signal();
        let worker = WorkerLoop::new(mux, watches, dispatcher, self.registry.clone());
        match worker.spawn() {
            Ok(join) => {
                self.run = Some(ActiveRun {
                    stop,
                    worker: Some(join),
                    queue,
                });
                info!(folders = self.registry.len(), "engine started");
                Ok(())
            }
            Err((err, worker)) => {
                error!(error = %err, "cannot spawn worker thread");
                worker.shutdown();
                self.registry.deactivate();
                Err(StartError::SpawnWorker(err))
            }
        }
    }

    /// Stop the worker and release every Watch. Blocks until the worker has
    /// exited. Calling it while stopped does nothing.
    ///
    /// Notifications the worker queued before exiting are delivered here;
    /// none are delivered after this returns.
    pub fn stop(&mut self) {
        let Some(mut run) = self.run.take() else {
            return;
        };
        info!("stopping engine");

        if let Err(err) = run.stop.raise() {
            error!(error = %err, "cannot signal worker to stop");
        }
        if let Some(join) = run.worker.take() {
            if join.join().is_err() {
                error!("worker thread panicked");
            }
        }

        let leftover = run.queue.drain();
        self.deliver(leftover);
        self.registry.deactivate();
        info!("engine stopped");
    }

    /// Stop, replace the registered folders, start again.
    pub fn reload<I, P>(&mut self, folders: I) -> Result<(), FoldermonError>
    where
        I: IntoIterator<Item = (P, bool)>,
        P: AsRef<Path>,
    {
        self.stop();
        self.registry.clear()?;
        for (path, subtree) in folders {
            match self.registry.add(path, subtree) {
                Ok(_) => {}
                Err(RegistryError::AlreadyWatched(path)) => {
                    warn!(folder = %path.display(), "folder listed twice; ignoring duplicate");
                }
                Err(err) => return Err(err.into()),
            }
        }
        self.start()?;
        Ok(())
    }

    /// Deliver everything queued so far to the callback. Never blocks.
    /// Returns how many notifications reached the callback.
    pub fn pump(&mut self) -> usize {
        let batch = match self.run.as_mut() {
            Some(run) => run.queue.drain(),
            None => return 0,
        };
        self.deliver(batch)
    }

    /// Wait for at least one notification, then deliver everything queued.
    ///
    /// Returns `None` when stopped, or when the worker has gone away.
    pub async fn wait_and_pump(&mut self) -> Option<usize> {
        let first = self.next_queued().await?;
        let mut batch = vec![first];
        if let Some(run) = self.run.as_mut() {
            batch.extend(run.queue.drain());
        }
        Some(self.deliver(batch))
    }

    /// Take the next notification directly instead of through the callback.
    /// Notifications arriving while disabled are dropped.
    pub async fn next_notification(&mut self) -> Option<Notification> {
        loop {
            let notification = self.next_queued().await?;
            if self.enabled {
                return Some(notification);
            }
            debug!(folder = %notification.folder().display(), "delivery disabled; dropping");
        }
    }

    async fn next_queued(&mut self) -> Option<Notification> {
        self.run.as_mut()?.queue.recv().await
    }

    fn deliver(&mut self, batch: Vec<Notification>) -> usize {
        if batch.is_empty() {
            return 0;
        }
        if !self.enabled {
            debug!(dropped = batch.len(), "delivery disabled; dropping notifications");
            return 0;
        }
        let delivered = batch.len();
        for notification in batch {
            (self.callback)(notification);
        }
        delivered
    }
}

impl<M: Multiplexer> Drop for Controller<M> {
    fn drop(&mut self) {
        self.stop();
    }
}
