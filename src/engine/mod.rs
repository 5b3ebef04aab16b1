// src/engine/mod.rs

//! Monitoring engine for foldermon.
//!
//! This module ties together:
//! - the [`Controller`], the owner-facing API (register folders, start,
//!   stop, enable/disable delivery)
//! - the [`worker`] thread, which blocks on the completion multiplexer and
//!   turns completions into batches
//! - the [`dispatcher`], which moves batches from the worker thread to the
//!   owner thread
//!
//! Callbacks only ever run on the thread that calls
//! [`Controller::pump`] (or awaits [`Controller::wait_and_pump`]).

use std::path::{Path, PathBuf};

use crate::errors::WatchError;
use crate::mux::NotifyFilter;
use crate::types::{ChangeAction, ChangeRecord};
use crate::watch::DEFAULT_BUFFER_SIZE;

/// Smallest per-watch buffer the engine will use. Linux needs room for one
/// full `inotify_event` with a maximal name.
pub const MIN_BUFFER_SIZE: usize = 512;

/// What the owner thread receives.
#[derive(Debug)]
pub enum Notification {
    /// One non-empty batch decoded from one completion, in OS order.
    Changed {
        folder: PathBuf,
        records: Vec<ChangeRecord>,
    },
    /// A folder could not be watched, or stopped being watched.
    WatchError { folder: PathBuf, error: WatchError },
}

impl Notification {
    pub fn folder(&self) -> &Path {
        match self {
            Notification::Changed { folder, .. } | Notification::WatchError { folder, .. } => folder,
        }
    }
}

/// Actions a consumer treats as "something new to look at".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionFilter {
    actions: Vec<ChangeAction>,
}

impl ActionFilter {
    pub fn new(actions: impl IntoIterator<Item = ChangeAction>) -> Self {
        let mut actions: Vec<ChangeAction> = actions.into_iter().collect();
        actions.sort_by_key(|a| *a as u8);
        actions.dedup();
        Self { actions }
    }

    pub fn allows(&self, action: ChangeAction) -> bool {
        self.actions.contains(&action)
    }

    pub fn actions(&self) -> &[ChangeAction] {
        &self.actions
    }
}

impl Default for ActionFilter {
    /// File arrivals: created, or renamed into place.
    fn default() -> Self {
        Self::new([ChangeAction::Added, ChangeAction::RenamedNew])
    }
}

/// Controller configuration, usually built from the `[monitor]` section.
#[derive(Debug, Clone)]
pub struct ControllerOptions {
    /// Per-watch notification buffer, in bytes.
    pub buffer_size: usize,
    /// Fail `start()` when no folder is registered instead of succeeding
    /// without doing anything.
    pub require_folders: bool,
    pub filter: NotifyFilter,
    pub actionable: ActionFilter,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            require_folders: false,
            filter: NotifyFilter::default(),
            actionable: ActionFilter::default(),
        }
    }
}

pub mod controller;
pub mod dispatcher;
pub mod worker;

pub use controller::{Callback, Controller};
pub use dispatcher::{EventDispatcher, EventQueue};
pub use worker::{WorkerLoop, WorkerState};
