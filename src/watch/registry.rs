// src/watch/registry.rs

//! The set of folders a controller watches.
//!
//! The registry is shared between the controller thread and the worker
//! thread. Its lock is only ever held for the duration of one call here,
//! never across an I/O wait.

use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::errors::RegistryError;
use crate::types::{EngineState, WatchSpec, WatchState};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    pub spec: WatchSpec,
    pub state: WatchState,
}

#[derive(Debug, Default)]
struct RegistryInner {
    engine: EngineState,
    /// Insertion order is preserved; paths are unique.
    entries: Vec<RegistryEntry>,
}

impl RegistryInner {
    fn position(&self, path: &Path) -> Option<usize> {
        self.entries.iter().position(|e| e.spec.path == path)
    }

    fn ensure_stopped(&self) -> Result<(), RegistryError> {
        match self.engine {
            EngineState::Stopped => Ok(()),
            EngineState::Active => Err(RegistryError::EngineRunning),
        }
    }
}

/// Ordered mapping from canonical folder path to its watch entry.
#[derive(Debug, Clone, Default)]
pub struct WatchRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl WatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        // Entries stay consistent even if a holder panicked mid-call: every
        // mutation here is a single push/remove/assignment.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a folder. Returns the canonical path it is stored under.
    pub fn add(&self, path: impl AsRef<Path>, watch_subtree: bool) -> Result<PathBuf, RegistryError> {
        let path = canonical_path(path.as_ref());
        let mut inner = self.lock();
        inner.ensure_stopped()?;

        if inner.position(&path).is_some() {
            return Err(RegistryError::AlreadyWatched(path));
        }

        debug!(folder = %path.display(), watch_subtree, "folder registered");
        inner.entries.push(RegistryEntry {
            spec: WatchSpec {
                path: path.clone(),
                watch_subtree,
            },
            state: WatchState::Stopped,
        });
        Ok(path)
    }

    pub fn remove(&self, path: impl AsRef<Path>) -> Result<(), RegistryError> {
        let path = canonical_path(path.as_ref());
        let mut inner = self.lock();
        inner.ensure_stopped()?;

        match inner.position(&path) {
            Some(idx) => {
                inner.entries.remove(idx);
                debug!(folder = %path.display(), "folder unregistered");
                Ok(())
            }
            None => Err(RegistryError::NotWatched(path)),
        }
    }

    pub fn clear(&self) -> Result<(), RegistryError> {
        let mut inner = self.lock();
        inner.ensure_stopped()?;
        inner.entries.clear();
        Ok(())
    }

    /// Specs of all registered folders, in insertion order.
    pub fn snapshot(&self) -> Vec<WatchSpec> {
        self.lock().entries.iter().map(|e| e.spec.clone()).collect()
    }

    pub fn entries(&self) -> Vec<RegistryEntry> {
        self.lock().entries.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        let path = canonical_path(path.as_ref());
        self.lock().position(&path).is_some()
    }

    pub fn state_of(&self, path: impl AsRef<Path>) -> Option<WatchState> {
        let path = canonical_path(path.as_ref());
        let inner = self.lock();
        inner.position(&path).map(|idx| inner.entries[idx].state)
    }

    pub fn engine_state(&self) -> EngineState {
        self.lock().engine
    }

    /// Flip to Active and take the snapshot the run is built from, in one
    /// critical section. Returns `None` if the engine was already Active.
    pub(crate) fn activate(&self) -> Option<Vec<WatchSpec>> {
        let mut inner = self.lock();
        if inner.engine == EngineState::Active {
            return None;
        }
        inner.engine = EngineState::Active;
        Some(inner.entries.iter().map(|e| e.spec.clone()).collect())
    }

    /// Back to Stopped; every folder's state is reset.
    pub(crate) fn deactivate(&self) {
        let mut inner = self.lock();
        inner.engine = EngineState::Stopped;
        for entry in inner.entries.iter_mut() {
            entry.state = WatchState::Stopped;
        }
    }

    pub(crate) fn set_state(&self, path: &Path, state: WatchState) {
        let mut inner = self.lock();
        if let Some(idx) = inner.position(path) {
            inner.entries[idx].state = state;
        }
    }
}

/// Canonical form used as the registry key.
///
/// Existing folders resolve through the filesystem (symlinks included).
/// Folders that do not exist (yet) fall back to a lexical normalisation of
/// the absolute path, so they can still be registered and deduplicated.
pub fn canonical_path(path: &Path) -> PathBuf {
    if let Ok(resolved) = std::fs::canonicalize(path) {
        return resolved;
    }
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    normalize_lexically(&absolute)
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}
