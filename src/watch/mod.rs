// src/watch/mod.rs

//! Watched folders: the per-run [`Watch`] objects and the long-lived
//! [`WatchRegistry`] they are created from.
//!
//! Nothing here blocks or spawns; the engine drives both.

pub mod registry;
pub mod watch;

pub use registry::{RegistryEntry, WatchRegistry, canonical_path};
pub use watch::{
    ArmState, DEFAULT_BUFFER_SIZE, NotifyBuffer, OpToken, Watch, WatchKey, WatchTable,
};
