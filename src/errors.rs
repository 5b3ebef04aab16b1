// src/errors.rs

//! Crate-wide error types.
//!
//! Registry misuse and start failures are returned synchronously to the
//! caller; per-folder failures while running travel through the
//! notification channel as [`WatchError`]s instead.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Misuse of the watched-folder registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("folder is already watched: {0}")]
    AlreadyWatched(PathBuf),

    #[error("folder is not watched: {0}")]
    NotWatched(PathBuf),

    #[error("cannot change watched folders while the engine is running")]
    EngineRunning,
}

/// Failure to bring the engine up. The engine stays stopped.
#[derive(Error, Debug)]
pub enum StartError {
    #[error("no folders registered")]
    NoFoldersRegistered,

    #[error("failed to create completion multiplexer: {0}")]
    Multiplexer(#[source] io::Error),

    #[error("failed to spawn worker thread: {0}")]
    SpawnWorker(#[source] io::Error),
}

/// Per-folder failure reported to the consumer. Never fatal to the engine.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("could not open folder for watching: {source}")]
    HandleOpenFailed {
        #[source]
        source: io::Error,
    },

    #[error("watch lost: {reason}")]
    WatchLost { reason: String },
}

#[derive(Error, Debug)]
pub enum FoldermonError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Start(#[from] StartError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, FoldermonError>;
