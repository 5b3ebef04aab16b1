// src/config/mod.rs

//! Configuration for foldermon.
//!
//! - [`model`] holds the serde-facing structs for `Foldermon.toml`.
//! - [`loader`] reads a file into a [`RawConfigFile`].
//! - [`validate`] turns a [`RawConfigFile`] into a checked [`ConfigFile`].

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{ConfigFile, FolderConfig, LibrarySection, MonitorSection, RawConfigFile};
