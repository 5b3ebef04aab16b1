// src/config/model.rs

use std::path::PathBuf;

use serde::Deserialize;

use crate::engine::{ActionFilter, ControllerOptions};
use crate::mux::NotifyFilter;
use crate::types::ChangeAction;
use crate::watch::DEFAULT_BUFFER_SIZE;

/// Top-level configuration as read from a TOML file, before validation.
///
/// ```toml
/// [monitor]
/// buffer_size = 4096
/// require_folders = false
/// notify_modifications = false
/// actionable = ["added", "renamed_new"]
///
/// [[folder]]
/// path = "/srv/media/anime"
/// subtree = true
///
/// [library]
/// patterns = ["*.mkv", "*.mp4"]
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub monitor: MonitorSection,

    /// Every `[[folder]]` entry, in file order.
    #[serde(default)]
    pub folder: Vec<FolderConfig>,

    #[serde(default)]
    pub library: LibrarySection,
}

/// Validated configuration. Only built through `TryFrom<RawConfigFile>`.
#[derive(Debug, Clone, Default)]
pub struct ConfigFile {
    pub monitor: MonitorSection,
    pub folder: Vec<FolderConfig>,
    pub library: LibrarySection,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        monitor: MonitorSection,
        folder: Vec<FolderConfig>,
        library: LibrarySection,
    ) -> Self {
        Self {
            monitor,
            folder,
            library,
        }
    }

    pub fn controller_options(&self) -> ControllerOptions {
        ControllerOptions {
            buffer_size: self.monitor.buffer_size,
            require_folders: self.monitor.require_folders,
            filter: NotifyFilter {
                modifications: self.monitor.notify_modifications,
            },
            actionable: ActionFilter::new(self.monitor.actionable.iter().copied()),
        }
    }
}

/// `[monitor]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorSection {
    /// Per-folder notification buffer in bytes.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Refuse to start with no folders instead of quietly doing nothing.
    #[serde(default)]
    pub require_folders: bool,

    /// Also report content writes (`modified` records).
    #[serde(default)]
    pub notify_modifications: bool,

    /// Actions the library layer reacts to.
    #[serde(default = "default_actionable")]
    pub actionable: Vec<ChangeAction>,
}

fn default_buffer_size() -> usize {
    DEFAULT_BUFFER_SIZE
}

fn default_actionable() -> Vec<ChangeAction> {
    ActionFilter::default().actions().to_vec()
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
            require_folders: false,
            notify_modifications: false,
            actionable: default_actionable(),
        }
    }
}

/// One `[[folder]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FolderConfig {
    pub path: PathBuf,

    /// Watch nested directories as well.
    #[serde(default = "default_subtree")]
    pub subtree: bool,
}

fn default_subtree() -> bool {
    true
}

/// `[library]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct LibrarySection {
    /// File-name globs that count as episodes.
    #[serde(default = "default_patterns")]
    pub patterns: Vec<String>,
}

fn default_patterns() -> Vec<String> {
    ["*.mkv", "*.mp4", "*.avi"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for LibrarySection {
    fn default() -> Self {
        Self {
            patterns: default_patterns(),
        }
    }
}
