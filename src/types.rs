use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Deserialize;

/// Kind of change carried by a [`ChangeRecord`].
///
/// - `Added` / `Removed` / `Modified`: a single entry changed.
/// - `RenamedOld` / `RenamedNew`: the two halves of a rename. They always
///   appear next to each other, old name first.
/// - `Rescan`: synthetic; the notification stream lost events and the
///   consumer should fall back to a full directory listing diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    Added,
    Removed,
    Modified,
    RenamedOld,
    RenamedNew,
    Rescan,
}

impl ChangeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeAction::Added => "added",
            ChangeAction::Removed => "removed",
            ChangeAction::Modified => "modified",
            ChangeAction::RenamedOld => "renamed_old",
            ChangeAction::RenamedNew => "renamed_new",
            ChangeAction::Rescan => "rescan",
        }
    }
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "added" => Ok(ChangeAction::Added),
            "removed" => Ok(ChangeAction::Removed),
            "modified" => Ok(ChangeAction::Modified),
            "renamed_old" => Ok(ChangeAction::RenamedOld),
            "renamed_new" => Ok(ChangeAction::RenamedNew),
            "rescan" => Ok(ChangeAction::Rescan),
            other => Err(format!(
                "invalid change action: {other} (expected one of added, removed, modified, renamed_old, renamed_new, rescan)"
            )),
        }
    }
}

/// One decoded filesystem event, relative to the watched root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRecord {
    pub action: ChangeAction,
    /// Path relative to the watched folder, `/`-separated.
    ///
    /// For `Rescan` records this is the watched folder itself.
    pub relative_path: String,
    pub is_directory: bool,
}

impl ChangeRecord {
    pub fn new(action: ChangeAction, relative_path: impl Into<String>, is_directory: bool) -> Self {
        Self {
            action,
            relative_path: relative_path.into(),
            is_directory,
        }
    }

    /// A file-level record (`is_directory = false`).
    pub fn file(action: ChangeAction, relative_path: impl Into<String>) -> Self {
        Self::new(action, relative_path, false)
    }
}

/// What the registry knows about a folder before any handle is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchSpec {
    /// Canonical folder path.
    pub path: PathBuf,
    pub watch_subtree: bool,
}

/// Per-folder state as seen from the owning thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    /// Registered, engine not running (or not yet started for this folder).
    Stopped,
    /// A read is in flight for this folder.
    Armed,
    /// The folder could not be opened at `start()`.
    Skipped,
    /// The watch was retired while running (folder deleted, handle invalid).
    Lost,
}

/// Engine-wide run state of a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineState {
    #[default]
    Stopped,
    Active,
}
