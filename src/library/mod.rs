// src/library/mod.rs

//! Consumer-side interpretation of change batches.
//!
//! The engine only reports raw records. This layer turns them into updates
//! about a media library: which episodes became available or went away, and
//! which series folders were moved. It runs inside the consumer callback and
//! is never called by the engine.
//!
//! - [`classify`] decides whether a record names a file or a directory.
//! - [`tracker`] holds the per-folder state and produces [`LibraryUpdate`]s.
//! - [`rescan`] lists a folder and diffs listings after an overflow.
//! - [`pattern`] is a glob-based [`EpisodeMatcher`] for the command line.

use std::path::{Path, PathBuf};

pub mod classify;
pub mod pattern;
pub mod rescan;
pub mod tracker;

pub use classify::{PathKind, classify_path, has_file_extension, is_path_available};
pub use pattern::PatternMatcher;
pub use rescan::DirectorySnapshot;
pub use tracker::LibraryTracker;

/// A series (or other item) in the consumer's library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryEntry {
    pub id: String,
    pub title: String,
    /// Folder the entry's episodes live in, if known.
    pub folder: Option<PathBuf>,
}

/// Recognizes library entries from paths.
pub trait EpisodeMatcher: Send {
    /// Entry an episode file (or a series directory) at `path` belongs to.
    fn match_episode(&self, path: &Path) -> Option<LibraryEntry>;

    /// Entry whose folder is exactly `folder`.
    fn entry_for_folder(&self, _folder: &Path) -> Option<LibraryEntry> {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LibraryUpdate {
    EpisodeAvailability {
        entry: LibraryEntry,
        path: PathBuf,
        available: bool,
    },
    /// An entry's folder was renamed, removed (`None`) or first found.
    FolderMoved {
        entry: LibraryEntry,
        folder: Option<PathBuf>,
    },
    /// Changes were lost and there is no earlier listing to diff against.
    RescanRequested { folder: PathBuf },
}
