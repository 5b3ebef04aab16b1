// src/library/pattern.rs

use std::path::Path;

use globset::{Glob, GlobSet, GlobSetBuilder};

use super::{EpisodeMatcher, LibraryEntry};
use crate::errors::{FoldermonError, Result};

/// Treats any file whose name matches one of a set of globs as an episode
/// of a series named after the file.
///
/// Stands in for a real title recognizer on the command line.
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    set: GlobSet,
}

impl PatternMatcher {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let pattern = pattern.as_ref();
            let glob = Glob::new(pattern).map_err(|e| {
                FoldermonError::ConfigError(format!("invalid library pattern '{pattern}': {e}"))
            })?;
            builder.add(glob);
        }
        let set = builder
            .build()
            .map_err(|e| FoldermonError::ConfigError(format!("building library patterns: {e}")))?;
        Ok(Self { set })
    }
}

/// `Show_Name.ep01` → `Show Name ep01`.
fn title_from_stem(stem: &str) -> String {
    stem.split(['_', '.'])
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

impl EpisodeMatcher for PatternMatcher {
    fn match_episode(&self, path: &Path) -> Option<LibraryEntry> {
        let name = path.file_name()?;
        if !self.set.is_match(Path::new(name)) {
            return None;
        }
        let stem = Path::new(name).file_stem()?.to_string_lossy().into_owned();
        Some(LibraryEntry {
            title: title_from_stem(&stem),
            id: stem,
            folder: None,
        })
    }
}
