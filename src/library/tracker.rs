// src/library/tracker.rs

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info, warn};

use super::classify::{PathKind, classify_path, is_path_available};
use super::rescan::DirectorySnapshot;
use super::{EpisodeMatcher, LibraryEntry, LibraryUpdate};
use crate::engine::ActionFilter;
use crate::fs::FileSystem;
use crate::types::{ChangeAction, ChangeRecord};

/// Turns `(folder, records)` batches into [`LibraryUpdate`]s.
///
/// Per batch:
/// - a directory known as an entry's folder that goes away yields
///   `FolderMoved`; when it was renamed, the match carries over to the
///   record that follows it, so the new name is reported as the new folder
/// - a directory recognized as an entry without a folder yields
///   `FolderMoved` with the directory as the folder
/// - a recognized episode file going away always yields
///   `EpisodeAvailability` with `available: false`; one arriving does only
///   when its action passes the filter
/// - `Rescan` diffs a fresh listing against the last known one, or asks
///   for a rescan if the folder was never listed
#[derive(Debug)]
pub struct LibraryTracker<M: EpisodeMatcher> {
    matcher: M,
    fs: Arc<dyn FileSystem>,
    filter: ActionFilter,
    snapshots: HashMap<PathBuf, DirectorySnapshot>,
}

impl<M: EpisodeMatcher> LibraryTracker<M> {
    pub fn new(matcher: M, fs: Arc<dyn FileSystem>, filter: ActionFilter) -> Self {
        Self {
            matcher,
            fs,
            filter,
            snapshots: HashMap::new(),
        }
    }

    pub fn matcher(&self) -> &M {
        &self.matcher
    }

    /// Take the initial listing of `folder`, so a later overflow can be
    /// answered with a diff.
    pub fn prime(&mut self, folder: &Path, subtree: bool) -> Result<()> {
        let snapshot = DirectorySnapshot::capture(self.fs.as_ref(), folder, subtree)?;
        debug!(folder = %folder.display(), entries = snapshot.len(), "folder listed");
        self.snapshots.insert(folder.to_path_buf(), snapshot);
        Ok(())
    }

    pub fn snapshot(&self, folder: &Path) -> Option<&DirectorySnapshot> {
        self.snapshots.get(folder)
    }

    pub fn process(&mut self, folder: &Path, records: &[ChangeRecord]) -> Vec<LibraryUpdate> {
        let mut updates = Vec::new();
        let mut carried: Option<LibraryEntry> = None;

        for (i, record) in records.iter().enumerate() {
            if record.action == ChangeAction::Rescan {
                carried = None;
                updates.extend(self.rescan(folder));
                continue;
            }
            if let Some(snapshot) = self.snapshots.get_mut(folder) {
                snapshot.apply(record);
            }

            let Some(available) = is_path_available(record.action) else {
                continue;
            };
            let path = folder.join(&record.relative_path);
            let kind = classify_path(self.fs.as_ref(), &path, record);
            let mut known = carried.take();

            if kind == PathKind::Directory {
                if !available {
                    if let Some(entry) = self.matcher.entry_for_folder(&path) {
                        let has_next = i + 1 < records.len();
                        if record.action == ChangeAction::RenamedOld && has_next {
                            carried = Some(entry);
                            continue;
                        }
                        known = Some(entry);
                    }
                }
                if let Some(entry) = known {
                    info!(title = %entry.title, folder = ?available.then_some(&path), "library folder moved");
                    updates.push(LibraryUpdate::FolderMoved {
                        entry,
                        folder: available.then_some(path),
                    });
                    continue;
                }
            }

            let Some(entry) = self.matcher.match_episode(&path) else {
                continue;
            };

            match kind {
                PathKind::Directory => {
                    if available && entry.folder.is_none() {
                        info!(title = %entry.title, folder = %path.display(), "library folder found");
                        updates.push(LibraryUpdate::FolderMoved {
                            entry,
                            folder: Some(path),
                        });
                    }
                }
                PathKind::File => {
                    if available && !self.filter.allows(record.action) {
                        continue;
                    }
                    // An episode only counts when it sits in its entry's folder.
                    let in_folder = entry
                        .folder
                        .as_deref()
                        .is_none_or(|f| path.parent() == Some(f));
                    updates.push(LibraryUpdate::EpisodeAvailability {
                        entry,
                        path,
                        available: available && in_folder,
                    });
                }
            }
        }

        updates
    }

    fn rescan(&mut self, folder: &Path) -> Vec<LibraryUpdate> {
        let Some(previous) = self.snapshots.get(folder) else {
            return vec![LibraryUpdate::RescanRequested {
                folder: folder.to_path_buf(),
            }];
        };

        let fresh = match DirectorySnapshot::capture(self.fs.as_ref(), folder, previous.subtree()) {
            Ok(fresh) => fresh,
            Err(err) => {
                warn!(folder = %folder.display(), error = %err, "rescan failed");
                return vec![LibraryUpdate::RescanRequested {
                    folder: folder.to_path_buf(),
                }];
            }
        };

        let diff = previous.diff(&fresh);
        info!(folder = %folder.display(), changes = diff.len(), "folder rescanned");
        self.snapshots.insert(folder.to_path_buf(), fresh);
        self.process(folder, &diff)
    }
}
