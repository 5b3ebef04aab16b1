// src/library/rescan.rs

//! Full listings of a watched folder.
//!
//! After a `Rescan` record the incremental history is gone; the tracker
//! lists the folder again and diffs the result against what it last knew.
//! The listing is kept current between rescans by applying every record
//! to it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::fs::FileSystem;
use crate::types::{ChangeAction, ChangeRecord};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectorySnapshot {
    root: PathBuf,
    subtree: bool,
    /// `/`-separated path relative to `root` → is a directory.
    entries: BTreeMap<String, bool>,
}

impl DirectorySnapshot {
    pub fn empty(root: impl Into<PathBuf>, subtree: bool) -> Self {
        Self {
            root: root.into(),
            subtree,
            entries: BTreeMap::new(),
        }
    }

    /// List `root` (and, with `subtree`, everything below it).
    pub fn capture(fs: &dyn FileSystem, root: &Path, subtree: bool) -> Result<Self> {
        let mut snapshot = Self::empty(root, subtree);
        let mut stack = vec![root.to_path_buf()];

        while let Some(dir) = stack.pop() {
            let children = fs
                .read_dir(&dir)
                .with_context(|| format!("listing {:?} for rescan", dir))?;
            for child in children {
                let Some(rel) = relative(root, &child) else {
                    continue;
                };
                let is_dir = fs.is_dir(&child);
                if is_dir && subtree {
                    stack.push(child);
                }
                snapshot.entries.insert(rel, is_dir);
            }
        }

        Ok(snapshot)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn subtree(&self) -> bool {
        self.subtree
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, relative_path: &str) -> bool {
        self.entries.contains_key(relative_path)
    }

    /// Fold one incremental record into the listing.
    pub fn apply(&mut self, record: &ChangeRecord) {
        let path = record.relative_path.as_str();
        if !self.subtree && path.contains('/') {
            return;
        }
        match record.action {
            ChangeAction::Added | ChangeAction::RenamedNew => {
                self.entries.insert(path.to_string(), record.is_directory);
            }
            ChangeAction::Removed | ChangeAction::RenamedOld => {
                let prefix = format!("{path}/");
                self.entries
                    .retain(|existing, _| existing != path && !existing.starts_with(&prefix));
            }
            ChangeAction::Modified | ChangeAction::Rescan => {}
        }
    }

    /// Records that turn `self` into `newer`: removals first, then
    /// additions, each in path order.
    pub fn diff(&self, newer: &DirectorySnapshot) -> Vec<ChangeRecord> {
        let removed = self
            .entries
            .iter()
            .filter(|(path, _)| !newer.entries.contains_key(*path))
            .map(|(path, is_dir)| ChangeRecord::new(ChangeAction::Removed, path.clone(), *is_dir));
        let added = newer
            .entries
            .iter()
            .filter(|(path, _)| !self.entries.contains_key(*path))
            .map(|(path, is_dir)| ChangeRecord::new(ChangeAction::Added, path.clone(), *is_dir));
        removed.chain(added).collect()
    }
}

fn relative(root: &Path, path: &Path) -> Option<String> {
    let rest = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rest
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}
