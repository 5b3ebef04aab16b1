// src/library/classify.rs

use std::path::Path;

use crate::fs::FileSystem;
use crate::types::{ChangeAction, ChangeRecord};

/// Longest extension still taken to mean "this is a file".
pub const MAX_EXTENSION_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    File,
    Directory,
}

/// Whether the record's path exists after the change. `None` for actions
/// that do not name a path appearing or going away.
pub fn is_path_available(action: ChangeAction) -> Option<bool> {
    match action {
        ChangeAction::Added | ChangeAction::RenamedNew => Some(true),
        ChangeAction::Removed | ChangeAction::RenamedOld => Some(false),
        ChangeAction::Modified | ChangeAction::Rescan => None,
    }
}

/// `true` if `name` ends in a short alphanumeric extension, like `ep01.mkv`.
pub fn has_file_extension(name: &str, max_len: usize) -> bool {
    let Some((stem, ext)) = name.rsplit_once('.') else {
        return false;
    };
    !stem.is_empty()
        && !ext.is_empty()
        && ext.len() <= max_len
        && ext.chars().all(|c| c.is_ascii_alphanumeric())
}

/// File or directory?
///
/// The record's own flag wins when set. Otherwise an existing path is looked
/// up on disk, and a path that is gone is judged by its name alone.
pub fn classify_path(fs: &dyn FileSystem, path: &Path, record: &ChangeRecord) -> PathKind {
    if record.is_directory {
        return PathKind::Directory;
    }
    match is_path_available(record.action) {
        Some(true) if fs.exists(path) => {
            if fs.is_dir(path) {
                PathKind::Directory
            } else {
                PathKind::File
            }
        }
        _ => {
            let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
            if has_file_extension(&name, MAX_EXTENSION_LEN) {
                PathKind::File
            } else {
                PathKind::Directory
            }
        }
    }
}
