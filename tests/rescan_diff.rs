// tests/rescan_diff.rs

use std::error::Error;
use std::path::Path;

use foldermon::fs::mock::MockFileSystem;
use foldermon::library::DirectorySnapshot;
use foldermon::types::{ChangeAction, ChangeRecord};

type TestResult = Result<(), Box<dyn Error>>;

fn library() -> MockFileSystem {
    let fs = MockFileSystem::new();
    fs.add_file("/lib/ep01.mkv");
    fs.add_file("/lib/Frieren/ep01.mkv");
    fs.add_file("/lib/Frieren/extras/op.mkv");
    fs
}

#[test]
fn flat_capture_lists_direct_children_only() -> TestResult {
    let fs = library();
    let snap = DirectorySnapshot::capture(&fs, Path::new("/lib"), false)?;

    assert_eq!(snap.len(), 2);
    assert!(snap.contains("ep01.mkv"));
    assert!(snap.contains("Frieren"));
    assert!(!snap.contains("Frieren/ep01.mkv"));
    assert!(!snap.subtree());
    assert_eq!(snap.root(), Path::new("/lib"));
    Ok(())
}

#[test]
fn subtree_capture_uses_slash_separated_paths() -> TestResult {
    let fs = library();
    let snap = DirectorySnapshot::capture(&fs, Path::new("/lib"), true)?;

    assert_eq!(snap.len(), 5);
    assert!(snap.contains("Frieren/extras"));
    assert!(snap.contains("Frieren/extras/op.mkv"));
    Ok(())
}

#[test]
fn capture_of_missing_folder_fails() {
    let fs = MockFileSystem::new();
    assert!(DirectorySnapshot::capture(&fs, Path::new("/nowhere"), true).is_err());
}

#[test]
fn diff_lists_removals_before_additions() -> TestResult {
    let fs = library();
    let before = DirectorySnapshot::capture(&fs, Path::new("/lib"), true)?;

    fs.rename("/lib/Frieren", "/lib/Sousou no Frieren");
    fs.add_file("/lib/ep02.mkv");
    let after = DirectorySnapshot::capture(&fs, Path::new("/lib"), true)?;

    let diff = before.diff(&after);
    let removed: Vec<&ChangeRecord> = diff
        .iter()
        .take_while(|r| r.action == ChangeAction::Removed)
        .collect();
    assert_eq!(removed.len(), 4);
    assert!(diff[removed.len()..].iter().all(|r| r.action == ChangeAction::Added));
    assert!(diff.contains(&ChangeRecord::new(ChangeAction::Removed, "Frieren", true)));
    assert!(diff.contains(&ChangeRecord::new(ChangeAction::Added, "Sousou no Frieren", true)));
    assert!(diff.contains(&ChangeRecord::file(ChangeAction::Added, "ep02.mkv")));
    assert!(after.diff(&after).is_empty());
    Ok(())
}

#[test]
fn apply_follows_incremental_records() -> TestResult {
    let fs = library();
    let mut snap = DirectorySnapshot::capture(&fs, Path::new("/lib"), true)?;

    snap.apply(&ChangeRecord::new(ChangeAction::RenamedOld, "Frieren", true));
    assert!(!snap.contains("Frieren"));
    assert!(!snap.contains("Frieren/extras/op.mkv"));

    snap.apply(&ChangeRecord::new(ChangeAction::RenamedNew, "Sousou no Frieren", true));
    snap.apply(&ChangeRecord::file(ChangeAction::Modified, "ep01.mkv"));
    assert!(snap.contains("Sousou no Frieren"));
    assert!(snap.contains("ep01.mkv"));
    assert_eq!(snap.len(), 2);
    Ok(())
}

#[test]
fn flat_snapshot_ignores_nested_records() {
    let mut snap = DirectorySnapshot::empty("/lib", false);
    snap.apply(&ChangeRecord::file(ChangeAction::Added, "Frieren/ep01.mkv"));
    assert!(snap.is_empty());

    snap.apply(&ChangeRecord::file(ChangeAction::Added, "ep01.mkv"));
    assert_eq!(snap.len(), 1);
}
