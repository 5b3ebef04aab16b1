// tests/config_loading.rs

mod common;
use crate::common::init_tracing;

use std::error::Error;
use std::fs;
use std::path::PathBuf;

use clap::Parser;
use foldermon::cli::CliArgs;
use foldermon::config::{RawConfigFile, load_and_validate, load_from_path};
use foldermon::errors::FoldermonError;
use foldermon::types::ChangeAction;
use foldermon_test_utils::builders::ConfigFileBuilder;
use tempfile::TempDir;

type TestResult = Result<(), Box<dyn Error>>;

fn write_config(dir: &TempDir, contents: &str) -> Result<PathBuf, Box<dyn Error>> {
    let path = dir.path().join("Foldermon.toml");
    fs::write(&path, contents)?;
    Ok(path)
}

#[test]
fn empty_file_gets_defaults() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let path = write_config(&dir, "")?;

    let cfg = load_and_validate(&path)?;
    assert_eq!(cfg.monitor.buffer_size, 4096);
    assert!(!cfg.monitor.require_folders);
    assert!(!cfg.monitor.notify_modifications);
    assert!(cfg.folder.is_empty());
    assert_eq!(cfg.library.patterns, vec!["*.mkv", "*.mp4", "*.avi"]);

    let options = cfg.controller_options();
    assert!(options.actionable.allows(ChangeAction::Added));
    assert!(options.actionable.allows(ChangeAction::RenamedNew));
    assert!(!options.actionable.allows(ChangeAction::Removed));
    assert!(!options.filter.modifications);
    Ok(())
}

#[test]
fn full_file_is_read_in_order() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let path = write_config(
        &dir,
        r#"
[monitor]
buffer_size = 8192
require_folders = true
notify_modifications = true
actionable = ["added", "renamed_new", "modified"]

[[folder]]
path = "/srv/media/anime"

[[folder]]
path = "/srv/media/incoming"
subtree = false

[library]
patterns = ["*.mkv"]
"#,
    )?;

    let cfg = load_and_validate(&path)?;
    assert_eq!(cfg.folder.len(), 2);
    assert_eq!(cfg.folder[0].path, PathBuf::from("/srv/media/anime"));
    assert!(cfg.folder[0].subtree);
    assert!(!cfg.folder[1].subtree);
    assert_eq!(cfg.library.patterns, vec!["*.mkv"]);

    let options = cfg.controller_options();
    assert_eq!(options.buffer_size, 8192);
    assert!(options.require_folders);
    assert!(options.filter.modifications);
    assert!(options.actionable.allows(ChangeAction::Modified));
    Ok(())
}

#[test]
fn unknown_action_is_a_parse_error() -> TestResult {
    let dir = TempDir::new()?;
    let path = write_config(&dir, "[monitor]\nactionable = [\"teleported\"]\n")?;

    assert!(matches!(
        load_from_path(&path),
        Err(FoldermonError::TomlError(_))
    ));
    Ok(())
}

#[test]
fn missing_file_is_an_io_error() -> TestResult {
    let dir = TempDir::new()?;
    let result = load_from_path(dir.path().join("nope.toml"));
    assert!(matches!(result, Err(FoldermonError::IoError(_))));
    Ok(())
}

#[test]
fn buffer_size_out_of_range_is_rejected() {
    for size in [0, 511, 65537] {
        let err = ConfigFileBuilder::new()
            .with_buffer_size(size)
            .try_build()
            .expect_err("buffer size should be rejected");
        match err {
            FoldermonError::ConfigError(msg) => assert!(msg.contains("buffer_size"), "{msg}"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
    ConfigFileBuilder::new().with_buffer_size(512).build();
    ConfigFileBuilder::new().with_buffer_size(65536).build();
}

#[test]
fn duplicate_folders_are_rejected_after_canonicalisation() {
    let err = ConfigFileBuilder::new()
        .with_folder("/srv/media/anime", true)
        .with_folder("/srv/media/./anime", false)
        .try_build()
        .expect_err("duplicate folder should be rejected");
    assert!(matches!(err, FoldermonError::ConfigError(msg) if msg.contains("more than once")));
}

#[test]
fn empty_folder_path_is_rejected() {
    let err = ConfigFileBuilder::new()
        .with_folder("", true)
        .try_build()
        .expect_err("empty path should be rejected");
    assert!(matches!(err, FoldermonError::ConfigError(msg) if msg.contains("empty path")));
}

#[test]
fn invalid_glob_is_rejected() {
    let err = ConfigFileBuilder::new()
        .with_patterns(&["*.mkv", "[unclosed"])
        .try_build()
        .expect_err("bad glob should be rejected");
    assert!(matches!(err, FoldermonError::ConfigError(msg) if msg.contains("[unclosed")));
}

#[test]
fn raw_config_defaults_match_validated_defaults() {
    let raw = RawConfigFile::default();
    let cfg = ConfigFileBuilder::new().build();
    assert_eq!(raw.monitor.buffer_size, cfg.monitor.buffer_size);
    assert_eq!(raw.library.patterns, cfg.library.patterns);
}

#[test]
fn cli_collects_extra_folders() -> TestResult {
    let args = CliArgs::try_parse_from([
        "foldermon",
        "--folder",
        "/srv/a",
        "--folder",
        "/srv/b",
        "--subtree",
        "--dry-run",
        "--log-level",
        "debug",
    ])?;
    assert_eq!(args.folders, vec![PathBuf::from("/srv/a"), PathBuf::from("/srv/b")]);
    assert!(args.subtree);
    assert!(args.dry_run);
    assert_eq!(args.config, "Foldermon.toml");
    Ok(())
}
