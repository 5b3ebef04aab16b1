// src/config/validate.rs

use std::collections::HashSet;

use globset::Glob;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{FoldermonError, Result};
use crate::watch::canonical_path;

/// Accepted `[monitor].buffer_size` range, in bytes.
pub const BUFFER_SIZE_RANGE: std::ops::RangeInclusive<usize> = 512..=65536;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = FoldermonError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.monitor, raw.folder, raw.library))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_monitor(cfg)?;
    validate_folders(cfg)?;
    validate_library(cfg)?;
    Ok(())
}

fn validate_monitor(cfg: &RawConfigFile) -> Result<()> {
    let size = cfg.monitor.buffer_size;
    if !BUFFER_SIZE_RANGE.contains(&size) {
        return Err(FoldermonError::ConfigError(format!(
            "[monitor].buffer_size must be between {} and {} (got {})",
            BUFFER_SIZE_RANGE.start(),
            BUFFER_SIZE_RANGE.end(),
            size
        )));
    }
    Ok(())
}

fn validate_folders(cfg: &RawConfigFile) -> Result<()> {
    let mut seen = HashSet::new();
    for (idx, folder) in cfg.folder.iter().enumerate() {
        if folder.path.as_os_str().is_empty() {
            return Err(FoldermonError::ConfigError(format!(
                "[[folder]] entry {} has an empty path",
                idx + 1
            )));
        }
        if !seen.insert(canonical_path(&folder.path)) {
            return Err(FoldermonError::ConfigError(format!(
                "folder '{}' is listed more than once",
                folder.path.display()
            )));
        }
    }
    Ok(())
}

fn validate_library(cfg: &RawConfigFile) -> Result<()> {
    for pattern in &cfg.library.patterns {
        Glob::new(pattern).map_err(|e| {
            FoldermonError::ConfigError(format!("invalid [library] pattern '{pattern}': {e}"))
        })?;
    }
    Ok(())
}
