#![allow(dead_code)]

use std::path::PathBuf;

use foldermon::config::{ConfigFile, FolderConfig, RawConfigFile};
use foldermon::errors::FoldermonError;
use foldermon::types::ChangeAction;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn with_folder(mut self, path: impl Into<PathBuf>, subtree: bool) -> Self {
        self.config.folder.push(FolderConfig {
            path: path.into(),
            subtree,
        });
        self
    }

    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.config.monitor.buffer_size = size;
        self
    }

    pub fn require_folders(mut self, val: bool) -> Self {
        self.config.monitor.require_folders = val;
        self
    }

    pub fn notify_modifications(mut self, val: bool) -> Self {
        self.config.monitor.notify_modifications = val;
        self
    }

    pub fn with_actionable(mut self, actions: &[ChangeAction]) -> Self {
        self.config.monitor.actionable = actions.to_vec();
        self
    }

    pub fn with_patterns(mut self, patterns: &[&str]) -> Self {
        self.config.library.patterns = patterns.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn try_build(self) -> Result<ConfigFile, FoldermonError> {
        ConfigFile::try_from(self.config)
    }

    pub fn build(self) -> ConfigFile {
        self.try_build()
            .expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn pad4(len: usize) -> usize {
    len.div_ceil(4) * 4
}

/// Encode `(action code, name)` pairs as a `FILE_NOTIFY_INFORMATION` chain.
///
/// Entries are DWORD aligned like the real thing; the last one has
/// `next_entry_offset == 0`.
pub fn encode_notify_information(entries: &[(u32, &str)]) -> Vec<u8> {
    let mut out = Vec::new();
    for (i, (action, name)) in entries.iter().enumerate() {
        let name: Vec<u8> = name.encode_utf16().flat_map(u16::to_le_bytes).collect();
        let entry_len = pad4(12 + name.len());
        let next = if i + 1 == entries.len() { 0 } else { entry_len };

        let start = out.len();
        out.extend_from_slice(&(next as u32).to_le_bytes());
        out.extend_from_slice(&action.to_le_bytes());
        out.extend_from_slice(&(name.len() as u32).to_le_bytes());
        out.extend_from_slice(&name);
        out.resize(start + entry_len, 0);
    }
    out
}

/// One raw `inotify_event` for [`encode_inotify`].
#[derive(Debug, Clone, Copy)]
pub struct RawInotify<'a> {
    pub wd: i32,
    pub mask: u32,
    pub cookie: u32,
    pub name: &'a str,
}

impl<'a> RawInotify<'a> {
    pub fn new(wd: i32, mask: u32, name: &'a str) -> Self {
        Self {
            wd,
            mask,
            cookie: 0,
            name,
        }
    }

    pub fn cookie(mut self, cookie: u32) -> Self {
        self.cookie = cookie;
        self
    }
}

/// Encode events the way the kernel lays them out: native endian, names
/// NUL padded to a multiple of 4 bytes.
pub fn encode_inotify(events: &[RawInotify<'_>]) -> Vec<u8> {
    let mut out = Vec::new();
    for ev in events {
        let name_len = if ev.name.is_empty() {
            0
        } else {
            pad4(ev.name.len() + 1)
        };
        out.extend_from_slice(&ev.wd.to_ne_bytes());
        out.extend_from_slice(&ev.mask.to_ne_bytes());
        out.extend_from_slice(&ev.cookie.to_ne_bytes());
        out.extend_from_slice(&(name_len as u32).to_ne_bytes());
        let start = out.len();
        out.extend_from_slice(ev.name.as_bytes());
        out.resize(start + name_len, 0);
    }
    out
}
