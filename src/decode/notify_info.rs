// src/decode/notify_info.rs

//! `FILE_NOTIFY_INFORMATION` stream, as filled in by `ReadDirectoryChangesW`.
//!
//! ```text
//! offset 0   u32  next_entry_offset   (0 = last entry)
//! offset 4   u32  action              (1..=5)
//! offset 8   u32  file_name_length    (bytes, not characters)
//! offset 12  u16[file_name_length / 2] file_name (UTF-16LE, no terminator)
//! ```
//!
//! This layout does not say whether an entry is a directory, so every
//! record comes out with `is_directory = false`; consumers that care use
//! [`crate::library::classify_path`].

use tracing::{debug, warn};

use super::{PendingRecord, pair_renames, read_bytes};
use crate::types::{ChangeAction, ChangeRecord};

pub const HEADER_LEN: usize = 12;

pub const FILE_ACTION_ADDED: u32 = 1;
pub const FILE_ACTION_REMOVED: u32 = 2;
pub const FILE_ACTION_MODIFIED: u32 = 3;
pub const FILE_ACTION_RENAMED_OLD_NAME: u32 = 4;
pub const FILE_ACTION_RENAMED_NEW_NAME: u32 = 5;

pub fn action_from_code(code: u32) -> Option<ChangeAction> {
    match code {
        FILE_ACTION_ADDED => Some(ChangeAction::Added),
        FILE_ACTION_REMOVED => Some(ChangeAction::Removed),
        FILE_ACTION_MODIFIED => Some(ChangeAction::Modified),
        FILE_ACTION_RENAMED_OLD_NAME => Some(ChangeAction::RenamedOld),
        FILE_ACTION_RENAMED_NEW_NAME => Some(ChangeAction::RenamedNew),
        _ => None,
    }
}

/// Decode the first `len` bytes of `buffer`.
///
/// Stops at the first entry with `next_entry_offset == 0`, or as soon as an
/// entry would extend past `len`. `len == 0` is an empty batch.
pub fn decode(buffer: &[u8], len: usize) -> Vec<ChangeRecord> {
    let len = len.min(buffer.len());
    let data = &buffer[..len];

    let mut entries = Vec::new();
    let mut offset = 0usize;

    while offset < len {
        let header = (
            read_bytes::<4>(data, offset),
            read_bytes::<4>(data, offset + 4),
            read_bytes::<4>(data, offset + 8),
        );
        let (Some(next), Some(action), Some(name_len)) = header else {
            warn!(offset, len, "truncated FILE_NOTIFY_INFORMATION header; stopping");
            break;
        };
        let next = u32::from_le_bytes(next) as usize;
        let action = u32::from_le_bytes(action);
        let name_len = u32::from_le_bytes(name_len) as usize;

        let name_start = offset + HEADER_LEN;
        let Some(name_bytes) = name_start
            .checked_add(name_len)
            .and_then(|end| data.get(name_start..end))
        else {
            warn!(offset, name_len, len, "file name runs past end of buffer; stopping");
            break;
        };

        match action_from_code(action) {
            Some(action) => entries.push(PendingRecord {
                action,
                path: utf16_name(name_bytes),
                is_directory: false,
                cookie: 0,
            }),
            None => debug!(action, offset, "skipping unknown FILE_ACTION code"),
        }

        if next == 0 {
            break;
        }
        match offset.checked_add(next) {
            Some(n) => offset = n,
            None => break,
        }
    }

    pair_renames(entries)
}

fn utf16_name(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16_lossy(&units).replace('\\', "/")
}
