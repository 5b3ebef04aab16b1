// src/decode/inotify.rs

//! `struct inotify_event` stream, as read from an inotify file descriptor.
//!
//! ```text
//! offset 0   i32  wd       watch descriptor (-1 for queue overflow)
//! offset 4   u32  mask     IN_* bits
//! offset 8   u32  cookie   pairs IN_MOVED_FROM with IN_MOVED_TO
//! offset 12  u32  len      size of the name field, NUL padded
//! offset 16  u8[len] name
//! ```
//!
//! The mask constants are mirrored here so decoding does not depend on the
//! Linux-only `libc` bindings.

use tracing::warn;

use super::{PendingRecord, pair_renames, read_bytes};
use crate::types::{ChangeAction, ChangeRecord};

pub const HEADER_LEN: usize = 16;

pub const IN_MODIFY: u32 = 0x0000_0002;
pub const IN_CLOSE_WRITE: u32 = 0x0000_0008;
pub const IN_MOVED_FROM: u32 = 0x0000_0040;
pub const IN_MOVED_TO: u32 = 0x0000_0080;
pub const IN_CREATE: u32 = 0x0000_0100;
pub const IN_DELETE: u32 = 0x0000_0200;
pub const IN_DELETE_SELF: u32 = 0x0000_0400;
pub const IN_MOVE_SELF: u32 = 0x0000_0800;
pub const IN_UNMOUNT: u32 = 0x0000_2000;
pub const IN_Q_OVERFLOW: u32 = 0x0000_4000;
pub const IN_IGNORED: u32 = 0x0000_8000;
pub const IN_ISDIR: u32 = 0x4000_0000;

/// One raw event, before it is turned into a [`ChangeRecord`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InotifyEvent {
    pub wd: i32,
    pub mask: u32,
    pub cookie: u32,
    /// Name relative to the directory of `wd`; empty for events about the
    /// watched directory itself.
    pub name: String,
}

impl InotifyEvent {
    pub fn is_dir(&self) -> bool {
        self.mask & IN_ISDIR != 0
    }

    pub fn is_overflow(&self) -> bool {
        self.mask & IN_Q_OVERFLOW != 0
    }

    /// The watched directory itself went away (or its watch was dropped).
    pub fn is_self_gone(&self) -> bool {
        self.mask & (IN_IGNORED | IN_DELETE_SELF | IN_MOVE_SELF | IN_UNMOUNT) != 0
    }

    pub fn action(&self) -> Option<ChangeAction> {
        let m = self.mask;
        if m & IN_CREATE != 0 {
            Some(ChangeAction::Added)
        } else if m & IN_DELETE != 0 {
            Some(ChangeAction::Removed)
        } else if m & IN_MOVED_FROM != 0 {
            Some(ChangeAction::RenamedOld)
        } else if m & IN_MOVED_TO != 0 {
            Some(ChangeAction::RenamedNew)
        } else if m & (IN_MODIFY | IN_CLOSE_WRITE) != 0 {
            Some(ChangeAction::Modified)
        } else {
            None
        }
    }
}

/// Split the first `len` bytes of `buffer` into raw events.
///
/// Stops at the first header or name that would extend past `len`.
pub fn parse_events(buffer: &[u8], len: usize) -> Vec<InotifyEvent> {
    let len = len.min(buffer.len());
    let data = &buffer[..len];

    let mut events = Vec::new();
    let mut offset = 0usize;

    while offset < len {
        let header = (
            read_bytes::<4>(data, offset),
            read_bytes::<4>(data, offset + 4),
            read_bytes::<4>(data, offset + 8),
            read_bytes::<4>(data, offset + 12),
        );
        let (Some(wd), Some(mask), Some(cookie), Some(name_len)) = header else {
            warn!(offset, len, "truncated inotify_event header; stopping");
            break;
        };
        let name_len = u32::from_ne_bytes(name_len) as usize;

        let name_start = offset + HEADER_LEN;
        let Some(name_end) = name_start.checked_add(name_len).filter(|end| *end <= len) else {
            warn!(offset, name_len, len, "inotify name runs past end of buffer; stopping");
            break;
        };

        let raw_name = &data[name_start..name_end];
        let trimmed = raw_name.split(|b| *b == 0).next().unwrap_or_default();

        events.push(InotifyEvent {
            wd: i32::from_ne_bytes(wd),
            mask: u32::from_ne_bytes(mask),
            cookie: u32::from_ne_bytes(cookie),
            name: String::from_utf8_lossy(trimmed).into_owned(),
        });

        offset = name_end;
    }

    events
}

/// Turn raw events into records.
///
/// `dir_of` maps a watch descriptor to the `/`-separated directory it
/// covers, relative to the watched root (`""` for the root itself).
/// Events on descriptors it does not know (already removed) are dropped.
pub fn to_records<F>(events: &[InotifyEvent], dir_of: F) -> Vec<ChangeRecord>
where
    F: Fn(i32) -> Option<String>,
{
    let entries = events
        .iter()
        .filter_map(|ev| pending_record(ev, &dir_of(ev.wd)?))
        .collect();

    pair_renames(entries)
}

/// The unpaired record for one event whose descriptor covers `dir`.
///
/// `None` for events that name nothing (about the watched directory
/// itself, or a queue overflow) and for masks with no matching action.
pub(crate) fn pending_record(ev: &InotifyEvent, dir: &str) -> Option<PendingRecord> {
    if ev.name.is_empty() || ev.is_overflow() {
        return None;
    }
    let action = ev.action()?;
    let path = if dir.is_empty() {
        ev.name.clone()
    } else {
        format!("{dir}/{}", ev.name)
    };
    let cookie = match action {
        ChangeAction::RenamedOld | ChangeAction::RenamedNew => ev.cookie,
        _ => 0,
    };
    Some(PendingRecord {
        action,
        path,
        is_directory: ev.is_dir(),
        cookie,
    })
}

/// Decode a single-directory buffer: every event is relative to the root.
pub fn decode(buffer: &[u8], len: usize) -> Vec<ChangeRecord> {
    to_records(&parse_events(buffer, len), |_| Some(String::new()))
}
