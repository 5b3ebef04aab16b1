// src/decode/mod.rs

//! Decoding of raw notification buffers into [`ChangeRecord`]s.
//!
//! Every OS hands directory notifications back as a packed stream of
//! fixed-header, variable-length entries. Each layout lives in its own
//! submodule and only ever looks at `buffer[..len]`:
//!
//! - [`notify_info`]: the `FILE_NOTIFY_INFORMATION` chain produced by
//!   `ReadDirectoryChangesW` (UTF-16 names, offset-linked entries).
//! - [`inotify`]: the `struct inotify_event` stream read from an inotify fd
//!   (native-endian header, NUL-padded name).
//!
//! Both are pure functions with no I/O, so they are tested on every
//! platform regardless of which backend is compiled in.
//!
//! Rename handling is shared: the output always carries renames as an
//! adjacent `RenamedOld`, `RenamedNew` pair. A half without a partner is
//! downgraded to `Removed` / `Added` so that invariant holds for every
//! buffer, including ones where the other half fell outside the watch.

pub mod inotify;
pub mod notify_info;

use crate::types::{ChangeAction, ChangeRecord};

/// One decoded entry before rename pairing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PendingRecord {
    pub action: ChangeAction,
    pub path: String,
    pub is_directory: bool,
    /// Rename correlation id; 0 means "pair positionally".
    pub cookie: u32,
}

/// Turn decoded entries into records, making rename pairs adjacent.
///
/// Produces exactly one record per input entry.
pub(crate) fn pair_renames(entries: Vec<PendingRecord>) -> Vec<ChangeRecord> {
    let mut slots: Vec<Option<PendingRecord>> = entries.into_iter().map(Some).collect();
    let mut out = Vec::with_capacity(slots.len());

    for i in 0..slots.len() {
        let Some(entry) = slots[i].take() else {
            continue;
        };

        match entry.action {
            ChangeAction::RenamedOld => match take_partner(&mut slots, i, entry.cookie) {
                Some(new) => {
                    out.push(into_record(entry, ChangeAction::RenamedOld));
                    out.push(into_record(new, ChangeAction::RenamedNew));
                }
                None => out.push(into_record(entry, ChangeAction::Removed)),
            },
            // A new name whose old half was not seen just before it.
            ChangeAction::RenamedNew => out.push(into_record(entry, ChangeAction::Added)),
            action => out.push(into_record(entry, action)),
        }
    }

    out
}

fn take_partner(
    slots: &mut [Option<PendingRecord>],
    old_index: usize,
    cookie: u32,
) -> Option<PendingRecord> {
    let is_partner = |slot: &Option<PendingRecord>| {
        matches!(slot, Some(p) if p.action == ChangeAction::RenamedNew && p.cookie == cookie)
    };

    if cookie == 0 {
        let next = old_index + 1;
        if next < slots.len() && is_partner(&slots[next]) {
            return slots[next].take();
        }
        return None;
    }

    let found = (old_index + 1..slots.len()).find(|&j| is_partner(&slots[j]))?;
    slots[found].take()
}

fn into_record(entry: PendingRecord, action: ChangeAction) -> ChangeRecord {
    ChangeRecord::new(action, entry.path, entry.is_directory)
}

/// Copy `N` bytes starting at `offset`, if they lie inside `buf`.
pub(crate) fn read_bytes<const N: usize>(buf: &[u8], offset: usize) -> Option<[u8; N]> {
    let end = offset.checked_add(N)?;
    buf.get(offset..end)?.try_into().ok()
}
