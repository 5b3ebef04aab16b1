// tests/decoder.rs

mod common;
use crate::common::init_tracing;

use std::error::Error;

use foldermon::decode::inotify::{
    self, IN_CLOSE_WRITE, IN_CREATE, IN_DELETE, IN_IGNORED, IN_ISDIR, IN_MODIFY, IN_MOVED_FROM,
    IN_MOVED_TO, IN_Q_OVERFLOW,
};
use foldermon::decode::notify_info::{
    self, FILE_ACTION_ADDED, FILE_ACTION_MODIFIED, FILE_ACTION_REMOVED,
    FILE_ACTION_RENAMED_NEW_NAME, FILE_ACTION_RENAMED_OLD_NAME,
};
use foldermon::types::{ChangeAction, ChangeRecord};
use foldermon_test_utils::builders::{RawInotify, encode_inotify, encode_notify_information};

type TestResult = Result<(), Box<dyn Error>>;

#[test]
fn notify_information_decodes_every_entry_in_order() -> TestResult {
    init_tracing();

    let buf = encode_notify_information(&[
        (FILE_ACTION_ADDED, "ep01.mkv"),
        (FILE_ACTION_MODIFIED, "ep01.mkv"),
        (FILE_ACTION_REMOVED, "old.txt"),
    ]);
    let records = notify_info::decode(&buf, buf.len());

    assert_eq!(
        records,
        vec![
            ChangeRecord::file(ChangeAction::Added, "ep01.mkv"),
            ChangeRecord::file(ChangeAction::Modified, "ep01.mkv"),
            ChangeRecord::file(ChangeAction::Removed, "old.txt"),
        ]
    );
    Ok(())
}

#[test]
fn zero_length_decodes_to_nothing() -> TestResult {
    let buf = encode_notify_information(&[(FILE_ACTION_ADDED, "ep01.mkv")]);
    assert!(notify_info::decode(&buf, 0).is_empty());

    let buf = encode_inotify(&[RawInotify::new(1, IN_CREATE, "ep01.mkv")]);
    assert!(inotify::decode(&buf, 0).is_empty());
    Ok(())
}

#[test]
fn notify_information_never_reads_past_len() -> TestResult {
    init_tracing();

    let buf = encode_notify_information(&[
        (FILE_ACTION_ADDED, "first.mkv"),
        (FILE_ACTION_ADDED, "second.mkv"),
    ]);
    // Cut inside the second entry's name.
    let first_len = 12 + "first.mkv".len() * 2;
    let cut = first_len.div_ceil(4) * 4 + 14;
    let records = notify_info::decode(&buf, cut);

    assert_eq!(records, vec![ChangeRecord::file(ChangeAction::Added, "first.mkv")]);

    // Cut inside the first header.
    assert!(notify_info::decode(&buf, 7).is_empty());
    Ok(())
}

#[test]
fn notify_information_skips_unknown_actions() -> TestResult {
    let buf = encode_notify_information(&[(99, "weird"), (FILE_ACTION_ADDED, "ep02.mkv")]);
    let records = notify_info::decode(&buf, buf.len());

    assert_eq!(records, vec![ChangeRecord::file(ChangeAction::Added, "ep02.mkv")]);
    Ok(())
}

#[test]
fn notify_information_names_are_utf16_with_forward_slashes() -> TestResult {
    let buf = encode_notify_information(&[(FILE_ACTION_ADDED, "Shōw\\Ep 01 – 「x」.mkv")]);
    let records = notify_info::decode(&buf, buf.len());

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].relative_path, "Shōw/Ep 01 – 「x」.mkv");
    assert!(!records[0].is_directory);
    Ok(())
}

#[test]
fn renames_come_out_as_adjacent_pairs() -> TestResult {
    let buf = encode_notify_information(&[
        (FILE_ACTION_RENAMED_OLD_NAME, "ep01.part"),
        (FILE_ACTION_RENAMED_NEW_NAME, "ep01.mkv"),
    ]);
    let records = notify_info::decode(&buf, buf.len());

    assert_eq!(
        records,
        vec![
            ChangeRecord::file(ChangeAction::RenamedOld, "ep01.part"),
            ChangeRecord::file(ChangeAction::RenamedNew, "ep01.mkv"),
        ]
    );
    Ok(())
}

#[test]
fn unpaired_rename_halves_are_downgraded() -> TestResult {
    let buf = encode_notify_information(&[
        (FILE_ACTION_RENAMED_OLD_NAME, "moved-away.mkv"),
        (FILE_ACTION_ADDED, "other.mkv"),
        (FILE_ACTION_RENAMED_NEW_NAME, "moved-in.mkv"),
    ]);
    let records = notify_info::decode(&buf, buf.len());

    assert_eq!(
        records,
        vec![
            ChangeRecord::file(ChangeAction::Removed, "moved-away.mkv"),
            ChangeRecord::file(ChangeAction::Added, "other.mkv"),
            ChangeRecord::file(ChangeAction::Added, "moved-in.mkv"),
        ]
    );
    Ok(())
}

#[test]
fn inotify_maps_masks_and_directory_flag() -> TestResult {
    init_tracing();

    let buf = encode_inotify(&[
        RawInotify::new(1, IN_CREATE, "ep01.mkv"),
        RawInotify::new(1, IN_CREATE | IN_ISDIR, "Season 2"),
        RawInotify::new(1, IN_MODIFY, "ep01.mkv"),
        RawInotify::new(1, IN_CLOSE_WRITE, "ep01.mkv"),
        RawInotify::new(1, IN_DELETE, "ep00.mkv"),
    ]);
    let records = inotify::decode(&buf, buf.len());

    assert_eq!(
        records,
        vec![
            ChangeRecord::file(ChangeAction::Added, "ep01.mkv"),
            ChangeRecord::new(ChangeAction::Added, "Season 2", true),
            ChangeRecord::file(ChangeAction::Modified, "ep01.mkv"),
            ChangeRecord::file(ChangeAction::Modified, "ep01.mkv"),
            ChangeRecord::file(ChangeAction::Removed, "ep00.mkv"),
        ]
    );
    Ok(())
}

#[test]
fn inotify_pairs_renames_by_cookie() -> TestResult {
    let buf = encode_inotify(&[
        RawInotify::new(1, IN_MOVED_FROM, "a.part").cookie(7),
        RawInotify::new(1, IN_CREATE, "b.mkv"),
        RawInotify::new(1, IN_MOVED_TO, "a.mkv").cookie(7),
    ]);
    let records = inotify::decode(&buf, buf.len());

    assert_eq!(records.len(), 3);
    let old = records
        .iter()
        .position(|r| r.action == ChangeAction::RenamedOld)
        .ok_or("no RenamedOld")?;
    assert_eq!(records[old].relative_path, "a.part");
    assert_eq!(records[old + 1], ChangeRecord::file(ChangeAction::RenamedNew, "a.mkv"));
    assert!(records.contains(&ChangeRecord::file(ChangeAction::Added, "b.mkv")));
    Ok(())
}

#[test]
fn inotify_skips_nameless_and_overflow_events() -> TestResult {
    let buf = encode_inotify(&[
        RawInotify::new(1, IN_IGNORED, ""),
        RawInotify::new(-1, IN_Q_OVERFLOW, ""),
        RawInotify::new(1, IN_CREATE, "ep03.mkv"),
    ]);

    let events = inotify::parse_events(&buf, buf.len());
    assert_eq!(events.len(), 3);
    assert!(events[1].is_overflow());
    assert!(events[0].is_self_gone());

    let records = inotify::decode(&buf, buf.len());
    assert_eq!(records, vec![ChangeRecord::file(ChangeAction::Added, "ep03.mkv")]);
    Ok(())
}

#[test]
fn inotify_names_are_joined_onto_their_directory() -> TestResult {
    let buf = encode_inotify(&[
        RawInotify::new(1, IN_CREATE, "top.mkv"),
        RawInotify::new(2, IN_CREATE, "ep02.mkv"),
        RawInotify::new(9, IN_CREATE, "unknown-wd.mkv"),
    ]);
    let events = inotify::parse_events(&buf, buf.len());
    let records = inotify::to_records(&events, |wd| match wd {
        1 => Some(String::new()),
        2 => Some("Season 1".to_string()),
        _ => None,
    });

    assert_eq!(
        records,
        vec![
            ChangeRecord::file(ChangeAction::Added, "top.mkv"),
            ChangeRecord::file(ChangeAction::Added, "Season 1/ep02.mkv"),
        ]
    );
    Ok(())
}

#[test]
fn inotify_truncated_name_ends_decoding() -> TestResult {
    let buf = encode_inotify(&[
        RawInotify::new(1, IN_CREATE, "ep01.mkv"),
        RawInotify::new(1, IN_CREATE, "ep02.mkv"),
    ]);
    let records = inotify::decode(&buf, buf.len() - 3);

    assert_eq!(records, vec![ChangeRecord::file(ChangeAction::Added, "ep01.mkv")]);
    Ok(())
}
