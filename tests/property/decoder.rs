// tests/property/decoder.rs

use proptest::prelude::*;

use foldermon::decode::{inotify, notify_info};
use foldermon::types::ChangeAction;
use foldermon_test_utils::builders::{RawInotify, encode_inotify, encode_notify_information};

fn name_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 _.()\\[\\]-]{1,40}"
}

fn notify_entries() -> impl Strategy<Value = Vec<(u32, String)>> {
    proptest::collection::vec((1u32..=5, name_strategy()), 0..24)
}

fn inotify_events() -> impl Strategy<Value = Vec<(u32, u32, String)>> {
    let mask = prop_oneof![
        Just(inotify::IN_CREATE),
        Just(inotify::IN_DELETE),
        Just(inotify::IN_MODIFY),
        Just(inotify::IN_MOVED_FROM),
        Just(inotify::IN_MOVED_TO),
    ];
    proptest::collection::vec((mask, 0u32..4, name_strategy()), 0..24)
}

fn renames_are_adjacent(actions: &[ChangeAction]) -> bool {
    actions.iter().enumerate().all(|(i, a)| match a {
        ChangeAction::RenamedOld => actions.get(i + 1) == Some(&ChangeAction::RenamedNew),
        ChangeAction::RenamedNew => i > 0 && actions[i - 1] == ChangeAction::RenamedOld,
        _ => true,
    })
}

proptest! {
    #[test]
    fn notify_information_yields_one_record_per_entry(entries in notify_entries()) {
        let borrowed: Vec<(u32, &str)> = entries.iter().map(|(a, n)| (*a, n.as_str())).collect();
        let buf = encode_notify_information(&borrowed);

        let records = notify_info::decode(&buf, buf.len());
        prop_assert_eq!(records.len(), entries.len());

        let actions: Vec<ChangeAction> = records.iter().map(|r| r.action).collect();
        prop_assert!(renames_are_adjacent(&actions));
    }

    #[test]
    fn notify_information_prefix_never_yields_more(entries in notify_entries(), cut in 0usize..2048) {
        let borrowed: Vec<(u32, &str)> = entries.iter().map(|(a, n)| (*a, n.as_str())).collect();
        let buf = encode_notify_information(&borrowed);
        let cut = cut.min(buf.len());

        let records = notify_info::decode(&buf, cut);
        prop_assert!(records.len() <= entries.len());
        prop_assert!(records.len() <= cut / notify_info::HEADER_LEN);
    }

    #[test]
    fn arbitrary_bytes_never_panic(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
        let a = notify_info::decode(&bytes, bytes.len());
        let b = inotify::decode(&bytes, bytes.len());
        prop_assert!(a.len() <= bytes.len());
        prop_assert!(b.len() <= bytes.len() / inotify::HEADER_LEN);
    }

    #[test]
    fn inotify_yields_one_record_per_named_event(events in inotify_events()) {
        let raw: Vec<RawInotify<'_>> = events
            .iter()
            .map(|(mask, cookie, name)| RawInotify::new(1, *mask, name).cookie(*cookie))
            .collect();
        let buf = encode_inotify(&raw);

        let records = inotify::decode(&buf, buf.len());
        prop_assert_eq!(records.len(), events.len());

        let actions: Vec<ChangeAction> = records.iter().map(|r| r.action).collect();
        prop_assert!(renames_are_adjacent(&actions));
    }
}
