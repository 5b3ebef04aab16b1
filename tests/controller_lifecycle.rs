// tests/controller_lifecycle.rs

mod common;
use crate::common::{
    changed_count, error_count, init_tracing, pump_until, scripted_controller, wait_for_script,
};

use std::error::Error;

use foldermon::decode::notify_info::FILE_ACTION_ADDED;
use foldermon::engine::{ControllerOptions, Notification};
use foldermon::errors::{StartError, WatchError};
use foldermon::types::{ChangeAction, ChangeRecord, EngineState, WatchState};

type TestResult = Result<(), Box<dyn Error>>;

#[test]
fn empty_start_is_a_noop_unless_folders_are_required() -> TestResult {
    init_tracing();

    let (mut controller, script, _seen) = scripted_controller(ControllerOptions::default());
    controller.start()?;
    assert_eq!(controller.state(), EngineState::Stopped);
    assert_eq!(script.creates(), 0);

    let options = ControllerOptions {
        require_folders: true,
        ..ControllerOptions::default()
    };
    let (mut strict, _script, _seen) = scripted_controller(options);
    assert!(matches!(strict.start(), Err(StartError::NoFoldersRegistered)));
    assert_eq!(strict.state(), EngineState::Stopped);
    Ok(())
}

#[test]
fn unopenable_folder_is_reported_first_and_others_start() -> TestResult {
    init_tracing();
    let (mut controller, script, seen) = scripted_controller(ControllerOptions::default());

    let a = controller.add_folder("/library/missing", false)?;
    let b = controller.add_folder("/library/present", false)?;
    script.fail_open(&a);

    controller.start()?;
    assert_eq!(controller.state(), EngineState::Active);
    assert_eq!(controller.watch_state(&a), Some(WatchState::Skipped));
    assert_eq!(controller.watch_state(&b), Some(WatchState::Armed));

    script.complete_with(&b, &[(FILE_ACTION_ADDED, "ep01.mkv")]);
    assert!(pump_until(&mut controller, &seen, |s| changed_count(s) == 1));

    let seen = seen.lock().unwrap();
    assert_eq!(error_count(&seen), 1);
    match &seen[0] {
        Notification::WatchError { folder, error } => {
            assert_eq!(folder, &a);
            assert!(matches!(error, WatchError::HandleOpenFailed { .. }));
        }
        other => panic!("expected WatchError first, got {other:?}"),
    }
    match &seen[1] {
        Notification::Changed { folder, records } => {
            assert_eq!(folder, &b);
            assert_eq!(records, &vec![ChangeRecord::file(ChangeAction::Added, "ep01.mkv")]);
        }
        other => panic!("expected Changed, got {other:?}"),
    }
    Ok(())
}

#[test]
fn stop_is_idempotent_and_nothing_arrives_afterwards() -> TestResult {
    init_tracing();
    let (mut controller, script, seen) = scripted_controller(ControllerOptions::default());
    let a = controller.add_folder("/library/a", false)?;
    controller.start()?;

    script.complete_with(&a, &[(FILE_ACTION_ADDED, "ep01.mkv")]);
    assert!(pump_until(&mut controller, &seen, |s| changed_count(s) == 1));

    controller.stop();
    assert_eq!(controller.state(), EngineState::Stopped);
    assert_eq!(controller.watch_state(&a), Some(WatchState::Stopped));

    controller.stop();
    script.complete_with(&a, &[(FILE_ACTION_ADDED, "ep02.mkv")]);
    assert_eq!(controller.pump(), 0);
    assert_eq!(seen.lock().unwrap().len(), 1);
    Ok(())
}

#[test]
fn stop_delivers_what_the_worker_already_queued() -> TestResult {
    init_tracing();
    let (mut controller, script, seen) = scripted_controller(ControllerOptions::default());
    let a = controller.add_folder("/library/a", false)?;
    controller.start()?;

    script.complete_with(&a, &[(FILE_ACTION_ADDED, "ep01.mkv")]);
    assert!(wait_for_script(&script));

    controller.stop();
    assert_eq!(changed_count(&seen.lock().unwrap()), 1);
    Ok(())
}

#[test]
fn disabled_controller_drops_notifications() -> TestResult {
    init_tracing();
    let (mut controller, script, seen) = scripted_controller(ControllerOptions::default());
    let a = controller.add_folder("/library/a", false)?;
    controller.start()?;

    controller.set_enabled(false);
    script.complete_with(&a, &[(FILE_ACTION_ADDED, "dropped.mkv")]);
    assert!(wait_for_script(&script));
    // stop() joins the worker and flushes its queue through the gate.
    controller.stop();
    assert!(seen.lock().unwrap().is_empty());
    assert!(!controller.is_enabled());

    controller.set_enabled(true);
    controller.start()?;
    script.complete_with(&a, &[(FILE_ACTION_ADDED, "kept.mkv")]);
    assert!(pump_until(&mut controller, &seen, |s| changed_count(s) == 1));

    let seen = seen.lock().unwrap();
    match &seen[0] {
        Notification::Changed { records, .. } => assert_eq!(records[0].relative_path, "kept.mkv"),
        other => panic!("expected Changed, got {other:?}"),
    }
    Ok(())
}

#[test]
fn start_while_active_is_a_noop() -> TestResult {
    let (mut controller, script, _seen) = scripted_controller(ControllerOptions::default());
    let a = controller.add_folder("/library/a", false)?;
    controller.start()?;
    controller.start()?;

    assert_eq!(script.creates(), 1);
    assert_eq!(script.arm_count(&a), 1);
    Ok(())
}

#[test]
fn multiplexer_failure_leaves_engine_stopped() -> TestResult {
    init_tracing();
    let (mut controller, script, _seen) = scripted_controller(ControllerOptions::default());
    let a = controller.add_folder("/library/a", false)?;
    script.fail_create(true);

    assert!(matches!(controller.start(), Err(StartError::Multiplexer(_))));
    assert_eq!(controller.state(), EngineState::Stopped);
    assert_eq!(controller.watch_state(&a), Some(WatchState::Stopped));

    // Registry is still mutable.
    controller.add_folder("/library/b", false)?;

    script.fail_create(false);
    controller.start()?;
    assert_eq!(controller.state(), EngineState::Active);
    Ok(())
}

#[test]
fn restart_uses_a_fresh_run() -> TestResult {
    init_tracing();
    let (mut controller, script, seen) = scripted_controller(ControllerOptions::default());
    let a = controller.add_folder("/library/a", false)?;

    controller.start()?;
    controller.stop();
    controller.start()?;
    assert_eq!(script.creates(), 2);
    assert_eq!(script.arm_count(&a), 2);

    script.complete_with(&a, &[(FILE_ACTION_ADDED, "ep05.mkv")]);
    assert!(pump_until(&mut controller, &seen, |s| changed_count(s) == 1));
    Ok(())
}

#[test]
fn reload_replaces_the_folder_set() -> TestResult {
    init_tracing();
    let (mut controller, script, seen) = scripted_controller(ControllerOptions::default());
    let old = controller.add_folder("/library/old", false)?;
    controller.start()?;

    controller.reload([("/library/new", true), ("/library/new", true)])?;
    assert_eq!(controller.state(), EngineState::Active);
    assert_eq!(controller.registry().len(), 1);
    assert!(!controller.registry().contains(&old));

    let new = controller
        .registry()
        .snapshot()
        .pop()
        .ok_or("no folder after reload")?;
    assert!(new.watch_subtree);
    assert_eq!(controller.watch_state(&new.path), Some(WatchState::Armed));

    script.complete_with(&new.path, &[(FILE_ACTION_ADDED, "ep01.mkv")]);
    assert!(pump_until(&mut controller, &seen, |s| changed_count(s) == 1));
    Ok(())
}

#[test]
fn action_filter_defaults_to_arrivals() -> TestResult {
    let (controller, _script, _seen) = scripted_controller(ControllerOptions::default());

    assert!(controller.is_actionable(&ChangeRecord::file(ChangeAction::Added, "a.mkv")));
    assert!(controller.is_actionable(&ChangeRecord::file(ChangeAction::RenamedNew, "a.mkv")));
    assert!(!controller.is_actionable(&ChangeRecord::file(ChangeAction::Removed, "a.mkv")));
    assert!(!controller.is_actionable(&ChangeRecord::file(ChangeAction::Modified, "a.mkv")));
    assert!(!controller.is_actionable(&ChangeRecord::file(ChangeAction::Rescan, "/library")));
    Ok(())
}
