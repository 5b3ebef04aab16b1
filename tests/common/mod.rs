#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use foldermon::engine::{Controller, ControllerOptions, Notification};
use foldermon::mux::Multiplexer;
use foldermon_test_utils::{ScriptHandle, ScriptedMultiplexer};

pub use foldermon_test_utils::{init_tracing, with_timeout};

/// Everything the consumer callback received, in order.
pub type Seen = Arc<Mutex<Vec<Notification>>>;

/// A callback that records every notification into the returned list.
pub fn recorder() -> (Seen, impl FnMut(Notification) + Send + 'static) {
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (seen, move |n| sink.lock().unwrap().push(n))
}

/// Controller on the scripted backend, plus its script and recorder.
pub fn scripted_controller(
    options: ControllerOptions,
) -> (Controller<ScriptedMultiplexer>, ScriptHandle, Seen) {
    let script = ScriptHandle::new();
    let (seen, callback) = recorder();
    let controller = Controller::with_multiplexer(options, script.factory(), callback);
    (controller, script, seen)
}

/// Pump until `pred` holds for what has been seen, or five seconds pass.
pub fn pump_until<M, F>(controller: &mut Controller<M>, seen: &Seen, pred: F) -> bool
where
    M: Multiplexer,
    F: Fn(&[Notification]) -> bool,
{
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        controller.pump();
        if pred(&seen.lock().unwrap()) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(10));
    }
}

/// Wait (without pumping) until the script has no undelivered steps.
pub fn wait_for_script(script: &ScriptHandle) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while script.pending_steps() > 0 {
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(5));
    }
    true
}

pub fn changed_count(seen: &[Notification]) -> usize {
    seen.iter()
        .filter(|n| matches!(n, Notification::Changed { .. }))
        .count()
}

pub fn error_count(seen: &[Notification]) -> usize {
    seen.iter()
        .filter(|n| matches!(n, Notification::WatchError { .. }))
        .count()
}
