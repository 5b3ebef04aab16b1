use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

use foldermon::decode::notify_info;
use foldermon::mux::{
    CompletionEvent, Multiplexer, NotifyFilter, Outcome, StopSignal, Wakeup,
};
use foldermon::types::{ChangeRecord, WatchSpec};
use foldermon::watch::{Watch, WatchKey, WatchTable};

use crate::builders::encode_notify_information;

/// One scripted wakeup.
#[derive(Debug, Clone)]
enum Step {
    Completion {
        folder: PathBuf,
        outcome: Outcome,
        bytes: Vec<u8>,
    },
    WaitError,
}

#[derive(Debug, Default)]
struct ScriptState {
    steps: VecDeque<Step>,
    cancelled: VecDeque<WatchKey>,
    stop: bool,
    fail_create: bool,
    fail_open: HashSet<PathBuf>,
    fail_arm: HashSet<PathBuf>,
    keys: HashMap<PathBuf, WatchKey>,
    arms: HashMap<PathBuf, usize>,
    resyncs: HashMap<PathBuf, usize>,
    creates: usize,
}

#[derive(Debug, Default)]
struct Script {
    state: Mutex<ScriptState>,
    wake: Condvar,
}

impl Script {
    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap()
    }
}

/// Test-side handle used to script completions and inspect what the
/// engine asked the backend to do.
///
/// Completions are addressed by folder (canonical path, as returned by
/// `Controller::add_folder`) and buffer content is FILE_NOTIFY_INFORMATION.
#[derive(Debug, Clone, Default)]
pub struct ScriptHandle {
    script: Arc<Script>,
}

impl ScriptHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Multiplexer factory for `Controller::with_multiplexer`. Every call
    /// starts a fresh run sharing this script.
    pub fn factory(&self) -> impl FnMut() -> io::Result<ScriptedMultiplexer> + Send + 'static {
        let script = Arc::clone(&self.script);
        move || {
            let mut st = script.lock();
            if st.fail_create {
                return Err(io::Error::other("scripted multiplexer creation failure"));
            }
            st.creates += 1;
            st.stop = false;
            st.cancelled.clear();
            st.keys.clear();
            drop(st);
            Ok(ScriptedMultiplexer {
                script: Arc::clone(&script),
            })
        }
    }

    pub fn fail_create(&self, fail: bool) {
        self.script.lock().fail_create = fail;
    }

    pub fn fail_open(&self, folder: impl AsRef<Path>) {
        self.script.lock().fail_open.insert(folder.as_ref().to_path_buf());
    }

    pub fn fail_arm(&self, folder: impl AsRef<Path>) {
        self.script.lock().fail_arm.insert(folder.as_ref().to_path_buf());
    }

    fn push(&self, step: Step) {
        self.script.lock().steps.push_back(step);
        self.script.wake.notify_all();
    }

    pub fn complete(&self, folder: impl AsRef<Path>, outcome: Outcome, bytes: Vec<u8>) {
        self.push(Step::Completion {
            folder: folder.as_ref().to_path_buf(),
            outcome,
            bytes,
        });
    }

    /// An `Ok` completion carrying `(FILE_ACTION_*, name)` entries.
    pub fn complete_with(&self, folder: impl AsRef<Path>, entries: &[(u32, &str)]) {
        self.complete(folder, Outcome::Ok, encode_notify_information(entries));
    }

    pub fn overflow(&self, folder: impl AsRef<Path>) {
        self.complete(folder, Outcome::BufferOverflow, Vec::new());
    }

    pub fn invalidate(&self, folder: impl AsRef<Path>) {
        self.complete(folder, Outcome::HandleInvalid, Vec::new());
    }

    /// Make the next `wait_next` fail as if the completion object broke.
    pub fn break_wait(&self) {
        self.push(Step::WaitError);
    }

    /// How many reads were issued for `folder`, across all runs.
    pub fn arm_count(&self, folder: impl AsRef<Path>) -> usize {
        self.script
            .lock()
            .arms
            .get(folder.as_ref())
            .copied()
            .unwrap_or(0)
    }

    /// How many times the engine asked the backend to resync `folder`.
    pub fn resync_count(&self, folder: impl AsRef<Path>) -> usize {
        self.script
            .lock()
            .resyncs
            .get(folder.as_ref())
            .copied()
            .unwrap_or(0)
    }

    /// How many multiplexers (runs) were created.
    pub fn creates(&self) -> usize {
        self.script.lock().creates
    }

    pub fn pending_steps(&self) -> usize {
        self.script.lock().steps.len()
    }
}

#[derive(Debug)]
pub struct ScriptedHandle {
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ScriptStop {
    script: Arc<Script>,
}

impl StopSignal for ScriptStop {
    fn raise(&self) -> io::Result<()> {
        self.script.lock().stop = true;
        self.script.wake.notify_all();
        Ok(())
    }
}

/// In-memory [`Multiplexer`] driven by a [`ScriptHandle`].
#[derive(Debug)]
pub struct ScriptedMultiplexer {
    script: Arc<Script>,
}

impl Multiplexer for ScriptedMultiplexer {
    type Handle = ScriptedHandle;
    type Stop = ScriptStop;

    fn stop_signal(&self) -> ScriptStop {
        ScriptStop {
            script: Arc::clone(&self.script),
        }
    }

    fn open(&mut self, spec: &WatchSpec, key: WatchKey, _filter: NotifyFilter) -> io::Result<ScriptedHandle> {
        let mut st = self.script.lock();
        if st.fail_open.contains(&spec.path) {
            return Err(io::Error::new(io::ErrorKind::NotFound, "scripted open failure"));
        }
        st.keys.insert(spec.path.clone(), key);
        Ok(ScriptedHandle {
            path: spec.path.clone(),
        })
    }

    fn arm(&mut self, watch: &mut Watch<ScriptedHandle>) -> io::Result<()> {
        let mut st = self.script.lock();
        let path = watch.spec().path.clone();
        if st.fail_arm.contains(&path) {
            return Err(io::Error::other("scripted arm failure"));
        }
        *st.arms.entry(path).or_insert(0) += 1;
        Ok(())
    }

    fn wait_next(
        &mut self,
        watches: &mut WatchTable<ScriptedHandle>,
        timeout: Option<Duration>,
    ) -> io::Result<Wakeup> {
        let script = Arc::clone(&self.script);
        let mut st = script.lock();
        loop {
            if let Some(key) = st.cancelled.pop_front() {
                return Ok(Wakeup::Completion(CompletionEvent {
                    key,
                    bytes_transferred: 0,
                    outcome: Outcome::Cancelled,
                }));
            }
            if st.stop {
                return Ok(Wakeup::StopRequested);
            }

            if let Some(step) = st.steps.pop_front() {
                match step {
                    Step::WaitError => return Err(io::Error::other("scripted wait failure")),
                    Step::Completion {
                        folder,
                        outcome,
                        bytes,
                    } => {
                        let Some(&key) = st.keys.get(&folder) else {
                            continue;
                        };
                        let Some(watch) = watches.get_mut(key) else {
                            continue;
                        };
                        // A real OS never completes a read that was not issued.
                        if watch.pending().is_none() {
                            continue;
                        }
                        let buf = watch.buffer_mut().as_bytes_mut();
                        let len = bytes.len().min(buf.len());
                        buf[..len].copy_from_slice(&bytes[..len]);
                        return Ok(Wakeup::Completion(CompletionEvent {
                            key,
                            bytes_transferred: len,
                            outcome,
                        }));
                    }
                }
            }

            st = match timeout {
                None => script.wake.wait(st).unwrap(),
                Some(d) => {
                    let (guard, res) = script.wake.wait_timeout(st, d).unwrap();
                    if res.timed_out() {
                        return Ok(Wakeup::TimedOut);
                    }
                    guard
                }
            };
        }
    }

    fn decode(&mut self, watch: &mut Watch<ScriptedHandle>, len: usize) -> Vec<ChangeRecord> {
        notify_info::decode(watch.buffer().as_bytes(), len)
    }

    fn resync(&mut self, watch: &mut Watch<ScriptedHandle>) -> io::Result<()> {
        let path = watch.spec().path.clone();
        *self.script.lock().resyncs.entry(path).or_insert(0) += 1;
        Ok(())
    }

    fn cancel(&mut self, watch: &mut Watch<ScriptedHandle>) -> io::Result<()> {
        self.script.lock().cancelled.push_back(watch.key());
        self.script.wake.notify_all();
        Ok(())
    }
}
