// src/mux/linux.rs

//! epoll + inotify backend.
//!
//! inotify is readiness based, so "one outstanding read" is modelled with
//! `EPOLLONESHOT`: arming a Watch enables its inotify descriptor in the epoll
//! set, and the first readiness report disables it again. `wait_next` then
//! performs the read into the Watch's buffer, which is what a completion port
//! would have done on its own.
//!
//! - Each Watch gets its own inotify instance, so one folder's queue
//!   overflowing never affects another.
//! - Subtree Watches add one inotify watch per directory and keep a
//!   descriptor → relative directory map that follows creates, renames and
//!   deletes.
//! - The stop signal is an eventfd registered level-triggered under a
//!   reserved key.

use std::collections::{HashMap, HashSet, VecDeque};
use std::ffi::CString;
use std::fs;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace, warn};

use super::{CompletionEvent, Multiplexer, NotifyFilter, Outcome, StopSignal, Wakeup};
use crate::decode::inotify::{
    self as ino, IN_CREATE, IN_DELETE, IN_DELETE_SELF, IN_MODIFY, IN_MOVE_SELF, IN_MOVED_FROM,
    IN_MOVED_TO, InotifyEvent,
};
use crate::decode::{PendingRecord, pair_renames};
use crate::types::{ChangeAction, ChangeRecord, WatchSpec};
use crate::watch::{Watch, WatchKey, WatchTable};

/// epoll user data for the stop eventfd. Watch keys are table indices and
/// never get this large.
const STOP_TOKEN: u64 = u64::MAX;

fn cvt(ret: libc::c_int) -> io::Result<libc::c_int> {
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret)
    }
}

fn owned(fd: RawFd) -> OwnedFd {
    // SAFETY: only called with a descriptor freshly returned by the kernel
    // that nothing else owns.
    unsafe { OwnedFd::from_raw_fd(fd) }
}

fn watch_mask(filter: NotifyFilter) -> u32 {
    let mut mask = IN_CREATE | IN_DELETE | IN_MOVED_FROM | IN_MOVED_TO | IN_DELETE_SELF | IN_MOVE_SELF;
    if filter.modifications {
        mask |= IN_MODIFY;
    }
    mask
}

/// Directory handle for one Watch.
#[derive(Debug)]
pub struct InotifyHandle {
    fd: OwnedFd,
    root: PathBuf,
    root_wd: i32,
    subtree: bool,
    mask: u32,
    /// Watch descriptor → directory relative to `root` (`""` for the root).
    dirs: HashMap<i32, String>,
}

impl InotifyHandle {
    fn add_watch(&self, path: &Path, mask: u32) -> io::Result<i32> {
        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        // SAFETY: `c_path` is NUL terminated and outlives the call.
        let wd = unsafe { libc::inotify_add_watch(self.fd.as_raw_fd(), c_path.as_ptr(), mask) };
        cvt(wd)
    }

    fn subdir_mask(&self) -> u32 {
        self.mask | libc::IN_ONLYDIR | libc::IN_DONT_FOLLOW
    }

    /// Watch every directory below `rel` (which is already watched).
    ///
    /// Returns what was found there, so entries that appeared before the
    /// watches existed are still reported.
    fn watch_tree(&mut self, rel: &str) -> Vec<PendingRecord> {
        let mut found = Vec::new();
        let mut stack = vec![rel.to_string()];

        while let Some(dir) = stack.pop() {
            for (child, is_dir) in self.list(&dir) {
                found.push(PendingRecord {
                    action: ChangeAction::Added,
                    path: child.clone(),
                    is_directory: is_dir,
                    cookie: 0,
                });
                if !is_dir {
                    continue;
                }
                match self.add_watch(&self.root.join(&child), self.subdir_mask()) {
                    Ok(wd) => {
                        trace!(wd, dir = %child, "subdirectory watched");
                        self.dirs.insert(wd, child.clone());
                        stack.push(child);
                    }
                    Err(err) => {
                        debug!(dir = %child, error = %err, "cannot watch subdirectory");
                    }
                }
            }
        }

        found
    }

    /// Entries directly inside `rel`, as (relative path, is directory).
    /// Symlinks are never reported as directories.
    fn list(&self, rel: &str) -> Vec<(String, bool)> {
        let abs = self.root.join(rel);
        let entries = match fs::read_dir(&abs) {
            Ok(entries) => entries,
            Err(err) => {
                debug!(dir = %abs.display(), error = %err, "cannot list directory");
                return Vec::new();
            }
        };

        entries
            .flatten()
            .filter_map(|entry| {
                let is_dir = entry.file_type().ok()?.is_dir();
                let name = entry.file_name().to_string_lossy().into_owned();
                let child = if rel.is_empty() { name } else { format!("{rel}/{name}") };
                Some((child, is_dir))
            })
            .collect()
    }

    /// Make the descriptor map match the directories currently on disk.
    ///
    /// Every directory gets (re)added, which hands back the existing
    /// descriptor for one already watched, so renamed directories pick up
    /// their new names. Descriptors no directory claimed are dropped.
    /// Returns how many directories were not watched before.
    fn sync_tree(&mut self) -> usize {
        let mut live = HashSet::from([self.root_wd]);
        let mut added = 0;
        let mut stack = vec![String::new()];

        while let Some(dir) = stack.pop() {
            for (child, is_dir) in self.list(&dir) {
                if !is_dir {
                    continue;
                }
                match self.add_watch(&self.root.join(&child), self.subdir_mask()) {
                    Ok(wd) => {
                        if self.dirs.insert(wd, child.clone()).is_none() {
                            trace!(wd, dir = %child, "subdirectory watched");
                            added += 1;
                        }
                        live.insert(wd);
                        stack.push(child);
                    }
                    Err(err) => {
                        debug!(dir = %child, error = %err, "cannot watch subdirectory");
                    }
                }
            }
        }

        let stale: Vec<i32> = self.dirs.keys().filter(|wd| !live.contains(*wd)).copied().collect();
        for wd in stale {
            if let Some(dir) = self.dirs.remove(&wd) {
                trace!(wd, dir = %dir, "subdirectory no longer present");
            }
            // Usually already gone in the kernel; the error is irrelevant.
            // SAFETY: plain syscall on a descriptor we own.
            unsafe { libc::inotify_rm_watch(self.fd.as_raw_fd(), wd) };
        }

        added
    }

    /// Forget (and stop watching) `rel` and everything below it.
    fn unwatch_tree(&mut self, rel: &str) {
        let prefix = format!("{rel}/");
        let gone: Vec<i32> = self
            .dirs
            .iter()
            .filter(|(wd, dir)| **wd != self.root_wd && (*dir == rel || dir.starts_with(&prefix)))
            .map(|(wd, _)| *wd)
            .collect();
        for wd in gone {
            self.dirs.remove(&wd);
            // SAFETY: plain syscall on a descriptor we own.
            unsafe { libc::inotify_rm_watch(self.fd.as_raw_fd(), wd) };
        }
    }

    fn rename_tree(&mut self, from: &str, to: &str) {
        let prefix = format!("{from}/");
        for dir in self.dirs.values_mut() {
            if dir == from {
                *dir = to.to_string();
            } else if let Some(rest) = dir.strip_prefix(&prefix) {
                *dir = format!("{to}/{rest}");
            }
        }
    }

    /// Resolve a batch into records, in order.
    ///
    /// Each event is resolved against the descriptor map as it stands at
    /// that point in the batch: a directory create, rename or delete is
    /// applied before the events after it are looked at.
    fn records(&mut self, events: &[InotifyEvent]) -> Vec<ChangeRecord> {
        let mut pending = Vec::with_capacity(events.len());
        let mut moved_from: HashMap<u32, String> = HashMap::new();

        for ev in events {
            if ev.wd != self.root_wd && ev.mask & ino::IN_IGNORED != 0 {
                self.dirs.remove(&ev.wd);
                continue;
            }
            let Some(dir) = self.dirs.get(&ev.wd) else {
                continue;
            };
            let Some(entry) = ino::pending_record(ev, dir) else {
                continue;
            };
            let rel = entry.path.clone();
            pending.push(entry);

            if !self.subtree || !ev.is_dir() {
                continue;
            }
            if ev.mask & IN_MOVED_FROM != 0 {
                moved_from.insert(ev.cookie, rel);
            } else if ev.mask & IN_MOVED_TO != 0 {
                match moved_from.remove(&ev.cookie) {
                    Some(old) => self.rename_tree(&old, &rel),
                    None => pending.extend(self.watch_new_dir(&rel)),
                }
            } else if ev.mask & IN_CREATE != 0 {
                pending.extend(self.watch_new_dir(&rel));
            } else if ev.mask & IN_DELETE != 0 {
                self.unwatch_tree(&rel);
            }
        }

        // Moved somewhere outside the tree.
        for rel in moved_from.into_values() {
            self.unwatch_tree(&rel);
        }

        pair_renames(pending)
    }

    fn watch_new_dir(&mut self, rel: &str) -> Vec<PendingRecord> {
        match self.add_watch(&self.root.join(rel), self.subdir_mask()) {
            Ok(wd) => {
                self.dirs.insert(wd, rel.to_string());
                self.watch_tree(rel)
            }
            Err(err) => {
                debug!(dir = %rel, error = %err, "new subdirectory vanished before it was watched");
                Vec::new()
            }
        }
    }
}

/// How a batch read from a Watch's inotify descriptor should be treated.
///
/// The root going away wins over an overflow: a Watch whose root is gone
/// cannot be rescanned.
pub fn classify_batch(events: &[InotifyEvent], root_wd: i32) -> Outcome {
    if events.iter().any(|ev| ev.wd == root_wd && ev.is_self_gone()) {
        Outcome::HandleInvalid
    } else if events.iter().any(InotifyEvent::is_overflow) {
        Outcome::BufferOverflow
    } else {
        Outcome::Ok
    }
}

/// eventfd-backed [`StopSignal`].
#[derive(Debug, Clone)]
pub struct EventFdStop {
    fd: Arc<OwnedFd>,
}

impl StopSignal for EventFdStop {
    fn raise(&self) -> io::Result<()> {
        let one: u64 = 1;
        // SAFETY: writes exactly the 8 bytes of `one`.
        let ret = unsafe {
            libc::write(
                self.fd.as_raw_fd(),
                (&one as *const u64).cast(),
                std::mem::size_of::<u64>(),
            )
        };
        if ret < 0 {
            let err = io::Error::last_os_error();
            // Counter already non-zero: the signal is raised either way.
            if err.kind() != io::ErrorKind::WouldBlock {
                return Err(err);
            }
        }
        Ok(())
    }
}

/// Linux [`Multiplexer`].
#[derive(Debug)]
pub struct EpollMultiplexer {
    epoll: OwnedFd,
    stop: Arc<OwnedFd>,
    /// Completions produced without the kernel (cancellation), returned
    /// before anything epoll reports.
    synthetic: VecDeque<CompletionEvent>,
}

impl EpollMultiplexer {
    pub fn new() -> io::Result<Self> {
        // SAFETY: plain syscalls; results are checked before use.
        let epoll = owned(cvt(unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) })?);
        let stop = owned(cvt(unsafe { libc::eventfd(0, libc::EFD_CLOEXEC | libc::EFD_NONBLOCK) })?);

        let mux = Self {
            epoll,
            stop: Arc::new(stop),
            synthetic: VecDeque::new(),
        };
        mux.ctl(libc::EPOLL_CTL_ADD, mux.stop.as_raw_fd(), libc::EPOLLIN as u32, STOP_TOKEN)?;
        Ok(mux)
    }

    fn ctl(&self, op: libc::c_int, fd: RawFd, events: u32, token: u64) -> io::Result<()> {
        let mut event = libc::epoll_event { events, u64: token };
        // SAFETY: `event` is a valid epoll_event for the duration of the call.
        cvt(unsafe { libc::epoll_ctl(self.epoll.as_raw_fd(), op, fd, &mut event) })?;
        Ok(())
    }

    fn read_into(watch: &mut Watch<InotifyHandle>) -> CompletionEvent {
        let key = watch.key();
        let (handle, buffer) = watch.parts_mut();
        let Some(handle) = handle else {
            return CompletionEvent {
                key,
                bytes_transferred: 0,
                outcome: Outcome::HandleInvalid,
            };
        };

        let buf = buffer.as_bytes_mut();
        // SAFETY: `buf` is valid for `buf.len()` writable bytes.
        let ret = unsafe { libc::read(handle.fd.as_raw_fd(), buf.as_mut_ptr().cast(), buf.len()) };
        if ret < 0 {
            let err = io::Error::last_os_error();
            let outcome = match err.kind() {
                // Spurious wakeup; re-arming is the right response.
                io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => Outcome::Ok,
                _ => {
                    warn!(key = key.index(), error = %err, "inotify read failed");
                    Outcome::HandleInvalid
                }
            };
            return CompletionEvent {
                key,
                bytes_transferred: 0,
                outcome,
            };
        }

        let len = ret as usize;
        let events = ino::parse_events(buf, len);
        CompletionEvent {
            key,
            bytes_transferred: len,
            outcome: classify_batch(&events, handle.root_wd),
        }
    }
}

impl Multiplexer for EpollMultiplexer {
    type Handle = InotifyHandle;
    type Stop = EventFdStop;

    fn stop_signal(&self) -> EventFdStop {
        EventFdStop {
            fd: Arc::clone(&self.stop),
        }
    }

    fn open(&mut self, spec: &WatchSpec, key: WatchKey, filter: NotifyFilter) -> io::Result<InotifyHandle> {
        // SAFETY: plain syscall; the result is checked.
        let fd = owned(cvt(unsafe { libc::inotify_init1(libc::IN_NONBLOCK | libc::IN_CLOEXEC) })?);
        let mask = watch_mask(filter);

        let mut handle = InotifyHandle {
            fd,
            root: spec.path.clone(),
            root_wd: -1,
            subtree: spec.watch_subtree,
            mask,
            dirs: HashMap::new(),
        };

        handle.root_wd = handle.add_watch(&spec.path, mask | libc::IN_ONLYDIR)?;
        handle.dirs.insert(handle.root_wd, String::new());
        if handle.subtree {
            // Pre-existing content is not a change, so nothing is reported.
            handle.sync_tree();
        }

        // Registered disabled; `arm` enables it.
        self.ctl(libc::EPOLL_CTL_ADD, handle.fd.as_raw_fd(), 0, key.index() as u64)?;
        debug!(
            folder = %spec.path.display(),
            directories = handle.dirs.len(),
            "inotify watch opened"
        );
        Ok(handle)
    }

    fn arm(&mut self, watch: &mut Watch<InotifyHandle>) -> io::Result<()> {
        let key = watch.key();
        let handle = watch
            .handle()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "watch is closed"))?;
        self.ctl(
            libc::EPOLL_CTL_MOD,
            handle.fd.as_raw_fd(),
            (libc::EPOLLIN | libc::EPOLLONESHOT) as u32,
            key.index() as u64,
        )
    }

    fn wait_next(
        &mut self,
        watches: &mut WatchTable<InotifyHandle>,
        timeout: Option<Duration>,
    ) -> io::Result<Wakeup> {
        if let Some(event) = self.synthetic.pop_front() {
            return Ok(Wakeup::Completion(event));
        }

        let timeout_ms = match timeout {
            None => -1,
            Some(d) => d.as_millis().min(libc::c_int::MAX as u128) as libc::c_int,
        };
        let mut ready = [libc::epoll_event { events: 0, u64: 0 }];
        // SAFETY: `ready` has room for the one event requested.
        let n = unsafe { libc::epoll_wait(self.epoll.as_raw_fd(), ready.as_mut_ptr(), 1, timeout_ms) };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(Wakeup::TimedOut);
            }
            return Err(err);
        }
        if n == 0 {
            return Ok(Wakeup::TimedOut);
        }

        let token = ready[0].u64;
        if token == STOP_TOKEN {
            return Ok(Wakeup::StopRequested);
        }

        let key = WatchKey(token as usize);
        let Some(watch) = watches.get_mut(key) else {
            warn!(token, "readiness for unknown watch; ignoring");
            return Ok(Wakeup::TimedOut);
        };
        Ok(Wakeup::Completion(Self::read_into(watch)))
    }

    fn decode(&mut self, watch: &mut Watch<InotifyHandle>, len: usize) -> Vec<ChangeRecord> {
        let (handle, buffer) = watch.parts_mut();
        let Some(handle) = handle else {
            return Vec::new();
        };

        let events = ino::parse_events(buffer.as_bytes(), len);
        handle.records(&events)
    }

    fn resync(&mut self, watch: &mut Watch<InotifyHandle>) -> io::Result<()> {
        let handle = watch
            .handle_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "watch is closed"))?;
        if handle.subtree {
            let added = handle.sync_tree();
            debug!(
                folder = %handle.root.display(),
                added,
                directories = handle.dirs.len(),
                "subtree watches resynchronised"
            );
        }
        Ok(())
    }

    fn cancel(&mut self, watch: &mut Watch<InotifyHandle>) -> io::Result<()> {
        let key = watch.key();
        if let Some(handle) = watch.handle() {
            let mut unused = libc::epoll_event { events: 0, u64: 0 };
            // SAFETY: plain syscall; older kernels want a non-null event.
            let ret = unsafe {
                libc::epoll_ctl(
                    self.epoll.as_raw_fd(),
                    libc::EPOLL_CTL_DEL,
                    handle.fd.as_raw_fd(),
                    &mut unused,
                )
            };
            if ret < 0 {
                debug!(key = key.index(), error = %io::Error::last_os_error(), "epoll removal failed");
            }
        }
        // Nothing is ever in flight inside the kernel, so the cancellation
        // completes immediately.
        self.synthetic.push_back(CompletionEvent {
            key,
            bytes_transferred: 0,
            outcome: Outcome::Cancelled,
        });
        Ok(())
    }
}
