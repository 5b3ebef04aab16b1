// src/mux/mod.rs

//! Completion multiplexing.
//!
//! One [`Multiplexer`] per run owns the OS completion object every Watch is
//! associated with. The worker thread asks it for the next completion and
//! gets back which Watch finished, how many bytes landed in that Watch's
//! buffer, and how the read ended.
//!
//! - [`linux`] uses one inotify instance per Watch, all registered with a
//!   single epoll instance in one-shot mode, and an eventfd as the stop
//!   signal.
//! - [`windows`] uses `ReadDirectoryChangesW` overlapped reads on one I/O
//!   completion port, and a posted packet as the stop signal.
//!
//! Tests provide a scripted implementation instead (see the
//! `foldermon-test-utils` crate).

use std::io;
use std::time::Duration;

use crate::types::{ChangeRecord, WatchSpec};
use crate::watch::{Watch, WatchKey, WatchTable};

#[cfg(target_os = "linux")]
pub mod linux;
#[cfg(windows)]
pub mod windows;

#[cfg(target_os = "linux")]
pub use linux::EpollMultiplexer as PlatformMultiplexer;
#[cfg(windows)]
pub use windows::IocpMultiplexer as PlatformMultiplexer;

/// How one asynchronous read ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Records are in the buffer (possibly none).
    Ok,
    /// The OS dropped notifications; the buffer content is meaningless.
    BufferOverflow,
    /// The read was cancelled by [`Multiplexer::cancel`].
    Cancelled,
    /// The directory handle is no longer usable.
    HandleInvalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionEvent {
    pub key: WatchKey,
    pub bytes_transferred: usize,
    pub outcome: Outcome,
}

/// What woke the worker up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wakeup {
    Completion(CompletionEvent),
    StopRequested,
    TimedOut,
}

/// Which kinds of change the OS should report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NotifyFilter {
    /// Also report content writes, not just names appearing and going.
    pub modifications: bool,
}

/// Wakes a blocked [`Multiplexer::wait_next`] from another thread.
pub trait StopSignal: Send + Sync + 'static {
    fn raise(&self) -> io::Result<()>;
}

/// Trait abstracting the OS completion machinery.
///
/// Production code uses [`PlatformMultiplexer`]. The worker owns the
/// per-Watch bookkeeping (`begin_op` / `complete_op`); implementations only
/// talk to the OS.
pub trait Multiplexer: Send + 'static {
    /// Owned directory handle; dropping it closes the handle.
    type Handle: Send + 'static;
    type Stop: StopSignal;

    /// Signal that makes `wait_next` return [`Wakeup::StopRequested`].
    fn stop_signal(&self) -> Self::Stop;

    /// Open `spec.path` for change notification and associate it with this
    /// multiplexer under `key`. No read is issued yet.
    fn open(&mut self, spec: &WatchSpec, key: WatchKey, filter: NotifyFilter)
    -> io::Result<Self::Handle>;

    /// Issue the single asynchronous read for `watch`, targeting its buffer.
    ///
    /// The caller guarantees no read is currently in flight for it.
    fn arm(&mut self, watch: &mut Watch<Self::Handle>) -> io::Result<()>;

    /// Block until a read completes, the stop signal is raised, or `timeout`
    /// elapses. `None` waits indefinitely.
    ///
    /// An `Err` means the completion object itself failed; per-Watch
    /// failures come back as [`Outcome::HandleInvalid`].
    fn wait_next(
        &mut self,
        watches: &mut WatchTable<Self::Handle>,
        timeout: Option<Duration>,
    ) -> io::Result<Wakeup>;

    /// Turn the first `len` bytes of `watch`'s buffer into records.
    fn decode(&mut self, watch: &mut Watch<Self::Handle>, len: usize) -> Vec<ChangeRecord>;

    /// Bring `watch`'s own view of its folder back in line with the disk
    /// after events were lost. Called on overflow, before re-arming.
    ///
    /// Backends that cover a subtree natively have nothing to do.
    fn resync(&mut self, _watch: &mut Watch<Self::Handle>) -> io::Result<()> {
        Ok(())
    }

    /// Ask the OS to abort `watch`'s in-flight read. Its completion (usually
    /// [`Outcome::Cancelled`]) is still delivered through `wait_next`.
    fn cancel(&mut self, watch: &mut Watch<Self::Handle>) -> io::Result<()>;
}
