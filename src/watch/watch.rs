// src/watch/watch.rs

use std::fmt;

use crate::types::WatchSpec;

/// Default per-watch notification buffer, in bytes.
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

/// Identity of a Watch inside one run of the engine.
///
/// Keys are handed out at `start()` and are only meaningful until `stop()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchKey(pub usize);

impl WatchKey {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Marks the single asynchronous read that is in flight for a Watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpToken(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmState {
    /// No read in flight.
    Stopped,
    /// One read in flight.
    Armed,
}

/// Fixed-capacity byte buffer the OS writes notifications into.
///
/// Backed by `u64` words so the start is 8-byte aligned, which covers the
/// DWORD alignment `ReadDirectoryChangesW` needs and inotify's `i32` header.
/// The allocation never moves while the Watch lives.
pub struct NotifyBuffer {
    words: Box<[u64]>,
    len: usize,
}

impl NotifyBuffer {
    pub fn new(len: usize) -> Self {
        let words = len.div_ceil(8).max(1);
        Self {
            words: vec![0u64; words].into_boxed_slice(),
            len,
        }
    }

    pub fn capacity(&self) -> usize {
        self.len
    }

    pub fn as_bytes(&self) -> &[u8] {
        // SAFETY: `words` holds at least `len` initialised bytes, and any
        // byte pattern is a valid `u8`.
        unsafe { std::slice::from_raw_parts(self.words.as_ptr().cast::<u8>(), self.len) }
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: as above; the exclusive borrow of `self` covers the slice.
        unsafe { std::slice::from_raw_parts_mut(self.words.as_mut_ptr().cast::<u8>(), self.len) }
    }
}

impl fmt::Debug for NotifyBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotifyBuffer").field("len", &self.len).finish()
    }
}

/// One watched root plus its in-flight read state.
///
/// `H` is the backend's owned directory handle. Dropping the handle closes
/// it, so a Watch is Stopped exactly when `handle` is `None`.
pub struct Watch<H> {
    key: WatchKey,
    spec: WatchSpec,
    handle: Option<H>,
    buffer: NotifyBuffer,
    pending: Option<OpToken>,
    next_token: u64,
}

impl<H> Watch<H> {
    pub fn new(key: WatchKey, spec: WatchSpec, handle: H, buffer_size: usize) -> Self {
        Self {
            key,
            spec,
            handle: Some(handle),
            buffer: NotifyBuffer::new(buffer_size),
            pending: None,
            next_token: 0,
        }
    }

    pub fn key(&self) -> WatchKey {
        self.key
    }

    pub fn spec(&self) -> &WatchSpec {
        &self.spec
    }

    pub fn state(&self) -> ArmState {
        if self.pending.is_some() {
            ArmState::Armed
        } else {
            ArmState::Stopped
        }
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    pub fn handle(&self) -> Option<&H> {
        self.handle.as_ref()
    }

    pub fn handle_mut(&mut self) -> Option<&mut H> {
        self.handle.as_mut()
    }

    pub fn buffer(&self) -> &NotifyBuffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut NotifyBuffer {
        &mut self.buffer
    }

    /// Split borrow for backends that need the handle and buffer together.
    pub fn parts_mut(&mut self) -> (Option<&mut H>, &mut NotifyBuffer) {
        (self.handle.as_mut(), &mut self.buffer)
    }

    pub fn pending(&self) -> Option<OpToken> {
        self.pending
    }

    /// Record that a read was issued. Panics in debug builds if one is
    /// already outstanding.
    pub fn begin_op(&mut self) -> OpToken {
        debug_assert!(self.pending.is_none(), "second read issued on {:?}", self.key);
        self.next_token += 1;
        let token = OpToken(self.next_token);
        self.pending = Some(token);
        token
    }

    /// The outstanding read completed (successfully or not).
    pub fn complete_op(&mut self) -> Option<OpToken> {
        self.pending.take()
    }

    /// Close the handle. Only valid once no read is in flight.
    pub fn retire(&mut self) -> Option<H> {
        debug_assert!(self.pending.is_none(), "retiring {:?} with a read in flight", self.key);
        self.handle.take()
    }
}

impl<H> fmt::Debug for Watch<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watch")
            .field("key", &self.key)
            .field("path", &self.spec.path)
            .field("subtree", &self.spec.watch_subtree)
            .field("open", &self.handle.is_some())
            .field("pending", &self.pending)
            .finish()
    }
}

/// The worker's set of Watches, indexed by [`WatchKey`].
pub struct WatchTable<H> {
    watches: Vec<Watch<H>>,
}

impl<H> WatchTable<H> {
    pub fn new() -> Self {
        Self { watches: Vec::new() }
    }

    /// Key the next inserted Watch will get.
    pub fn next_key(&self) -> WatchKey {
        WatchKey(self.watches.len())
    }

    pub fn insert(&mut self, watch: Watch<H>) -> WatchKey {
        let key = watch.key();
        debug_assert_eq!(key, self.next_key());
        self.watches.push(watch);
        key
    }

    pub fn get(&self, key: WatchKey) -> Option<&Watch<H>> {
        self.watches.get(key.index())
    }

    pub fn get_mut(&mut self, key: WatchKey) -> Option<&mut Watch<H>> {
        self.watches.get_mut(key.index())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Watch<H>> {
        self.watches.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Watch<H>> {
        self.watches.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.watches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watches.is_empty()
    }

    pub fn any_pending(&self) -> bool {
        self.watches.iter().any(|w| w.pending().is_some())
    }

    /// Forget Watches whose read the OS may still write into, so their
    /// buffers are never freed under it. Returns how many were leaked.
    ///
    /// Teardown only: remaining keys no longer index the table afterwards.
    pub fn leak_pending(&mut self) -> usize {
        let (pending, idle): (Vec<_>, Vec<_>) = std::mem::take(&mut self.watches)
            .into_iter()
            .partition(|w| w.pending().is_some());
        let leaked = pending.len();
        for watch in pending {
            std::mem::forget(watch);
        }
        self.watches = idle;
        leaked
    }
}

impl<H> Default for WatchTable<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> fmt::Debug for WatchTable<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.watches.iter()).finish()
    }
}
