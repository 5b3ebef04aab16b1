// src/mux/windows.rs

//! I/O completion port backend.
//!
//! Every Watch's directory handle is associated with one completion port
//! under its key, and each armed Watch has exactly one overlapped
//! `ReadDirectoryChangesW` in flight, writing straight into its buffer.
//!
//! Outcome mapping:
//! - success with bytes: [`Outcome::Ok`]
//! - success with zero bytes, or `ERROR_NOTIFY_ENUM_DIR`: the OS dropped
//!   notifications, [`Outcome::BufferOverflow`]
//! - `ERROR_OPERATION_ABORTED`: [`Outcome::Cancelled`]
//! - anything else: [`Outcome::HandleInvalid`]

use std::io;
use std::os::windows::ffi::OsStrExt;
use std::ptr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};
use windows_sys::Win32::Foundation::{
    CloseHandle, ERROR_NOT_FOUND, ERROR_NOTIFY_ENUM_DIR, ERROR_OPERATION_ABORTED, GetLastError,
    HANDLE, INVALID_HANDLE_VALUE, WAIT_TIMEOUT,
};
use windows_sys::Win32::Storage::FileSystem::{
    CreateFileW, FILE_FLAG_BACKUP_SEMANTICS, FILE_FLAG_OVERLAPPED, FILE_LIST_DIRECTORY,
    FILE_NOTIFY_CHANGE_DIR_NAME, FILE_NOTIFY_CHANGE_FILE_NAME, FILE_NOTIFY_CHANGE_LAST_WRITE,
    FILE_NOTIFY_CHANGE_SIZE, FILE_SHARE_DELETE, FILE_SHARE_READ, FILE_SHARE_WRITE, OPEN_EXISTING,
    ReadDirectoryChangesW,
};
use windows_sys::Win32::System::IO::{
    CancelIoEx, CreateIoCompletionPort, GetQueuedCompletionStatus, OVERLAPPED,
    PostQueuedCompletionStatus,
};

use super::{CompletionEvent, Multiplexer, NotifyFilter, Outcome, StopSignal, Wakeup};
use crate::decode::notify_info;
use crate::types::{ChangeRecord, WatchSpec};
use crate::watch::{Watch, WatchKey, WatchTable};

/// Completion key of the stop packet.
const STOP_KEY: usize = usize::MAX;
const INFINITE: u32 = u32::MAX;

fn notify_filter(filter: NotifyFilter) -> u32 {
    let mut mask = FILE_NOTIFY_CHANGE_FILE_NAME | FILE_NOTIFY_CHANGE_DIR_NAME;
    if filter.modifications {
        mask |= FILE_NOTIFY_CHANGE_LAST_WRITE | FILE_NOTIFY_CHANGE_SIZE;
    }
    mask
}

#[derive(Debug)]
struct OwnedHandle(HANDLE);

impl Drop for OwnedHandle {
    fn drop(&mut self) {
        // SAFETY: the handle is owned and closed exactly once.
        unsafe { CloseHandle(self.0) };
    }
}

/// Directory handle for one Watch, plus the OVERLAPPED its read uses.
///
/// The OVERLAPPED is boxed so its address stays fixed while a read is in
/// flight.
pub struct DirHandle {
    dir: OwnedHandle,
    overlapped: Box<OVERLAPPED>,
    subtree: bool,
    notify_filter: u32,
}

// SAFETY: the raw pointers inside OVERLAPPED are only touched by the kernel
// and by the single thread that currently owns the Watch.
unsafe impl Send for DirHandle {}

impl std::fmt::Debug for DirHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirHandle")
            .field("dir", &self.dir)
            .field("subtree", &self.subtree)
            .finish_non_exhaustive()
    }
}

/// Posts the stop packet to the port.
#[derive(Debug, Clone)]
pub struct PortStop {
    port: Arc<OwnedHandle>,
}

// SAFETY: a completion port handle may be used from any thread.
unsafe impl Send for PortStop {}
unsafe impl Sync for PortStop {}

impl StopSignal for PortStop {
    fn raise(&self) -> io::Result<()> {
        // SAFETY: posting a packet with no OVERLAPPED is always valid.
        let ok = unsafe { PostQueuedCompletionStatus(self.port.0, 0, STOP_KEY, ptr::null()) };
        if ok == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

/// Windows [`Multiplexer`].
#[derive(Debug)]
pub struct IocpMultiplexer {
    port: Arc<OwnedHandle>,
}

// SAFETY: see `PortStop`.
unsafe impl Send for IocpMultiplexer {}

impl IocpMultiplexer {
    pub fn new() -> io::Result<Self> {
        // SAFETY: creating a fresh port; the result is checked.
        let port = unsafe { CreateIoCompletionPort(INVALID_HANDLE_VALUE, 0, 0, 1) };
        if port == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self {
            port: Arc::new(OwnedHandle(port)),
        })
    }
}

fn wide(path: &std::path::Path) -> Vec<u16> {
    path.as_os_str().encode_wide().chain(std::iter::once(0)).collect()
}

impl Multiplexer for IocpMultiplexer {
    type Handle = DirHandle;
    type Stop = PortStop;

    fn stop_signal(&self) -> PortStop {
        PortStop {
            port: Arc::clone(&self.port),
        }
    }

    fn open(&mut self, spec: &WatchSpec, key: WatchKey, filter: NotifyFilter) -> io::Result<DirHandle> {
        let name = wide(&spec.path);
        // SAFETY: `name` is NUL terminated and outlives the call.
        let raw = unsafe {
            CreateFileW(
                name.as_ptr(),
                FILE_LIST_DIRECTORY,
                FILE_SHARE_READ | FILE_SHARE_WRITE | FILE_SHARE_DELETE,
                ptr::null(),
                OPEN_EXISTING,
                FILE_FLAG_BACKUP_SEMANTICS | FILE_FLAG_OVERLAPPED,
                0,
            )
        };
        if raw == INVALID_HANDLE_VALUE {
            return Err(io::Error::last_os_error());
        }
        let dir = OwnedHandle(raw);

        // SAFETY: both handles are valid; associating returns the port.
        let assoc = unsafe { CreateIoCompletionPort(dir.0, self.port.0, key.index(), 0) };
        if assoc == 0 {
            return Err(io::Error::last_os_error());
        }

        debug!(folder = %spec.path.display(), "directory handle opened");
        Ok(DirHandle {
            dir,
            // SAFETY: OVERLAPPED is plain data; all-zero is its initial state.
            overlapped: Box::new(unsafe { std::mem::zeroed() }),
            subtree: spec.watch_subtree,
            notify_filter: notify_filter(filter),
        })
    }

    fn arm(&mut self, watch: &mut Watch<DirHandle>) -> io::Result<()> {
        let (handle, buffer) = watch.parts_mut();
        let handle =
            handle.ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "watch is closed"))?;

        // SAFETY: OVERLAPPED must be reset before reuse.
        *handle.overlapped = unsafe { std::mem::zeroed() };
        let buf = buffer.as_bytes_mut();
        // SAFETY: the buffer and OVERLAPPED are owned by the Watch and stay
        // put until the completion for this read has been dequeued.
        let ok = unsafe {
            ReadDirectoryChangesW(
                handle.dir.0,
                buf.as_mut_ptr().cast(),
                buf.len() as u32,
                handle.subtree as i32,
                handle.notify_filter,
                ptr::null_mut(),
                &mut *handle.overlapped,
                None,
            )
        };
        if ok == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn wait_next(
        &mut self,
        _watches: &mut WatchTable<DirHandle>,
        timeout: Option<Duration>,
    ) -> io::Result<Wakeup> {
        let timeout_ms = match timeout {
            None => INFINITE,
            Some(d) => d.as_millis().min((INFINITE - 1) as u128) as u32,
        };

        let mut bytes: u32 = 0;
        let mut key: usize = 0;
        let mut overlapped: *mut OVERLAPPED = ptr::null_mut();
        // SAFETY: all out-pointers are valid locals.
        let ok = unsafe {
            GetQueuedCompletionStatus(self.port.0, &mut bytes, &mut key, &mut overlapped, timeout_ms)
        };

        if overlapped.is_null() {
            if ok != 0 {
                if key == STOP_KEY {
                    return Ok(Wakeup::StopRequested);
                }
                warn!(key, "unexpected posted packet; ignoring");
                return Ok(Wakeup::TimedOut);
            }
            // SAFETY: plain call.
            let code = unsafe { GetLastError() };
            if code == WAIT_TIMEOUT {
                return Ok(Wakeup::TimedOut);
            }
            return Err(io::Error::from_raw_os_error(code as i32));
        }

        let outcome = if ok != 0 {
            if bytes == 0 {
                Outcome::BufferOverflow
            } else {
                Outcome::Ok
            }
        } else {
            // SAFETY: plain call.
            match unsafe { GetLastError() } {
                ERROR_OPERATION_ABORTED => Outcome::Cancelled,
                ERROR_NOTIFY_ENUM_DIR => Outcome::BufferOverflow,
                code => {
                    warn!(key, code, "directory read failed");
                    Outcome::HandleInvalid
                }
            }
        };

        Ok(Wakeup::Completion(CompletionEvent {
            key: WatchKey(key),
            bytes_transferred: bytes as usize,
            outcome,
        }))
    }

    fn decode(&mut self, watch: &mut Watch<DirHandle>, len: usize) -> Vec<ChangeRecord> {
        notify_info::decode(watch.buffer().as_bytes(), len)
    }

    fn cancel(&mut self, watch: &mut Watch<DirHandle>) -> io::Result<()> {
        let Some(handle) = watch.handle_mut() else {
            return Ok(());
        };
        // SAFETY: cancels only the read issued with this OVERLAPPED.
        let ok = unsafe { CancelIoEx(handle.dir.0, &*handle.overlapped) };
        if ok == 0 {
            // SAFETY: plain call.
            let code = unsafe { GetLastError() };
            // Already completed; its packet is queued and will be drained.
            if code != ERROR_NOT_FOUND {
                return Err(io::Error::from_raw_os_error(code as i32));
            }
        }
        Ok(())
    }
}
