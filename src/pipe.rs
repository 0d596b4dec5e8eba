//! Bounded byte stream with EOF and read/write completion callbacks.
//!
//! Built on the same [`critical_section`](crate::critical_section) +
//! [`Semaphore`](crate::sync::Semaphore) pairing as the rest of this crate's
//! synchronous primitives, backing a byte ring with the same
//! monotonic-counter discipline [`crate::fifo::Fifo`] uses, wrapped with the
//! blocking/EOF state machine a cross-thread stream needs.

use crate::critical_section;
use crate::timeout::{Deadline, FOREVER};
use std::sync::Mutex;

use crate::sync::Semaphore;

bitflags::bitflags! {
    /// Which callback a pipe side is armed for.
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct CallbackMask: u32 {
        /// Fired on the reader side once a writer has fully drained into it.
        const RX_ARRIVED = 1 << 0;
        /// Fired on the writer side once a reader has drained everything
        /// that was pending at the start of the read.
        const TX_COMPLETE = 1 << 1;
    }
}

type PipeCallback = Box<dyn Fn(CallbackMask) + Send + Sync>;

struct Inner {
    buf: Box<[u8]>,
    rd: u64,
    wr: u64,
    running: bool,
    eof: bool,
    data_done: bool,
}

struct Callbacks {
    rd_cb: Option<(PipeCallback, CallbackMask)>,
    wr_cb: Option<(PipeCallback, CallbackMask)>,
}

/// A bounded, thread-safe byte stream between one writer and one reader.
///
/// # Example
///
/// ```
/// use osi_core::pipe::Pipe;
///
/// let p = Pipe::new(8);
/// assert_eq!(p.write(b"hi"), 2);
/// let mut out = [0u8; 2];
/// assert_eq!(p.read(&mut out), 2);
/// assert_eq!(&out, b"hi");
/// ```
pub struct Pipe {
    inner: Mutex<Inner>,
    callbacks: Mutex<Callbacks>,
    rd_sema: Semaphore,
    wr_sema: Semaphore,
}

impl Pipe {
    pub fn new(size: usize) -> Self {
        assert!(size > 0, "pipe size must be nonzero");
        Self {
            inner: Mutex::new(Inner {
                buf: vec![0u8; size].into_boxed_slice(),
                rd: 0,
                wr: 0,
                running: true,
                eof: false,
                data_done: false,
            }),
            callbacks: Mutex::new(Callbacks {
                rd_cb: None,
                wr_cb: None,
            }),
            rd_sema: Semaphore::new("pipe-rd", 0, 1).expect("max=1 is always valid"),
            wr_sema: Semaphore::new("pipe-wr", 0, 1).expect("max=1 is always valid"),
        }
    }

    /// Register (or clear, with `mask.is_empty()`) the reader-side
    /// callback, fired with [`CallbackMask::RX_ARRIVED`] after a
    /// successful [`write`](Self::write).
    pub fn set_read_callback<F>(&self, cb: F, mask: CallbackMask)
    where
        F: Fn(CallbackMask) + Send + Sync + 'static,
    {
        let mut c = self.callbacks.lock().unwrap_or_else(|p| p.into_inner());
        c.rd_cb = if mask.is_empty() {
            None
        } else {
            Some((Box::new(cb), mask))
        };
    }

    /// Register (or clear) the writer-side callback, fired with
    /// [`CallbackMask::TX_COMPLETE`] when a [`read`](Self::read) drains
    /// everything that was queued at the moment it started.
    pub fn set_write_callback<F>(&self, cb: F, mask: CallbackMask)
    where
        F: Fn(CallbackMask) + Send + Sync + 'static,
    {
        let mut c = self.callbacks.lock().unwrap_or_else(|p| p.into_inner());
        c.wr_cb = if mask.is_empty() {
            None
        } else {
            Some((Box::new(cb), mask))
        };
    }

    fn capacity(&self, inner: &Inner) -> usize {
        inner.buf.len()
    }

    fn index(&self, inner: &Inner, counter: u64) -> usize {
        (counter % inner.buf.len() as u64) as usize
    }

    /// Read up to `buf.len()` bytes. Returns `-1` if the pipe is stopped,
    /// or has hit EOF with nothing left to drain. Returns `0` if nothing
    /// is queued yet (non-blocking, see [`read_all`](Self::read_all) for
    /// the blocking loop).
    pub fn read(&self, buf: &mut [u8]) -> isize {
        let bytes_at_entry;
        let len;
        let became_eof;
        {
            let _cs = critical_section::enter();
            let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
            if !inner.running {
                return -1;
            }
            bytes_at_entry = (inner.wr - inner.rd) as usize;
            if inner.data_done && bytes_at_entry == 0 {
                inner.eof = true;
                return -1;
            }
            if inner.eof && bytes_at_entry == 0 {
                return -1;
            }
            len = buf.len().min(bytes_at_entry);
            if len == 0 {
                return 0;
            }
            let cap = self.capacity(&inner);
            let start = self.index(&inner, inner.rd);
            let first = len.min(cap - start);
            buf[..first].copy_from_slice(&inner.buf[start..start + first]);
            if first < len {
                buf[first..len].copy_from_slice(&inner.buf[..len - first]);
            }
            inner.rd += len as u64;
            became_eof = inner.data_done && inner.rd == inner.wr;
            if became_eof {
                inner.eof = true;
            }
        }
        self.wr_sema.release();

        if len == bytes_at_entry {
            let c = self.callbacks.lock().unwrap_or_else(|p| p.into_inner());
            if let Some((cb, mask)) = &c.wr_cb {
                if mask.contains(CallbackMask::TX_COMPLETE) {
                    cb(CallbackMask::TX_COMPLETE);
                }
            }
        }
        len as isize
    }

    /// Write up to `buf.len()` bytes. Returns `-1` if stopped or at EOF.
    /// Returns the number of bytes actually written, limited by free
    /// space (non-blocking, see [`write_all`](Self::write_all)).
    pub fn write(&self, buf: &[u8]) -> isize {
        let len;
        {
            let _cs = critical_section::enter();
            let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
            if !inner.running || inner.eof {
                return -1;
            }
            let cap = self.capacity(&inner);
            let free = cap - (inner.wr - inner.rd) as usize;
            len = buf.len().min(free);
            if len == 0 {
                return 0;
            }
            let start = self.index(&inner, inner.wr);
            let first = len.min(cap - start);
            inner.buf[start..start + first].copy_from_slice(&buf[..first]);
            if first < len {
                inner.buf[..len - first].copy_from_slice(&buf[first..len]);
            }
            inner.wr += len as u64;
        }
        self.rd_sema.release();

        let c = self.callbacks.lock().unwrap_or_else(|p| p.into_inner());
        if let Some((cb, mask)) = &c.rd_cb {
            if mask.contains(CallbackMask::RX_ARRIVED) {
                cb(CallbackMask::RX_ARRIVED);
            }
        }
        len as isize
    }

    /// Wait until at least one byte is queued (or the pipe stops/EOFs).
    pub fn wait_read_avail(&self, timeout_ms: u32) {
        let deadline = Deadline::from_ms(timeout_ms);
        loop {
            {
                let inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
                if !inner.running || inner.eof || inner.rd != inner.wr {
                    return;
                }
            }
            if timeout_ms != FOREVER {
                match deadline.remaining() {
                    Some(r) if r.is_zero() => return,
                    _ => {}
                }
            }
            let wait_ms = if timeout_ms == FOREVER {
                FOREVER
            } else {
                deadline
                    .remaining()
                    .map(|d| d.as_millis() as u32)
                    .unwrap_or(0)
            };
            self.rd_sema.try_acquire(wait_ms);
        }
    }

    /// Wait until there is room to write (or the pipe stops/EOFs).
    pub fn wait_write_avail(&self, timeout_ms: u32) {
        let deadline = Deadline::from_ms(timeout_ms);
        loop {
            {
                let inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
                let cap = self.capacity(&inner);
                if !inner.running || inner.eof || ((inner.wr - inner.rd) as usize) < cap {
                    return;
                }
            }
            if timeout_ms != FOREVER {
                match deadline.remaining() {
                    Some(r) if r.is_zero() => return,
                    _ => {}
                }
            }
            let wait_ms = if timeout_ms == FOREVER {
                FOREVER
            } else {
                deadline
                    .remaining()
                    .map(|d| d.as_millis() as u32)
                    .unwrap_or(0)
            };
            self.wr_sema.try_acquire(wait_ms);
        }
    }

    /// Loop single-shot [`read`](Self::read)s with a decaying timeout
    /// until `buf` is full, EOF, or error. Returns the number of bytes
    /// actually read (may be less than `buf.len()` on EOF/timeout).
    pub fn read_all(&self, buf: &mut [u8], timeout_ms: u32) -> usize {
        let deadline = Deadline::from_ms(timeout_ms);
        let mut done = 0;
        while done < buf.len() {
            let n = self.read(&mut buf[done..]);
            if n < 0 {
                break;
            }
            if n == 0 {
                if timeout_ms != FOREVER && deadline.expired() {
                    break;
                }
                let remaining = deadline.remaining().map(|d| d.as_millis() as u32);
                self.wait_read_avail(if timeout_ms == FOREVER {
                    FOREVER
                } else {
                    remaining.unwrap_or(0)
                });
                if timeout_ms != FOREVER && deadline.expired() {
                    break;
                }
                continue;
            }
            done += n as usize;
        }
        done
    }

    /// Loop single-shot [`write`](Self::write)s with a decaying timeout
    /// until all of `buf` is written, or error/timeout.
    pub fn write_all(&self, buf: &[u8], timeout_ms: u32) -> usize {
        let deadline = Deadline::from_ms(timeout_ms);
        let mut done = 0;
        while done < buf.len() {
            let n = self.write(&buf[done..]);
            if n < 0 {
                break;
            }
            if n == 0 {
                if timeout_ms != FOREVER && deadline.expired() {
                    break;
                }
                let remaining = deadline.remaining().map(|d| d.as_millis() as u32);
                self.wait_write_avail(if timeout_ms == FOREVER {
                    FOREVER
                } else {
                    remaining.unwrap_or(0)
                });
                if timeout_ms != FOREVER && deadline.expired() {
                    break;
                }
                continue;
            }
            done += n as usize;
        }
        done
    }

    /// Stop the pipe: further `read`/`write` fail with `-1`. Unblocks any
    /// waiters.
    pub fn stop(&self) {
        {
            let _cs = critical_section::enter();
            let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
            inner.running = false;
        }
        self.rd_sema.release();
        self.wr_sema.release();
    }

    /// Mark the producer done: once the reader drains what's queued, the
    /// pipe transitions to EOF on its own (see [`read`](Self::read)).
    /// Unblocks any waiters immediately so they can observe the new state.
    pub fn set_eof(&self) {
        {
            let _cs = critical_section::enter();
            let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
            inner.data_done = true;
            if inner.rd == inner.wr {
                inner.eof = true;
            }
        }
        self.rd_sema.release();
        self.wr_sema.release();
    }

    /// Reset the pipe to a fresh, running, non-EOF state with an empty
    /// buffer.
    pub fn reset(&self) {
        let _cs = critical_section::enter();
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        inner.rd = 0;
        inner.wr = 0;
        inner.eof = false;
        inner.data_done = false;
        inner.running = true;
    }

    pub fn is_eof(&self) -> bool {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).eof
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).running
    }
}
