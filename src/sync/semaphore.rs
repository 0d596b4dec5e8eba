//! Counting and binary semaphores.
//!
//! Mirrors `psp::sync::Semaphore`'s
//! `create`/`wait`/`wait_timeout`/`try_wait`/`signal` surface, backed by a
//! `Mutex<u32>` + `Condvar` pair instead of `sceKernelCreateSema`.

use super::{SyncError, SyncErrorKind};
use crate::timeout::{Deadline, FOREVER};
use std::sync::{Condvar, Mutex};

/// A counting semaphore with `0 ≤ count ≤ max`.
///
/// # Example
///
/// ```
/// use osi_core::sync::Semaphore;
///
/// let sem = Semaphore::new("worker-done", 0, 1).unwrap();
/// sem.release();
/// sem.acquire();
/// ```
pub struct Semaphore {
    name: &'static str,
    max: u32,
    count: Mutex<u32>,
    cond: Condvar,
}

impl Semaphore {
    /// Create a counting semaphore. Fails if `init > max` or `max == 0`.
    pub fn new(name: &'static str, init: u32, max: u32) -> Result<Self, SyncError> {
        if max == 0 || init > max {
            return Err(SyncError::invalid_argument());
        }
        log::debug!("semaphore '{name}' created (init={init}, max={max})");
        Ok(Self {
            name,
            max,
            count: Mutex::new(init),
            cond: Condvar::new(),
        })
    }

    /// Create the `max = 1` specialisation.
    pub fn binary(name: &'static str, init: bool) -> Result<Self, SyncError> {
        Self::new(name, init as u32, 1)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Block until the count is nonzero, then decrement it.
    pub fn acquire(&self) {
        let mut count = self.count.lock().unwrap_or_else(|p| p.into_inner());
        while *count == 0 {
            count = self.cond.wait(count).unwrap_or_else(|p| p.into_inner());
        }
        *count -= 1;
    }

    /// Try to acquire within `timeout_ms` (see [`crate::timeout`] for the
    /// `0`/[`FOREVER`] convention). Returns `false` on timeout.
    pub fn try_acquire(&self, timeout_ms: u32) -> bool {
        if timeout_ms == FOREVER {
            self.acquire();
            return true;
        }

        let deadline = Deadline::from_ms(timeout_ms);
        let mut count = self.count.lock().unwrap_or_else(|p| p.into_inner());
        loop {
            if *count > 0 {
                *count -= 1;
                return true;
            }
            let Some(remaining) = deadline.remaining() else {
                unreachable!("finite deadline always has a remaining duration")
            };
            if remaining.is_zero() {
                return false;
            }
            let (guard, result) = self
                .cond
                .wait_timeout(count, remaining)
                .unwrap_or_else(|p| p.into_inner());
            count = guard;
            if *count == 0 && result.timed_out() {
                return false;
            }
        }
    }

    /// Increment the count by one, saturating at `max`. Safe to call from
    /// an ISR-equivalent context, it never blocks.
    pub fn release(&self) {
        self.release_n(1);
    }

    /// Increment the count by `n`, saturating at `max`.
    pub fn release_n(&self, n: u32) {
        let mut count = self.count.lock().unwrap_or_else(|p| p.into_inner());
        *count = (*count + n).min(self.max);
        self.cond.notify_all();
    }

    /// ISR-safe alias for [`release`](Self::release). Kept as a distinct
    /// entry point (rather than an `is_irq()` runtime check) per the
    /// dual-API design note, on this hosted backend the two are
    /// identical, but the split documents which call sites are ISR-safe.
    pub fn release_from_isr(&self) {
        self.release();
    }

    /// Current count, for diagnostics and tests.
    pub fn count(&self) -> u32 {
        *self.count.lock().unwrap_or_else(|p| p.into_inner())
    }
}
