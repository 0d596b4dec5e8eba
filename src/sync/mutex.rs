//! Recursive, owner-tracked mutex.
//!
//! Built in the same idiom as [`Semaphore`](super::Semaphore): a `Mutex` +
//! `Condvar` pair guarding a tiny piece of state, with explicit
//! `lock`/`try_lock`/`unlock` rather than a scope guard, modelling the
//! `{owner, depth}` record directly instead of Rust's usual `MutexGuard`
//! ergonomics.

use crate::timeout::{Deadline, FOREVER};
use std::sync::{Condvar, Mutex};
use std::thread::{self, ThreadId};

struct State {
    owner: Option<ThreadId>,
    depth: u32,
}

/// A mutex that the owning thread may reacquire without blocking.
///
/// # Example
///
/// ```
/// use osi_core::sync::RecursiveMutex;
///
/// let m = RecursiveMutex::new();
/// m.lock();
/// m.lock(); // same thread, depth now 2
/// m.unlock();
/// m.unlock(); // depth 0, ownership released
/// ```
pub struct RecursiveMutex {
    state: Mutex<State>,
    cond: Condvar,
}

impl Default for RecursiveMutex {
    fn default() -> Self {
        Self::new()
    }
}

impl RecursiveMutex {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                owner: None,
                depth: 0,
            }),
            cond: Condvar::new(),
        }
    }

    /// Block until the mutex is owned by the current thread (acquiring it,
    /// or incrementing the reentrancy depth if already held by it).
    pub fn lock(&self) {
        let me = thread::current().id();
        let mut s = self.state.lock().unwrap_or_else(|p| p.into_inner());
        loop {
            match s.owner {
                Some(owner) if owner == me => {
                    s.depth += 1;
                    return;
                }
                None => {
                    s.owner = Some(me);
                    s.depth = 1;
                    return;
                }
                Some(_) => {
                    s = self.cond.wait(s).unwrap_or_else(|p| p.into_inner());
                }
            }
        }
    }

    /// Try to acquire within `timeout_ms`. Returns `false` on timeout.
    ///
    /// Calls from an ISR-equivalent context must use
    /// [`try_lock_from_isr`](Self::try_lock_from_isr) instead, which is
    /// always a no-op, a recursive mutex cannot be meaningfully acquired
    /// without a thread identity to record as owner.
    pub fn try_lock(&self, timeout_ms: u32) -> bool {
        let me = thread::current().id();
        let deadline = Deadline::from_ms(timeout_ms);
        let mut s = self.state.lock().unwrap_or_else(|p| p.into_inner());
        loop {
            match s.owner {
                Some(owner) if owner == me => {
                    s.depth += 1;
                    return true;
                }
                None => {
                    s.owner = Some(me);
                    s.depth = 1;
                    return true;
                }
                Some(_) => {
                    if timeout_ms != FOREVER && deadline.expired() {
                        return false;
                    }
                    match deadline.remaining() {
                        None => {
                            s = self.cond.wait(s).unwrap_or_else(|p| p.into_inner());
                        }
                        Some(remaining) => {
                            if remaining.is_zero() {
                                return false;
                            }
                            let (guard, result) = self
                                .cond
                                .wait_timeout(s, remaining)
                                .unwrap_or_else(|p| p.into_inner());
                            s = guard;
                            if result.timed_out() && !matches!(s.owner, Some(o) if o == me) {
                                // Re-check ownership above before giving up:
                                // a notify and a timeout can race.
                                if s.owner.is_some() {
                                    return false;
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    /// ISR-equivalent entry point. Always returns `false`: a recursive
    /// mutex is meaningless to acquire from a context with no thread
    /// identity: mutex operations are no-ops from ISR context.
    pub fn try_lock_from_isr(&self) -> bool {
        false
    }

    /// Release one level of ownership. At depth zero, ownership is
    /// released and a waiter (if any) is woken.
    ///
    /// Behaviour is unspecified if called by a thread that does not hold
    /// the lock, behaviour is undefined rather than a required panic
    /// here, only documents it as undefined.
    pub fn unlock(&self) {
        let mut s = self.state.lock().unwrap_or_else(|p| p.into_inner());
        if s.depth > 0 {
            s.depth -= 1;
        }
        if s.depth == 0 {
            s.owner = None;
            self.cond.notify_one();
        }
    }

    /// Is the current thread holding this mutex (at any depth)?
    pub fn is_owned_by_current(&self) -> bool {
        let s = self.state.lock().unwrap_or_else(|p| p.into_inner());
        s.owner == Some(thread::current().id())
    }
}
