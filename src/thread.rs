//! Threads with an optional per-thread event mailbox.
//!
//! Generalizes `psp::thread::{ThreadBuilder, JoinHandle, spawn}`:
//! the same trampoline shape (box the closure, run it behind
//! `catch_unwind` so a panicking thread body turns into an error code
//! instead of tearing down the process) backed by `std::thread::Builder`
//! instead of `sceKernelCreateThread`, plus a [`Mailbox`] bolted on for
//! threads that opt into one.

use crate::event::{self, EventError, Mailbox};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};

/// Error creating or joining a thread.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ThreadErrorKind {
    InvalidArgument,
    SpawnFailed,
    AlreadyJoined,
    Panicked,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ThreadError(ThreadErrorKind);

impl ThreadError {
    fn invalid_argument() -> Self {
        Self(ThreadErrorKind::InvalidArgument)
    }
    fn spawn_failed() -> Self {
        Self(ThreadErrorKind::SpawnFailed)
    }
    fn already_joined() -> Self {
        Self(ThreadErrorKind::AlreadyJoined)
    }
    fn panicked() -> Self {
        Self(ThreadErrorKind::Panicked)
    }

    pub fn kind(self) -> ThreadErrorKind {
        self.0
    }
}

impl std::fmt::Display for ThreadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            ThreadErrorKind::InvalidArgument => write!(f, "invalid thread argument"),
            ThreadErrorKind::SpawnFailed => write!(f, "failed to spawn thread"),
            ThreadErrorKind::AlreadyJoined => write!(f, "thread already joined"),
            ThreadErrorKind::Panicked => write!(f, "thread panicked"),
        }
    }
}

impl std::error::Error for ThreadError {}

struct Inner {
    name: &'static str,
    mailbox: Option<Mailbox>,
    os_id: ThreadId,
    priority: i32,
    join: Mutex<Option<thread::JoinHandle<i32>>>,
}

/// The argument passed to a spawned thread's body, giving it access to its
/// own mailbox without reaching back through a global registry.
pub struct ThreadContext {
    inner: Arc<Inner>,
}

impl ThreadContext {
    /// Block for the next event and dispatch it (see [`crate::event::dispatch`]).
    /// Returns `false` if the dispatched event was a `Quit`, conventionally
    /// the signal for the thread body to return.
    ///
    /// # Panics
    ///
    /// Panics if this thread was built without [`ThreadBuilder::mailbox_capacity`].
    pub fn wait(&self) -> bool {
        let mailbox = self
            .inner
            .mailbox
            .as_ref()
            .expect("thread has no event mailbox");
        event::dispatch(mailbox.wait_raw())
    }

    /// As [`wait`](Self::wait), but gives up after `timeout_ms` and returns
    /// `None` instead of dispatching anything.
    pub fn try_wait(&self, timeout_ms: u32) -> Option<bool> {
        let mailbox = self
            .inner
            .mailbox
            .as_ref()
            .expect("thread has no event mailbox");
        mailbox.try_wait_raw(timeout_ms).map(event::dispatch)
    }

    /// Direct mailbox access, for callers that want to inspect an event
    /// before dispatching it (or not dispatch it at all).
    pub fn mailbox(&self) -> Option<&Mailbox> {
        self.inner.mailbox.as_ref()
    }

    pub fn name(&self) -> &'static str {
        self.inner.name
    }
}

/// A cloneable, shareable reference to a spawned thread: its mailbox (if
/// any) and its join slot.
pub struct ThreadHandle(Arc<Inner>);

impl Clone for ThreadHandle {
    fn clone(&self) -> Self {
        ThreadHandle(Arc::clone(&self.0))
    }
}

impl ThreadHandle {
    pub fn name(&self) -> &'static str {
        self.0.name
    }

    pub fn os_id(&self) -> ThreadId {
        self.0.os_id
    }

    /// The priority the thread was created with (lower is higher priority,
    /// matching the convention [`ThreadBuilder::priority`] documents). The
    /// host scheduler has no concept of thread priority, so this is purely
    /// bookkeeping for callers that want to inspect it.
    pub fn priority(&self) -> i32 {
        self.0.priority
    }

    /// Send an event to this thread's mailbox with the default timeout.
    /// Fails with [`EventError::NoMailbox`] if it was built without one.
    pub fn send_event(&self, event: event::Event) -> Result<(), EventError> {
        self.0.mailbox.as_ref().ok_or(EventError::NoMailbox)?.send(event)
    }

    /// As [`send_event`](Self::send_event), non-blocking, for
    /// ISR-equivalent callers.
    pub fn send_event_from_isr(&self, event: event::Event) -> Result<(), EventError> {
        self.0
            .mailbox
            .as_ref()
            .ok_or(EventError::NoMailbox)?
            .try_send_from_isr(event)
    }

    /// Block until the thread's body returns, yielding its exit code.
    ///
    /// Only the first call across all clones of this handle actually
    /// joins (the underlying `std::thread::JoinHandle` is consumed once);
    /// later calls, from this or any other clone, return
    /// [`ThreadErrorKind::AlreadyJoined`].
    pub fn join(&self) -> Result<i32, ThreadError> {
        let mut slot = self.0.join.lock().unwrap_or_else(|p| p.into_inner());
        match slot.take() {
            Some(jh) => jh.join().map_err(|_| ThreadError::panicked()),
            None => Err(ThreadError::already_joined()),
        }
    }
}

/// Builds a thread, optionally with an event mailbox.
///
/// # Example
///
/// ```
/// use osi_core::thread::ThreadBuilder;
///
/// let handle = ThreadBuilder::new("worker")
///     .mailbox_capacity(8)
///     .spawn(|ctx| {
///         ctx.wait();
///         0
///     })
///     .unwrap();
/// handle.join().unwrap();
/// ```
pub struct ThreadBuilder {
    name: &'static str,
    mailbox_capacity: Option<usize>,
    priority: i32,
    stack_bytes: usize,
}

impl ThreadBuilder {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            mailbox_capacity: None,
            priority: 32,
            stack_bytes: 64 * 1024,
        }
    }

    /// Give the thread an event mailbox of the given capacity. Threads
    /// built without this have no mailbox, [`ThreadContext::wait`] and
    /// [`ThreadHandle::send_event`] then fail/panic accordingly.
    pub fn mailbox_capacity(mut self, capacity: usize) -> Self {
        self.mailbox_capacity = Some(capacity);
        self
    }

    /// Set the thread's priority (lower is higher priority). The host
    /// scheduler (`std::thread`) has no priority concept to map this onto;
    /// it is recorded on the resulting [`ThreadHandle`] so callers porting
    /// priority-sensitive code have somewhere to put the value.
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Set the OS thread's stack size in bytes, passed straight through to
    /// [`std::thread::Builder::stack_size`].
    pub fn stack_bytes(mut self, stack_bytes: usize) -> Self {
        self.stack_bytes = stack_bytes;
        self
    }

    /// Spawn the thread, running `body(ctx)` on it. A panic inside `body`
    /// is caught at the trampoline and logged rather than unwinding into
    /// the host process; the thread then "returns" -1.
    pub fn spawn<F>(self, body: F) -> Result<ThreadHandle, ThreadError>
    where
        F: FnOnce(&ThreadContext) -> i32 + Send + 'static,
    {
        if matches!(self.mailbox_capacity, Some(0)) {
            return Err(ThreadError::invalid_argument());
        }

        let os_builder = thread::Builder::new()
            .name(self.name.to_string())
            .stack_size(self.stack_bytes);
        let name = self.name;

        let (tx, rx) = std::sync::mpsc::channel();
        let join_handle = os_builder
            .spawn(move || {
                let inner = rx.recv().expect("inner handed off before thread body runs");
                let ctx = ThreadContext { inner };
                match panic::catch_unwind(AssertUnwindSafe(|| body(&ctx))) {
                    Ok(code) => code,
                    Err(_) => {
                        log::error!("thread '{name}' panicked");
                        -1
                    }
                }
            })
            .map_err(|_| ThreadError::spawn_failed())?;

        let os_id = join_handle.thread().id();
        let mailbox = match self.mailbox_capacity {
            Some(cap) => Some(Mailbox::new(cap, os_id).map_err(|_| ThreadError::invalid_argument())?),
            None => None,
        };

        let inner = Arc::new(Inner {
            name: self.name,
            mailbox,
            os_id,
            priority: self.priority,
            join: Mutex::new(None),
        });
        tx.send(Arc::clone(&inner))
            .expect("receiver held by the thread we just spawned");
        *inner.join.lock().unwrap_or_else(|p| p.into_inner()) = Some(join_handle);

        log::debug!(
            "thread '{}' spawned (priority={}, stack_bytes={})",
            inner.name,
            inner.priority,
            self.stack_bytes
        );
        Ok(ThreadHandle(inner))
    }
}

/// Sleep the current thread. Matches [`psp::thread::sleep_ms`]'s signature;
/// there is no scheduler tick to coalesce with here, so this is a thin
/// wrapper over [`std::thread::sleep`].
pub fn sleep_ms(ms: u32) {
    std::thread::sleep(std::time::Duration::from_millis(ms as u64));
}

/// Sleep for `us` microseconds. On the original target this arms a
/// one-shot timer that releases a temporary binary semaphore the caller
/// then blocks on; on this hosted backend `std::thread::sleep` already
/// gives microsecond granularity, so there is no timer/semaphore pair to
/// stand up.
pub fn sleep_us(us: u64) {
    std::thread::sleep(std::time::Duration::from_micros(us));
}

/// Sleep with a coalescing-tolerant deadline: a real RTOS may wake the
/// caller anywhere in `[ms, ms + slack_ms]`, using the slack to batch this
/// wakeup with other pending timers. This backend has no other timers to
/// coalesce with, so it sleeps for exactly `ms`; `slack_ms` is accepted
/// for API compatibility and does not otherwise affect the wait.
pub fn sleep_relaxed(ms: u32, slack_ms: u32) {
    log::trace!("sleep_relaxed({ms}, slack={slack_ms})");
    sleep_ms(ms);
}

/// The OS thread id of the calling thread, for logging/diagnostics.
pub fn current_os_id() -> ThreadId {
    thread::current().id()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;

    #[test]
    fn spawn_and_join_returns_exit_code() {
        let handle = ThreadBuilder::new("exit-code").spawn(|_ctx| 42).unwrap();
        assert_eq!(handle.join().unwrap(), 42);
    }

    #[test]
    fn second_join_reports_already_joined() {
        let handle = ThreadBuilder::new("double-join").spawn(|_ctx| 0).unwrap();
        assert!(handle.join().is_ok());
        assert_eq!(
            handle.join().unwrap_err().kind(),
            ThreadErrorKind::AlreadyJoined
        );
    }

    #[test]
    fn panic_in_body_is_caught_and_reported() {
        let handle = ThreadBuilder::new("panicker")
            .spawn(|_ctx| panic!("boom"))
            .unwrap();
        assert_eq!(handle.join().unwrap(), -1);
    }

    #[test]
    fn mailbox_round_trip_via_context() {
        let handle = ThreadBuilder::new("mailbox-rt")
            .mailbox_capacity(4)
            .spawn(|ctx| {
                let keep_going = ctx.wait();
                if keep_going {
                    1
                } else {
                    0
                }
            })
            .unwrap();

        handle
            .send_event(Event::Callback {
                func: |_| {},
                ctx: 0,
            })
            .unwrap();
        assert_eq!(handle.join().unwrap(), 1);
    }

    #[test]
    fn thread_without_mailbox_rejects_send() {
        let handle = ThreadBuilder::new("no-mailbox").spawn(|_ctx| 0).unwrap();
        let err = handle
            .send_event(Event::Callback {
                func: |_| {},
                ctx: 0,
            })
            .unwrap_err();
        assert_eq!(err, EventError::NoMailbox);
        handle.join().unwrap();
    }

    #[test]
    fn builder_records_priority_and_default_differs_from_override() {
        let default_handle = ThreadBuilder::new("prio-default").spawn(|_ctx| 0).unwrap();
        assert_eq!(default_handle.priority(), 32);
        default_handle.join().unwrap();

        let custom_handle = ThreadBuilder::new("prio-custom")
            .priority(10)
            .stack_bytes(128 * 1024)
            .spawn(|_ctx| 0)
            .unwrap();
        assert_eq!(custom_handle.priority(), 10);
        custom_handle.join().unwrap();
    }

    #[test]
    fn sleep_us_sleeps_at_least_the_requested_duration() {
        let start = std::time::Instant::now();
        sleep_us(2000);
        assert!(start.elapsed() >= std::time::Duration::from_micros(2000));
    }

    #[test]
    fn sleep_relaxed_sleeps_at_least_the_minimum_bound() {
        let start = std::time::Instant::now();
        sleep_relaxed(5, 50);
        assert!(start.elapsed() >= std::time::Duration::from_millis(5));
    }

    /// A thread that sends an event to its own mailbox while it is full
    /// cannot drain it to make room, that send would deadlock. The
    /// mailbox panics instead; the trampoline catches it the same way it
    /// catches any other body panic (see
    /// `panic_in_body_is_caught_and_reported`), so the thread "returns" -1
    /// rather than hanging.
    #[test]
    fn self_send_to_full_mailbox_is_fatal() {
        let handle_cell: Arc<Mutex<Option<ThreadHandle>>> = Arc::new(Mutex::new(None));
        let cell_thread = Arc::clone(&handle_cell);
        let gate = Arc::new(crate::sync::Semaphore::new("gate", 0, 1).unwrap());
        let gate_thread = Arc::clone(&gate);

        let handle = ThreadBuilder::new("self-send-fatal")
            .mailbox_capacity(1)
            .spawn(move |_ctx| {
                gate_thread.acquire();
                let me = cell_thread
                    .lock()
                    .unwrap_or_else(|p| p.into_inner())
                    .clone()
                    .unwrap();
                me.send_event(Event::Callback {
                    func: |_| {},
                    ctx: 0,
                })
                .unwrap();
                // Mailbox is now full; sending to it again from the same
                // (owning) thread is the fatal self-send case.
                let _ = me.send_event(Event::Callback {
                    func: |_| {},
                    ctx: 0,
                });
                0
            })
            .unwrap();

        *handle_cell.lock().unwrap_or_else(|p| p.into_inner()) = Some(handle.clone());
        gate.release();
        assert_eq!(handle.join().unwrap(), -1);
    }
}
