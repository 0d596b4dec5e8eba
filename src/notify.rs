//! Coalescing one-shot notification.
//!
//! Generalizes `psp::timer::Alarm`'s single-shot armed/cancelled state
//! machine (an alarm either hasn't fired, or has and consumed its closure)
//! into a four-state coalescing machine: multiple
//! [`Notification::trigger`] calls before the target thread consumes the
//! pending event collapse into exactly one callback invocation.

use crate::critical_section;
use crate::event::Event;
use crate::thread::ThreadHandle;
use std::sync::Mutex;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Status {
    Idle,
    QueuedActive,
    QueuedCancel,
    QueuedDelete,
}

/// A coalescing one-shot trigger targeting a thread.
///
/// # Example
///
/// ```ignore
/// use osi_core::notify::Notification;
///
/// let n = Notification::new(&target_thread, |ctx| println!("fired: {ctx}"), 7).unwrap();
/// n.trigger(); // may be called many times before the thread wakes;
/// n.trigger(); // the callback still only runs once per wake.
/// ```
pub struct Notification {
    target: ThreadHandle,
    cb: Mutex<Box<dyn FnMut(usize) + Send>>,
    ctx: usize,
    status: Mutex<Status>,
}

impl Notification {
    /// Create a notification targeting `target`'s mailbox.
    pub fn new<F>(target: &ThreadHandle, cb: F, ctx: usize) -> std::sync::Arc<Self>
    where
        F: FnMut(usize) + Send + 'static,
    {
        std::sync::Arc::new(Self {
            target: target.clone(),
            cb: Mutex::new(Box::new(cb)),
            ctx,
            status: Mutex::new(Status::Idle),
        })
    }

    /// Arm the notification. If it was idle, enqueues exactly one `Notify`
    /// event on the target's mailbox. If a dispatch is already pending
    /// (queued, not yet consumed, and not mid-delete), re-arms it without
    /// enqueuing a second event, this is the coalescing behaviour.
    pub fn trigger(self: &std::sync::Arc<Self>) {
        let should_send = {
            let _cs = critical_section::enter();
            let mut status = self.status.lock().unwrap_or_else(|p| p.into_inner());
            match *status {
                Status::Idle => {
                    *status = Status::QueuedActive;
                    true
                }
                Status::QueuedActive | Status::QueuedCancel => {
                    *status = Status::QueuedActive;
                    false
                }
                Status::QueuedDelete => false,
            }
        };

        if should_send {
            let event = Event::Notify {
                notification: std::sync::Arc::clone(self),
            };
            if let Err(e) = self.target.send_event(event) {
                log::warn!("notification trigger failed to enqueue: {e}");
            }
        }
    }

    /// Disarm a pending trigger before it is consumed. A no-op if the
    /// notification is not currently queued-active.
    pub fn cancel(&self) {
        let _cs = critical_section::enter();
        let mut status = self.status.lock().unwrap_or_else(|p| p.into_inner());
        if *status == Status::QueuedActive {
            *status = Status::QueuedCancel;
        }
    }

    /// Mark for deletion. If idle, there is nothing in flight and the
    /// `Arc` can simply be dropped by the caller. If queued, the pending
    /// dispatch will free it (see [`dispatch`]) instead of invoking the
    /// callback.
    pub fn delete(self: std::sync::Arc<Self>) {
        let _cs = critical_section::enter();
        let mut status = self.status.lock().unwrap_or_else(|p| p.into_inner());
        if *status != Status::Idle {
            *status = Status::QueuedDelete;
        }
        // Idle: nothing queued references this Arc beyond the caller's,
        // which drops normally when this function returns.
    }
}

/// Invoked by [`crate::event::dispatch`] for `Event::Notify` events. Toggles
/// status under the critical section (preserving the coalescing invariant:
/// a trigger arriving mid-dispatch re-arms exactly once) and runs the
/// callback outside of it.
pub(crate) fn dispatch(notification: &std::sync::Arc<Notification>) {
    enum Action {
        Invoke,
        Drop,
        None,
    }

    let action = {
        let _cs = critical_section::enter();
        let mut status = notification
            .status
            .lock()
            .unwrap_or_else(|p| p.into_inner());
        match *status {
            Status::QueuedDelete => Action::Drop,
            Status::QueuedActive => {
                *status = Status::Idle;
                Action::Invoke
            }
            Status::QueuedCancel => {
                *status = Status::Idle;
                Action::None
            }
            Status::Idle => Action::None,
        }
    };

    match action {
        Action::Invoke => {
            let mut cb = notification.cb.lock().unwrap_or_else(|p| p.into_inner());
            cb(notification.ctx);
        }
        Action::Drop | Action::None => {}
    }
}
