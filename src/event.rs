//! Event records and the per-thread mailbox they flow through.
//!
//! An [`Event`] is the "opaque machine word tuple" from the data model,
//! expressed as a tagged union rather than a raw `{id, param1, param2,
//! param3}` struct, the re-architecture the design notes call for ("bit
//! field structs... represent as sum types"). [`Mailbox`] is a bounded
//! [`MessageQueue`](crate::sync::MessageQueue) of these, one per thread
//! that asked for one at creation time.

use crate::notify::Notification;
use crate::sync::{MessageQueue, Semaphore, SyncError};
use std::sync::Arc;

/// Default upper bound (in ms) a blocking [`Mailbox::send`] will wait for
/// room before giving up.
pub const DEFAULT_SEND_TIMEOUT_MS: u32 = 1000;

/// A function posted via [`crate::callback::post`], invoked with an opaque
/// `usize` context the caller chooses (typically a pointer cast to
/// `usize`, the same convention C-style callback APIs use for `c_void`
/// arguments).
pub type CallbackFn = fn(usize);

/// One event record, dispatched by [`Mailbox::wait`]/[`Mailbox::try_wait`].
#[derive(Clone)]
pub enum Event {
    /// Forwarded to the timer subsystem's invocation hook; carried here as
    /// opaque parameters since the timer subsystem itself is out of scope.
    Timer {
        param1: usize,
        param2: usize,
        param3: usize,
    },
    /// Run `func(ctx)` in the receiving thread, then mark consumed.
    Callback { func: CallbackFn, ctx: usize },
    /// Coalescing notification, see [`crate::notify`].
    Notify { notification: Arc<Notification> },
    /// Ask the receiving thread to exit its event loop. If `ack` is set,
    /// the receiver releases it once observed, acknowledging receipt to
    /// whichever thread is waiting on it.
    Quit { ack: Option<Arc<Semaphore>> },
}

/// Error sending into or waiting on a mailbox.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum EventError {
    /// The mailbox did not have room within the requested timeout.
    Timeout,
    /// The thread has no mailbox (it was created with `event_count == 0`).
    NoMailbox,
}

impl std::fmt::Display for EventError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventError::Timeout => write!(f, "mailbox send/wait timed out"),
            EventError::NoMailbox => write!(f, "thread has no event mailbox"),
        }
    }
}

impl std::error::Error for EventError {}

/// A bounded queue of [`Event`] records bound to one thread.
pub struct Mailbox {
    queue: MessageQueue<Event>,
    owner: std::thread::ThreadId,
}

impl Mailbox {
    /// `owner` is the OS thread id this mailbox is delivered to, used only
    /// to detect the fatal self-send case below.
    pub fn new(capacity: usize, owner: std::thread::ThreadId) -> Result<Self, SyncError> {
        Ok(Self {
            queue: MessageQueue::new(capacity)?,
            owner,
        })
    }

    /// Send with the default timeout (see [`DEFAULT_SEND_TIMEOUT_MS`]).
    pub fn send(&self, event: Event) -> Result<(), EventError> {
        self.try_send(event, DEFAULT_SEND_TIMEOUT_MS)
    }

    /// Send, respecting the usual `0`/`FOREVER` timeout convention (see
    /// [`crate::timeout`]).
    ///
    /// # Panics
    ///
    /// A thread sending to its own mailbox while it is full can never
    /// drain it to make room, that send would block forever. Rather than
    /// hang, this panics immediately.
    pub fn try_send(&self, event: Event, timeout_ms: u32) -> Result<(), EventError> {
        if std::thread::current().id() == self.owner && self.queue.is_full() {
            panic!("thread sent an event to its own full mailbox");
        }
        self.queue
            .try_put(event, timeout_ms)
            .map_err(|_| EventError::Timeout)
    }

    /// Non-blocking send for ISR-equivalent callers.
    pub fn try_send_from_isr(&self, event: Event) -> Result<(), EventError> {
        self.queue
            .try_put_from_isr(event)
            .map_err(|_| EventError::Timeout)
    }

    /// Block until an event arrives and dequeue it (undispatched, see
    /// [`crate::thread::ThreadContext::wait`] for the dispatching wrapper).
    pub fn wait_raw(&self) -> Event {
        self.queue.get()
    }

    /// As [`wait_raw`](Self::wait_raw), but with a timeout.
    pub fn try_wait_raw(&self, timeout_ms: u32) -> Option<Event> {
        self.queue.try_get(timeout_ms)
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }
}

/// Dispatch one already-dequeued event, per spec §4.6:
///
/// - `Timer` events are hooked from outside this crate (the timer
///   subsystem is an external collaborator); here we just return them so
///   the caller can forward them.
/// - `Callback` events run `func(ctx)` synchronously.
/// - `Notify` events toggle the notification's status under a critical
///   section and invoke its callback outside of it, see
///   [`crate::notify::dispatch`].
/// - `Quit` events release the acknowledgement semaphore, if any.
///
/// Returns `true` if the event loop should keep running (i.e. it was not
/// a `Quit`).
pub fn dispatch(event: Event) -> bool {
    match event {
        Event::Timer { .. } => true,
        Event::Callback { func, ctx } => {
            log::trace!("dispatching callback event");
            func(ctx);
            true
        }
        Event::Notify { notification } => {
            crate::notify::dispatch(&notification);
            true
        }
        Event::Quit { ack } => {
            log::debug!("dispatching quit event");
            if let Some(ack) = ack {
                ack.release();
            }
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_then_wait_round_trips_an_event() {
        let mailbox = Mailbox::new(2, std::thread::current().id()).unwrap();
        mailbox
            .send(Event::Callback {
                func: |_| {},
                ctx: 7,
            })
            .unwrap();
        match mailbox.wait_raw() {
            Event::Callback { ctx, .. } => assert_eq!(ctx, 7),
            _ => panic!("unexpected event"),
        }
    }

    #[test]
    fn quit_dispatch_reports_stop_and_releases_ack() {
        let ack = Arc::new(Semaphore::new("quit-ack", 0, 1).unwrap());
        let keep_going = dispatch(Event::Quit {
            ack: Some(Arc::clone(&ack)),
        });
        assert!(!keep_going);
        assert!(ack.try_acquire(0));
    }

    #[test]
    #[should_panic(expected = "own full mailbox")]
    fn send_to_own_full_mailbox_panics() {
        let mailbox = Mailbox::new(1, std::thread::current().id()).unwrap();
        mailbox.send(Event::Quit { ack: None }).unwrap();
        mailbox.send(Event::Quit { ack: None }).unwrap();
    }

    #[test]
    fn send_to_full_mailbox_from_another_thread_times_out_instead_of_panicking() {
        let mailbox = Arc::new(Mailbox::new(1, std::thread::current().id()).unwrap());
        mailbox.send(Event::Quit { ack: None }).unwrap();
        let other = Arc::clone(&mailbox);
        let err = std::thread::spawn(move || other.try_send(Event::Quit { ack: None }, 0))
            .join()
            .unwrap()
            .unwrap_err();
        assert_eq!(err, EventError::Timeout);
    }
}
