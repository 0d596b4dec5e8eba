//! Cross-thread callback posting.
//!
//! Generalizes `psp::callback::register_exit_callback`'s
//! "register a function, it runs when the target thread next processes
//! callbacks" shape into a one-shot post: build a `Callback` event and drop
//! it on the target's mailbox, to run next time that thread calls
//! [`crate::thread::ThreadContext::wait`]/`try_wait`.

use crate::event::{CallbackFn, Event};
use crate::thread::ThreadHandle;

/// Post `func(ctx)` to run on `thread` the next time it dispatches an
/// event. Blocks (with the mailbox's default timeout) unless `from_isr` is
/// set, in which case it never blocks. Returns `false` if the post could
/// not be enqueued (mailbox full, or the thread has none).
pub fn post(thread: &ThreadHandle, func: CallbackFn, ctx: usize) -> bool {
    thread.send_event(Event::Callback { func, ctx }).is_ok()
}

/// ISR-equivalent entry point: never blocks.
pub fn post_from_isr(thread: &ThreadHandle, func: CallbackFn, ctx: usize) -> bool {
    thread
        .send_event_from_isr(Event::Callback { func, ctx })
        .is_ok()
}
