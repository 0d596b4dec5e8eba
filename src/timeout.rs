//! Shared timeout convention used across every blocking primitive in this
//! crate: milliseconds, with `0` meaning "non-blocking try" and [`FOREVER`]
//! meaning "block indefinitely". Every `try_*` method in this crate accepts
//! a `u32` in this convention rather than a `Duration`, matching the raw
//! millisecond timeouts an RTOS binding would pass straight through to
//! underlying kernel wait calls.

use std::time::{Duration, Instant};

/// Pass to any `try_*` method to block with no time limit.
pub const FOREVER: u32 = u32::MAX;

/// A point in time a blocking call should give up at, or `None` for "never".
///
/// Used to implement the decaying-timeout pattern: a loop that retries a
/// wait with the *remaining* time on each iteration
/// rather than the original timeout, so that `N` spurious wakeups don't
/// multiply the caller's patience by `N`.
#[derive(Clone, Copy)]
pub(crate) struct Deadline(Option<Instant>);

impl Deadline {
    pub(crate) fn from_ms(ms: u32) -> Self {
        if ms == FOREVER {
            Deadline(None)
        } else {
            Deadline(Some(Instant::now() + Duration::from_millis(ms as u64)))
        }
    }

    /// Time left before this deadline, or `None` if it never expires.
    pub(crate) fn remaining(&self) -> Option<Duration> {
        self.0.map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// True once `remaining()` has reached zero. A forever-deadline never expires.
    pub(crate) fn expired(&self) -> bool {
        matches!(self.remaining(), Some(d) if d.is_zero())
    }
}
