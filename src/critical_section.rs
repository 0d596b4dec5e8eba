//! Critical section, the primitive every other component in this crate
//! uses to bound its shortest data-structure updates.
//!
//! On the original target this disables interrupts/preemption for the
//! duration of the token's lifetime. Hosted on `std`, there is no such
//! thing as disabling interrupts, so [`enter()`] instead takes a single
//! process-wide lock; the effect callers care about, "nothing else touches
//! this data structure while I hold the token", is preserved exactly.
//!
//! Entry is reentrant: a thread that is already inside a critical section
//! can enter another without deadlocking. This mirrors `psp::sync::SpinMutex`,
//! generalized from a single spin-locked resource to a global reentrant gate.
//!
//! # Example
//!
//! ```ignore
//! use osi_core::critical_section::enter;
//!
//! let _token = enter();
//! // ... touch shared state ...
//! // token dropped here, section exits
//! ```

use std::cell::Cell;
use std::sync::{Mutex, MutexGuard};

static LOCK: Mutex<()> = Mutex::new(());

thread_local! {
    static DEPTH: Cell<u32> = const { Cell::new(0) };
}

/// An entered critical section. Exits (and, if outermost, releases the
/// global lock) when dropped.
pub struct CriticalSection {
    // Only the outermost entry on a thread actually holds the lock; nested
    // entries carry `None` and just bump/decrement the depth counter.
    _guard: Option<MutexGuard<'static, ()>>,
}

/// Enter a critical section, blocking until any other thread's section has
/// exited. Never call this from code paths that must not block, ISR-style
/// callers use the crate's `*_from_isr` entry points, which never enter one.
pub fn enter() -> CriticalSection {
    let depth = DEPTH.with(|d| {
        let cur = d.get();
        d.set(cur + 1);
        cur
    });

    let guard = if depth == 0 {
        Some(LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner()))
    } else {
        None
    };

    CriticalSection { _guard: guard }
}

impl Drop for CriticalSection {
    fn drop(&mut self) {
        DEPTH.with(|d| d.set(d.get() - 1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn nests_without_deadlock() {
        let outer = enter();
        let inner = enter();
        drop(inner);
        drop(outer);
    }

    #[test]
    fn excludes_other_threads() {
        let counter = Arc::new(AtomicU32::new(0));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let counter = Arc::clone(&counter);
            handles.push(std::thread::spawn(move || {
                for _ in 0..1000 {
                    let _cs = enter();
                    let v = counter.load(Ordering::Relaxed);
                    counter.store(v + 1, Ordering::Relaxed);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(counter.load(Ordering::Relaxed), 8000);
    }
}
