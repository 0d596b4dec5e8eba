//! Bounded fixed-capacity message queue.
//!
//! Generalizes a `psp::sync::SpscQueue<T, N>`-style lock-free const-generic
//! single-producer/single-consumer ring to a runtime-capacity,
//! multi-producer/multi-consumer blocking queue, it backs the per-thread
//! event mailbox, which is fed by arbitrary senders.

use crate::timeout::{Deadline, FOREVER};
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

/// A bounded queue of fixed-size elements, with blocking and non-blocking
/// put/get.
///
/// # Example
///
/// ```
/// use osi_core::sync::MessageQueue;
///
/// let q: MessageQueue<u32> = MessageQueue::new(4).unwrap();
/// q.put(1);
/// assert_eq!(q.get(), 1);
/// ```
pub struct MessageQueue<T> {
    capacity: usize,
    buf: Mutex<VecDeque<T>>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl<T> MessageQueue<T> {
    /// Create a queue holding up to `capacity` elements. `capacity == 0`
    /// is rejected, a zero-size queue can never be put to.
    pub fn new(capacity: usize) -> Result<Self, super::SyncError> {
        if capacity == 0 {
            return Err(super::SyncError::invalid_argument());
        }
        Ok(Self {
            capacity,
            buf: Mutex::new(VecDeque::with_capacity(capacity)),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.buf.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    /// Block until there is room, then push `item`.
    pub fn put(&self, item: T) {
        let mut buf = self.buf.lock().unwrap_or_else(|p| p.into_inner());
        while buf.len() >= self.capacity {
            buf = self.not_full.wait(buf).unwrap_or_else(|p| p.into_inner());
        }
        buf.push_back(item);
        self.not_empty.notify_one();
    }

    /// Try to push within `timeout_ms`. Returns the item back on failure
    /// so the caller doesn't lose it.
    pub fn try_put(&self, item: T, timeout_ms: u32) -> Result<(), T> {
        if timeout_ms == FOREVER {
            self.put(item);
            return Ok(());
        }
        let deadline = Deadline::from_ms(timeout_ms);
        let mut buf = self.buf.lock().unwrap_or_else(|p| p.into_inner());
        loop {
            if buf.len() < self.capacity {
                buf.push_back(item);
                self.not_empty.notify_one();
                return Ok(());
            }
            let Some(remaining) = deadline.remaining() else {
                unreachable!("finite deadline always has a remaining duration")
            };
            if remaining.is_zero() {
                return Err(item);
            }
            let (guard, result) = self
                .not_full
                .wait_timeout(buf, remaining)
                .unwrap_or_else(|p| p.into_inner());
            buf = guard;
            if result.timed_out() && buf.len() >= self.capacity {
                return Err(item);
            }
        }
    }

    /// Non-blocking push used from an ISR-equivalent context. Never waits.
    pub fn try_put_from_isr(&self, item: T) -> Result<(), T> {
        let mut buf = self.buf.lock().unwrap_or_else(|p| p.into_inner());
        if buf.len() >= self.capacity {
            return Err(item);
        }
        buf.push_back(item);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Block until an element is available, then pop it.
    pub fn get(&self) -> T {
        let mut buf = self.buf.lock().unwrap_or_else(|p| p.into_inner());
        loop {
            if let Some(item) = buf.pop_front() {
                self.not_full.notify_one();
                return item;
            }
            buf = self.not_empty.wait(buf).unwrap_or_else(|p| p.into_inner());
        }
    }

    /// Try to pop within `timeout_ms`. Returns `None` on timeout.
    pub fn try_get(&self, timeout_ms: u32) -> Option<T> {
        if timeout_ms == FOREVER {
            return Some(self.get());
        }
        let deadline = Deadline::from_ms(timeout_ms);
        let mut buf = self.buf.lock().unwrap_or_else(|p| p.into_inner());
        loop {
            if let Some(item) = buf.pop_front() {
                self.not_full.notify_one();
                return Some(item);
            }
            let Some(remaining) = deadline.remaining() else {
                unreachable!("finite deadline always has a remaining duration")
            };
            if remaining.is_zero() {
                return None;
            }
            let (guard, result) = self
                .not_empty
                .wait_timeout(buf, remaining)
                .unwrap_or_else(|p| p.into_inner());
            buf = guard;
            if result.timed_out() && buf.is_empty() {
                return None;
            }
        }
    }

    /// Non-blocking pop used from an ISR-equivalent context. Never waits.
    pub fn try_get_from_isr(&self) -> Option<T> {
        let mut buf = self.buf.lock().unwrap_or_else(|p| p.into_inner());
        let item = buf.pop_front();
        if item.is_some() {
            self.not_full.notify_one();
        }
        item
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn fifo_order_preserved() {
        let q: MessageQueue<i32> = MessageQueue::new(4).unwrap();
        q.put(1);
        q.put(2);
        q.put(3);
        assert_eq!(q.get(), 1);
        assert_eq!(q.get(), 2);
        assert_eq!(q.get(), 3);
    }

    #[test]
    fn try_put_returns_item_when_full() {
        let q: MessageQueue<i32> = MessageQueue::new(1).unwrap();
        q.put(1);
        assert_eq!(q.try_put(2, 0), Err(2));
    }

    #[test]
    fn try_get_times_out_when_empty() {
        let q: MessageQueue<i32> = MessageQueue::new(1).unwrap();
        assert_eq!(q.try_get(20), None);
    }

    #[test]
    fn put_blocks_until_space_freed() {
        let q = Arc::new(MessageQueue::<i32>::new(1).unwrap());
        q.put(1);
        let other = Arc::clone(&q);
        let handle = std::thread::spawn(move || {
            other.put(2);
        });
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(q.get(), 1);
        handle.join().unwrap();
        assert_eq!(q.get(), 2);
    }

    #[test]
    fn isr_variants_never_block() {
        let q: MessageQueue<i32> = MessageQueue::new(1).unwrap();
        assert_eq!(q.try_get_from_isr(), None);
        assert_eq!(q.try_put_from_isr(5), Ok(()));
        assert_eq!(q.try_put_from_isr(6), Err(6));
        assert_eq!(q.try_get_from_isr(), Some(5));
    }
}
