//! Worker-thread-backed task list.
//!
//! Generalizes `psp::me::MeExecutor`'s submit/poll/wait task model (one
//! execution unit, a shared status flag, a handle the caller polls/waits
//! on) into a persistent worker thread draining an ordered list of
//! [`WorkItem`]s, with a `finish_sema` waiters recheck against rather than a
//! single task's status flag.

use crate::critical_section;
use crate::sync::Semaphore;
use crate::thread::{ThreadBuilder, ThreadHandle};
use crate::timeout::{Deadline, FOREVER};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

/// Queue membership token, cleared when a work item is dequeued or
/// detached.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
struct QueueTag(usize);

struct ItemState {
    run: Option<Box<dyn FnMut(usize) + Send>>,
    complete: Option<Box<dyn FnMut(usize) + Send>>,
    ctx: usize,
    queue: Option<QueueTag>,
}

/// A unit of work: a `run` closure, an optional `complete` closure, and an
/// opaque context. At most one queue may hold it at a time.
pub struct WorkItem {
    state: Mutex<ItemState>,
}

impl WorkItem {
    /// Create a detached work item. `run` executes on the worker thread;
    /// `complete`, if present, runs immediately after on the same thread.
    pub fn new<R>(ctx: usize, run: R) -> Arc<Self>
    where
        R: FnMut(usize) + Send + 'static,
    {
        Arc::new(Self {
            state: Mutex::new(ItemState {
                run: Some(Box::new(run)),
                complete: None,
                ctx,
                queue: None,
            }),
        })
    }

    /// Attach a completion closure, replacing any previous one.
    pub fn with_complete<C>(self: Arc<Self>, complete: C) -> Arc<Self>
    where
        C: FnMut(usize) + Send + 'static,
    {
        {
            let mut s = self.state.lock().unwrap_or_else(|p| p.into_inner());
            s.complete = Some(Box::new(complete));
        }
        self
    }

    fn is_enqueued(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .queue
            .is_some()
    }
}

struct SharedList {
    items: VecDeque<Arc<WorkItem>>,
}

struct Inner {
    tag: QueueTag,
    running: AtomicBool,
    work_sema: Semaphore,
    finish_sema: Semaphore,
    list: Mutex<SharedList>,
}

/// Spawns one worker thread draining an ordered list of [`WorkItem`]s.
///
/// # Example
///
/// ```
/// use osi_core::workqueue::WorkQueue;
/// use osi_core::workqueue::WorkItem;
///
/// let wq = WorkQueue::new("demo", 32, 64 * 1024);
/// let item = WorkItem::new(0, |_ctx| {});
/// wq.enqueue(&item);
/// assert!(wq.wait_finish(&item, 1000));
/// ```
pub struct WorkQueue {
    inner: Arc<Inner>,
    worker: Mutex<Option<ThreadHandle>>,
}

static NEXT_TAG: std::sync::atomic::AtomicUsize = std::sync::atomic::AtomicUsize::new(1);

impl WorkQueue {
    /// `priority`/`stack_bytes` are forwarded to the worker thread's
    /// [`ThreadBuilder`], see [`ThreadBuilder::priority`] and
    /// [`ThreadBuilder::stack_bytes`].
    pub fn new(name: &'static str, priority: i32, stack_bytes: usize) -> Self {
        let tag = QueueTag(NEXT_TAG.fetch_add(1, Ordering::Relaxed));
        let inner = Arc::new(Inner {
            tag,
            running: AtomicBool::new(true),
            work_sema: Semaphore::new("wq-work", 0, u32::MAX).expect("max>0 is always valid"),
            finish_sema: Semaphore::new("wq-finish", 0, u32::MAX).expect("max>0 is always valid"),
            list: Mutex::new(SharedList {
                items: VecDeque::new(),
            }),
        });

        let worker_inner = Arc::clone(&inner);
        let handle = ThreadBuilder::new(name)
            .priority(priority)
            .stack_bytes(stack_bytes)
            .spawn(move |_ctx| {
                worker_loop(&worker_inner);
                0
            })
            .expect("spawning the work queue's worker thread should not fail");

        log::debug!("work queue '{name}' started (priority={priority}, stack_bytes={stack_bytes})");
        Self {
            inner,
            worker: Mutex::new(Some(handle)),
        }
    }

    /// Enqueue `item` at the tail. If it was already on another queue (or
    /// this one), it is detached first.
    pub fn enqueue(&self, item: &Arc<WorkItem>) {
        self.detach(item);
        {
            let mut s = item.state.lock().unwrap_or_else(|p| p.into_inner());
            s.queue = Some(self.inner.tag);
        }
        self.inner
            .list
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .items
            .push_back(Arc::clone(item));
        self.inner.work_sema.release();
    }

    /// As [`enqueue`](Self::enqueue), but unconditionally detaches first
    /// even if `item` is already on this queue, used to move an
    /// already-enqueued item to the tail.
    pub fn enqueue_last(&self, item: &Arc<WorkItem>) {
        self.enqueue(item);
    }

    /// Detach `item` from whichever queue it's on, if any. A no-op if it
    /// isn't currently enqueued, or is already running (an in-flight item
    /// cannot be cancelled mid-callback).
    pub fn cancel(&self, item: &Arc<WorkItem>) {
        self.detach(item);
    }

    fn detach(&self, item: &Arc<WorkItem>) {
        let was_queued = {
            let mut s = item.state.lock().unwrap_or_else(|p| p.into_inner());
            s.queue.take().is_some()
        };
        if was_queued {
            let mut list = self.inner.list.lock().unwrap_or_else(|p| p.into_inner());
            list.items.retain(|i| !Arc::ptr_eq(i, item));
        }
    }

    /// Wait for `item` to finish, or until `timeout_ms` elapses. Returns
    /// `true` immediately if it isn't (or is no longer) enqueued.
    ///
    /// `finish_sema` is shared by every item this queue ever runs, so on
    /// each wake this rechecks whether `item` specifically has left the
    /// queue rather than trusting the wake alone.
    pub fn wait_finish(&self, item: &Arc<WorkItem>, timeout_ms: u32) -> bool {
        if !item.is_enqueued() {
            return true;
        }
        let deadline = Deadline::from_ms(timeout_ms);
        loop {
            let wait_ms = if timeout_ms == FOREVER {
                FOREVER
            } else {
                match deadline.remaining() {
                    Some(d) if !d.is_zero() => d.as_millis() as u32,
                    _ => return !item.is_enqueued(),
                }
            };
            self.inner.finish_sema.try_acquire(wait_ms);
            if !item.is_enqueued() {
                return true;
            }
            if timeout_ms != FOREVER && deadline.expired() {
                return false;
            }
        }
    }

    /// Stop the worker thread and drain the queue, detaching every
    /// remaining item without running it.
    pub fn delete(self) {
        self.inner.running.store(false, Ordering::SeqCst);
        self.inner.work_sema.release();
        if let Some(handle) = self.worker.lock().unwrap_or_else(|p| p.into_inner()).take() {
            let _ = handle.join();
        }
    }
}

fn worker_loop(inner: &Arc<Inner>) {
    while inner.running.load(Ordering::SeqCst) {
        inner.work_sema.acquire();
        loop {
            let item = {
                let _cs = critical_section::enter();
                let mut list = inner.list.lock().unwrap_or_else(|p| p.into_inner());
                list.items.pop_front()
            };
            let Some(item) = item else { break };
            {
                let mut s = item.state.lock().unwrap_or_else(|p| p.into_inner());
                s.queue = None;
            }

            let (mut run, mut complete, ctx) = {
                let mut s = item.state.lock().unwrap_or_else(|p| p.into_inner());
                (s.run.take(), s.complete.take(), s.ctx)
            };
            if let Some(run) = run.as_mut() {
                run(ctx);
            }
            if let Some(complete) = complete.as_mut() {
                complete(ctx);
            }
            inner.finish_sema.release();
        }
        if !inner.running.load(Ordering::SeqCst) {
            let mut list = inner.list.lock().unwrap_or_else(|p| p.into_inner());
            for item in list.items.drain(..) {
                let mut s = item.state.lock().unwrap_or_else(|p| p.into_inner());
                s.queue = None;
            }
        }
    }
}

/// Priority tier for the process-wide singleton queues initialised at
/// boot (see [`boot_queue`]).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BootQueue {
    HighPriority,
    LowPriority,
    FileSystem,
}

static HIGH: OnceLock<WorkQueue> = OnceLock::new();
static LOW: OnceLock<WorkQueue> = OnceLock::new();
static FS: OnceLock<WorkQueue> = OnceLock::new();

/// Process-wide singleton work queue for the given tier, created lazily
/// on first use and shared for the remainder of the process. All three
/// accept the same [`WorkItem`] interface.
pub fn boot_queue(which: BootQueue) -> &'static WorkQueue {
    const STACK_BYTES: usize = 64 * 1024;
    match which {
        BootQueue::HighPriority => {
            HIGH.get_or_init(|| WorkQueue::new("wq-high", 20, STACK_BYTES))
        }
        BootQueue::LowPriority => LOW.get_or_init(|| WorkQueue::new("wq-low", 40, STACK_BYTES)),
        BootQueue::FileSystem => FS.get_or_init(|| WorkQueue::new("wq-fs", 35, STACK_BYTES)),
    }
}
