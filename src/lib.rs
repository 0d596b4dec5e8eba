//! Embedded OS abstraction layer: a thread/event runtime, async work
//! dispatch (pipes, FIFOs, work queues, coalescing notifications), and a
//! SPI-NOR flash HAL.
//!
//! This crate runs hosted on `std` rather than bare-metal: the primitives
//! that would normally wrap RTOS syscalls instead bind onto
//! `std::thread`/`std::sync`. See [`thread`] and [`sync`] for the seam
//! where that binding happens, and `DESIGN.md` in the repository root for
//! the full grounding ledger.
//!
//! # Layout
//!
//! - [`critical_section`], [`sync`], the primitives every other module is
//!   built from.
//! - [`timeout`], the `0`/`FOREVER` millisecond convention shared by every
//!   blocking call in this crate.
//! - [`thread`], [`event`], [`callback`], [`notify`], the thread/event
//!   runtime: thread handles with mailboxes, the event sum type dispatched
//!   out of them, cross-thread callback posting, and coalescing one-shot
//!   notifications.
//! - [`fifo`], [`pipe`], [`workqueue`], asynchronous work dispatch: a raw
//!   byte ring, a blocking byte stream built on top of one, and a
//!   worker-thread-backed task queue with three boot singletons.
//! - [`flash`], the SPI-NOR flash HAL: a hardware seam trait, the generic
//!   command primitive, the JEDEC property table, status-register and
//!   write-protect logic, security registers, and vendor-dispatched init.

pub mod callback;
pub mod critical_section;
pub mod event;
pub mod fifo;
pub mod flash;
pub mod notify;
pub mod pipe;
pub mod sync;
pub mod thread;
pub mod timeout;
pub mod workqueue;

pub use event::{Event, EventError, Mailbox};
pub use fifo::Fifo;
pub use notify::Notification;
pub use pipe::Pipe;
pub use thread::{ThreadBuilder, ThreadContext, ThreadError, ThreadHandle};
pub use timeout::FOREVER;
pub use workqueue::{BootQueue, WorkItem, WorkQueue};
