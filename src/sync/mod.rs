//! Synchronization primitives: counting/binary semaphores, a recursive
//! owner-tracked mutex, and a bounded fixed-capacity message queue.
//!
//! These play the same role `psp::sync` plays for the PSP kernel, but bind
//! onto `std::sync::{Mutex, Condvar}` instead of
//! `sceKernelCreateSema`/`sceKernelCreateEventFlag`: the host OS is this
//! crate's "kernel".

mod mutex;
mod queue;
mod semaphore;

pub use mutex::RecursiveMutex;
pub use queue::MessageQueue;
pub use semaphore::Semaphore;

/// Error from a synchronization primitive operation.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SyncError(pub SyncErrorKind);

/// What went wrong constructing or using a synchronization primitive.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SyncErrorKind {
    /// A construction parameter was out of range (e.g. `init > max`).
    InvalidArgument,
    /// The primitive could not be allocated.
    ResourceExhausted,
}

impl SyncError {
    pub(crate) fn invalid_argument() -> Self {
        SyncError(SyncErrorKind::InvalidArgument)
    }

    pub fn kind(self) -> SyncErrorKind {
        self.0
    }
}

impl std::fmt::Debug for SyncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SyncError({:?})", self.0)
    }
}

impl std::fmt::Display for SyncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sync error: {:?}", self.0)
    }
}

impl std::error::Error for SyncError {}
