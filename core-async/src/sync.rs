//! Synchronization primitives.
//!
//! All primitives are `Send + Sync` and async-aware. The
//! [`CancellationToken`] is the shutdown signal shared by background
//! workers: cancelling it wakes every task parked on `cancelled()`.

pub use tokio::sync::{
    mpsc, oneshot, watch, Mutex, MutexGuard, Notify, RwLock, RwLockReadGuard, RwLockWriteGuard,
    Semaphore, SemaphorePermit,
};

pub use tokio_util::sync::CancellationToken;
