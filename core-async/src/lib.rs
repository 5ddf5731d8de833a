//! Async runtime facade for the task assigning core.
//!
//! Every core crate reaches the runtime through this crate instead of naming
//! tokio directly, so the choice of executor stays in one place.
//!
//! # Modules
//!
//! - `task`: Task spawning and join handles
//! - `time`: Sleep, timeouts, durations and instants
//! - `sync`: Locks, channels, notification and cancellation primitives
//! - `runtime`: Handles to the running executor
//! - `future`: Panic containment and joining of several futures
//!
//! The `select!` macro is re-exported for waiting on the first of several
//! futures, typically a channel receive raced against a cancellation token.
//!
//! # Examples
//!
//! ```rust
//! use core_async::sync::CancellationToken;
//! use core_async::task;
//! use core_async::time::{sleep, Duration};
//!
//! async fn example() {
//!     let token = CancellationToken::new();
//!     let child = token.clone();
//!     let handle = task::spawn(async move {
//!         tokio::select! {
//!             _ = child.cancelled() => 0,
//!             _ = sleep(Duration::from_secs(10)) => 42,
//!         }
//!     });
//!     token.cancel();
//!     assert_eq!(handle.await.unwrap(), 0);
//! }
//! ```

pub mod future;
pub mod runtime;
pub mod sync;
pub mod task;
pub mod time;

pub use task::spawn;
pub use tokio::select;
pub use time::{sleep, Duration, Instant};
