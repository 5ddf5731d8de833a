//! Future combinators used alongside the runtime primitives.
//!
//! `FutureExt::catch_unwind` contains panics of a worker's job so the worker
//! loop survives; `join_all` awaits a batch of join handles on shutdown.

pub use futures::future::join_all;
pub use futures::FutureExt;
