//! Runtime handles.

pub use tokio::runtime::{Handle, Runtime, TryCurrentError};
