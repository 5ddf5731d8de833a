//! Workspace facade crate.
//!
//! Re-exports the planning core and its collaborator contracts so a host
//! application can depend on `task-assigning-workspace` alone and wire a
//! [`Coordinator`](core_planning::Coordinator) from one import path.

pub use bridge_traits;
pub use core_model;
pub use core_planning;
pub use core_runtime;
