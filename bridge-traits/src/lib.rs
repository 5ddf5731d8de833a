//! # Collaborator Bridge Traits
//!
//! Contracts between the planning core and the systems it drives.
//!
//! ## Overview
//!
//! The planning core never talks to the optimizer or to the system of record
//! directly. Each capability it needs is a trait here, implemented by the
//! host that embeds the core.
//!
//! ## Traits
//!
//! - [`TaskRuntime`](runtime::TaskRuntime) - Task queries and plan execution against the system of record
//! - [`UserSystem`](users::UserSystem) - The external user directory
//! - [`Solver`](solver::Solver) - The opaque optimizer
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should convert their native failures into it with an actionable message.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so the core can share them across
//! its worker tasks.

pub mod error;
pub mod runtime;
pub mod solver;
pub mod time;
pub mod users;

pub use error::BridgeError;

pub use runtime::{
    PlanErrorCode, PlanExecutionResult, TaskQuery, TaskQueryResult, TaskRuntime, VariableReadMode,
};
pub use solver::{BestSolutionEvent, BestSolutionListener, Solver};
pub use time::{Clock, SystemClock};
pub use users::UserSystem;
