//! # Planning Core
//!
//! Keeps an external optimizer in step with a task runtime and publishes its
//! assignments back.
//!
//! ## Overview
//!
//! A cold start recovers every open task and user, builds the initial model
//! and starts the solver. From then on a loop runs:
//! - Each improved solution with every change applied is published as a plan
//! - After a publish the runtime is polled for modifications
//! - Modifications become change commands fed to the running solver
//! - A fatal publish discards the model and performs a new cold start
//!
//! ## Components
//!
//! - **Worker Lifecycle** (`lifecycle`): Atomic status machine shared by the workers
//! - **Sync Context** (`context`): Change-set ids, task change times and query window
//! - **Solution Builder** (`solution_builder`): Initial model from recovered tasks
//! - **Change Set Builder** (`changes`): Diffs runtime updates against the model
//! - **Plan** (`plan`): Window-bounded plan extraction
//! - **Solver Runner** (`solver_runner`): Runs the optimizer in a dedicated task
//! - **Publisher** (`publisher`): Executes plans in the runtime
//! - **Synchronizer** (`synchronizer`): Cold starts and incremental polling
//! - **Coordinator** (`coordinator`): Routes results between the workers

pub mod changes;
pub mod context;
pub mod coordinator;
pub mod error;
pub mod lifecycle;
pub mod plan;
pub mod publisher;
pub mod solution_builder;
pub mod solver_runner;
pub mod synchronizer;

#[cfg(test)]
mod testing;

pub use changes::ChangeSetBuilder;
pub use context::SyncContext;
pub use coordinator::Coordinator;
pub use error::{PlanningError, Result};
pub use lifecycle::{WorkerLifecycle, WorkerStatus};
pub use plan::build_plan;
pub use publisher::{PublishHandler, PublishResult, Publisher};
pub use solution_builder::SolutionBuilder;
pub use solver_runner::SolverRunner;
pub use synchronizer::{SyncAction, Synchronizer, SynchronizerHandler, SynchronizerResult};
