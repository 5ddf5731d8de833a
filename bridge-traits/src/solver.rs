//! Opaque Optimizer
//!
//! The search algorithm is outside the core. The core hands it a model, feeds
//! it change batches and listens for improved solutions.

use crate::error::Result;
use async_trait::async_trait;
use core_model::{ChangeCommand, Solution};
use std::sync::Arc;

/// An improved solution reported by the solver.
#[derive(Debug, Clone)]
pub struct BestSolutionEvent {
    pub solution: Solution,
    /// True when every change batch submitted so far has been applied
    pub every_change_applied: bool,
}

pub type BestSolutionListener = Arc<dyn Fn(BestSolutionEvent) + Send + Sync>;

/// The optimizer.
///
/// `solve` runs until `terminate_early` is called. While it runs it reports
/// improved solutions through the listener, including one after each applied
/// change batch. Change batches are applied in submission order.
#[async_trait]
pub trait Solver: Send + Sync {
    /// Solves `problem` until terminated and returns the final best solution.
    async fn solve(&self, problem: Solution, listener: BestSolutionListener) -> Result<Solution>;

    /// Asks a running `solve` to return. Returns false if nothing was running.
    fn terminate_early(&self) -> bool;

    /// Queues a change batch for the running model.
    fn add_change_commands(&self, commands: Vec<ChangeCommand>) -> Result<()>;
}
