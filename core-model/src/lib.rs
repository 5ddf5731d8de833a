//! # Task Assigning Domain Model
//!
//! Types shared by the planning core, the solver bridge and the external
//! task runtime.
//!
//! ## Overview
//!
//! - [`Solution`] is the optimizer's working model: tasks, users and a score.
//! - [`ChangeCommand`] is the only way a running solver's model is mutated.
//! - [`ExternalTaskUpdate`] and [`ExternalUser`] describe the state owned by
//!   the external system of record.
//! - [`PlanItem`] is one assignment pushed back to that system.

pub mod change;
pub mod error;
pub mod external;
pub mod models;
pub mod solution;

pub use change::ChangeCommand;
pub use error::{ModelError, Result};
pub use external::{ExternalTaskUpdate, ExternalUser, PlanItem, PlanningTask};
pub use models::{
    Score, Task, TaskId, TaskStatus, User, UserId, DUMMY_TASK_ID, DUMMY_TASK_PLANNER_241_ID,
    PLANNING_USER_ID,
};
pub use solution::Solution;
