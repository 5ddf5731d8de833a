//! External Task Runtime
//!
//! Queries against the system of record that owns true task state, and the
//! operation that applies a computed plan back to it.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_model::{ExternalTaskUpdate, PlanItem, TaskStatus, UserId};
use serde::{Deserialize, Serialize};

/// How much of the stored planning data the runtime attaches to each task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VariableReadMode {
    /// Planning data for every returned task
    ReadForAll,
    /// Planning data only for active tasks that have no stored plan entry
    ReadForActiveTasksWithNoPlanningEntity,
    DontRead,
}

/// Filter for [`TaskRuntime::find_tasks`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskQuery {
    /// `None` returns tasks in any status
    pub statuses: Option<Vec<TaskStatus>>,
    /// Only tasks modified at or after this instant
    pub modified_since: Option<DateTime<Utc>>,
    pub read_mode: VariableReadMode,
}

impl TaskQuery {
    /// Full pull of every open task, used to recover a model from scratch.
    pub fn active_tasks() -> Self {
        Self {
            statuses: Some(TaskStatus::ACTIVE_AND_READY.to_vec()),
            modified_since: None,
            read_mode: VariableReadMode::ReadForAll,
        }
    }

    /// Incremental pull of everything touched since `from`.
    pub fn modified_since(from: DateTime<Utc>) -> Self {
        Self {
            statuses: None,
            modified_since: Some(from),
            read_mode: VariableReadMode::ReadForActiveTasksWithNoPlanningEntity,
        }
    }
}

/// Tasks returned by a query plus the runtime's timestamp for the query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskQueryResult {
    pub tasks: Vec<ExternalTaskUpdate>,
    pub query_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanErrorCode {
    /// A task changed in the runtime after the plan was computed
    TaskModifiedSincePlanCalculation,
    Unexpected,
}

impl PlanErrorCode {
    pub fn is_recoverable(&self) -> bool {
        matches!(self, PlanErrorCode::TaskModifiedSincePlanCalculation)
    }
}

/// Outcome reported by the runtime for an executed plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanExecutionResult {
    Ok,
    RecoverableError { code: PlanErrorCode, message: String },
    FatalError { code: PlanErrorCode, message: String },
}

impl PlanExecutionResult {
    /// Classifies an error code into the recoverable or fatal variant.
    pub fn error(code: PlanErrorCode, message: impl Into<String>) -> Self {
        let message = message.into();
        if code.is_recoverable() {
            PlanExecutionResult::RecoverableError { code, message }
        } else {
            PlanExecutionResult::FatalError { code, message }
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, PlanExecutionResult::Ok)
    }
}

/// The system of record for tasks.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::runtime::{TaskQuery, TaskRuntime};
///
/// async fn count_open(runtime: &dyn TaskRuntime) -> usize {
///     runtime
///         .find_tasks(TaskQuery::active_tasks())
///         .await
///         .map(|result| result.tasks.len())
///         .unwrap_or(0)
/// }
/// ```
#[async_trait]
pub trait TaskRuntime: Send + Sync {
    async fn find_tasks(&self, query: TaskQuery) -> Result<TaskQueryResult>;

    /// Applies the plan on behalf of `on_behalf_of`.
    async fn execute_plan(
        &self,
        items: Vec<PlanItem>,
        on_behalf_of: &UserId,
    ) -> Result<PlanExecutionResult>;
}
