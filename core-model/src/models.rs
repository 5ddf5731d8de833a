//! Planning entities: tasks, users, statuses and scores.

use crate::error::ModelError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Id of the sentinel user that holds tasks no real user can take.
pub const PLANNING_USER_ID: &str = "planninguser";

/// Id of the dummy task present in every built solution.
pub const DUMMY_TASK_ID: TaskId = TaskId(-1);

/// Id of the second dummy task that keeps the optimizer's search space from
/// collapsing when only one movable task remains.
pub const DUMMY_TASK_PLANNER_241_ID: TaskId = TaskId(-2);

// =============================================================================
// ID Types
// =============================================================================

/// Unique identifier for a task in the external runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub i64);

impl TaskId {
    pub fn is_dummy(&self) -> bool {
        *self == DUMMY_TASK_ID || *self == DUMMY_TASK_PLANNER_241_ID
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for TaskId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<i32> for TaskId {
    fn from(value: i32) -> Self {
        Self(i64::from(value))
    }
}

/// Unique identifier for a user
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn planning_user() -> Self {
        Self(PLANNING_USER_ID.to_string())
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for UserId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

// =============================================================================
// Task Status
// =============================================================================

/// Lifecycle status of a task as reported by the external runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    Ready,
    Reserved,
    InProgress,
    Suspended,
    Completed,
    Exited,
    Failed,
    Error,
    Obsolete,
}

impl TaskStatus {
    /// Statuses the planner queries on a cold start.
    pub const ACTIVE_AND_READY: [TaskStatus; 4] = [
        TaskStatus::Ready,
        TaskStatus::Reserved,
        TaskStatus::InProgress,
        TaskStatus::Suspended,
    ];

    /// Returns true when the task is owned by somebody and still open.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            TaskStatus::Reserved | TaskStatus::InProgress | TaskStatus::Suspended
        )
    }

    /// Returns true if the task can no longer change.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed
                | TaskStatus::Exited
                | TaskStatus::Failed
                | TaskStatus::Error
                | TaskStatus::Obsolete
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Ready => "Ready",
            TaskStatus::Reserved => "Reserved",
            TaskStatus::InProgress => "InProgress",
            TaskStatus::Suspended => "Suspended",
            TaskStatus::Completed => "Completed",
            TaskStatus::Exited => "Exited",
            TaskStatus::Failed => "Failed",
            TaskStatus::Error => "Error",
            TaskStatus::Obsolete => "Obsolete",
        }
    }
}

impl FromStr for TaskStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Ready" => Ok(TaskStatus::Ready),
            "Reserved" => Ok(TaskStatus::Reserved),
            "InProgress" => Ok(TaskStatus::InProgress),
            "Suspended" => Ok(TaskStatus::Suspended),
            "Completed" => Ok(TaskStatus::Completed),
            "Exited" => Ok(TaskStatus::Exited),
            "Failed" => Ok(TaskStatus::Failed),
            "Error" => Ok(TaskStatus::Error),
            "Obsolete" => Ok(TaskStatus::Obsolete),
            other => Err(ModelError::UnknownStatus(other.to_string())),
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Entities
// =============================================================================

/// A unit of work in the planning model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    pub status: TaskStatus,
    /// User whose queue currently holds this task
    pub user: Option<UserId>,
    pub priority: i32,
    /// Set once the assignment has been made visible externally
    pub pinned: bool,
    pub process_id: Option<String>,
    pub container_id: Option<String>,
}

impl Task {
    pub fn new(id: impl Into<TaskId>, name: impl Into<String>, status: TaskStatus) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status,
            user: None,
            priority: 0,
            pinned: false,
            process_id: None,
            container_id: None,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_user(mut self, user: impl Into<UserId>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_pinned(mut self, pinned: bool) -> Self {
        self.pinned = pinned;
        self
    }

    pub fn is_dummy(&self) -> bool {
        self.id.is_dummy()
    }

    pub fn dummy() -> Self {
        Task::new(DUMMY_TASK_ID, "dummy-task", TaskStatus::Ready)
    }

    pub fn dummy_planner_241() -> Self {
        Task::new(DUMMY_TASK_PLANNER_241_ID, "dummy-task-241", TaskStatus::Ready)
    }
}

/// A worker with an ordered queue of tasks.
///
/// The queue order is the authoritative position index of each task: pinned
/// tasks always form a prefix of the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub enabled: bool,
    pub task_ids: Vec<TaskId>,
}

impl User {
    pub fn new(id: impl Into<UserId>) -> Self {
        Self {
            id: id.into(),
            enabled: true,
            task_ids: Vec::new(),
        }
    }

    pub fn planning_user() -> Self {
        Self::new(UserId::planning_user())
    }

    pub fn is_planning_user(&self) -> bool {
        self.id.as_str() == PLANNING_USER_ID
    }
}

/// Solution quality as reported by the optimizer.
///
/// Ordering is lexicographic over `(init, hard, soft)`; a higher score is a
/// better one. A negative `init` counts planning variables still unassigned.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Score {
    pub init: i64,
    pub hard: i64,
    pub soft: i64,
}

impl Score {
    pub fn new(init: i64, hard: i64, soft: i64) -> Self {
        Self { init, hard, soft }
    }

    /// A score for a model where every planning variable is set.
    pub fn initialized(hard: i64, soft: i64) -> Self {
        Self::new(0, hard, soft)
    }

    pub fn uninitialized(missing: i64) -> Self {
        Self::new(-missing.abs(), 0, 0)
    }

    pub fn is_initialized(&self) -> bool {
        self.init == 0
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_initialized() {
            write!(f, "{}hard/{}soft", self.hard, self.soft)
        } else {
            write!(f, "{}init/{}hard/{}soft", self.init, self.hard, self.soft)
        }
    }
}
