//! Records exchanged with the external task runtime.

use crate::models::{Task, TaskId, TaskStatus, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Planning data the runtime stores for a task from an earlier publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanningTask {
    pub assigned_user: UserId,
    /// Position in the user's queue when the plan was computed
    pub index: Option<usize>,
    pub published: bool,
}

/// A task as seen by the external system of record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalTaskUpdate {
    pub task_id: TaskId,
    pub name: String,
    pub status: TaskStatus,
    pub actual_owner: Option<UserId>,
    pub priority: i32,
    pub last_modification: DateTime<Utc>,
    pub planning_task: Option<PlanningTask>,
    pub process_id: Option<String>,
    pub container_id: Option<String>,
}

impl ExternalTaskUpdate {
    pub fn new(
        task_id: impl Into<TaskId>,
        status: TaskStatus,
        last_modification: DateTime<Utc>,
    ) -> Self {
        let task_id = task_id.into();
        Self {
            task_id,
            name: format!("task-{}", task_id),
            status,
            actual_owner: None,
            priority: 0,
            last_modification,
            planning_task: None,
            process_id: None,
            container_id: None,
        }
    }

    pub fn with_owner(mut self, owner: impl Into<UserId>) -> Self {
        self.actual_owner = Some(owner.into());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_planning_task(mut self, planning_task: PlanningTask) -> Self {
        self.planning_task = Some(planning_task);
        self
    }

    /// Returns true when an earlier plan for this task was made visible.
    pub fn is_plan_published(&self) -> bool {
        self.planning_task.as_ref().map_or(true, |p| p.published)
    }

    /// Builds an unassigned model task carrying this update's properties.
    pub fn to_task(&self) -> Task {
        Task {
            id: self.task_id,
            name: self.name.clone(),
            status: self.status,
            user: None,
            priority: self.priority,
            pinned: false,
            process_id: self.process_id.clone(),
            container_id: self.container_id.clone(),
        }
    }
}

/// A user from the external user directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalUser {
    pub id: UserId,
    pub active: bool,
}

impl ExternalUser {
    pub fn new(id: impl Into<UserId>) -> Self {
        Self {
            id: id.into(),
            active: true,
        }
    }
}

/// One assignment pushed to the external runtime by a publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanItem {
    pub task_id: TaskId,
    pub user_id: UserId,
    pub index: usize,
    pub published: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_published_defaults_to_true_without_planning_data() {
        let update = ExternalTaskUpdate::new(1, TaskStatus::Reserved, Utc::now());
        assert!(update.is_plan_published());

        let update = update.with_planning_task(PlanningTask {
            assigned_user: UserId::new("alice"),
            index: Some(0),
            published: false,
        });
        assert!(!update.is_plan_published());
    }

    #[test]
    fn test_to_task_is_unassigned() {
        let update = ExternalTaskUpdate::new(3, TaskStatus::Reserved, Utc::now())
            .with_owner("bob")
            .with_priority(7);
        let task = update.to_task();
        assert_eq!(task.id, TaskId(3));
        assert_eq!(task.priority, 7);
        assert!(task.user.is_none());
        assert!(!task.pinned);
    }
}
