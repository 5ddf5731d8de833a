//! Model change commands.

use crate::models::{Task, TaskId, TaskStatus, User};
use serde::{Deserialize, Serialize};

/// A single mutation of a running solver's model.
///
/// A change set is an ordered `Vec<ChangeCommand>`; a solver applies it as
/// one batch, in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeCommand {
    /// Leading marker recording the id of the change set it opens.
    ChangeSetMarker { change_set_id: u64 },
    Remove { task: Task },
    Release { task: Task },
    /// Assign `task` to `user`. `publish` pins the assignment; `index` is the
    /// requested queue position, `None` meaning after the pinned prefix.
    Assign {
        task: Task,
        user: User,
        publish: bool,
        index: Option<usize>,
    },
    PropertyChange {
        task: Task,
        priority: Option<i32>,
        status: Option<TaskStatus>,
    },
    Add { task: Task },
    AddUser { user: User },
}

impl ChangeCommand {
    /// Position of this command's kind within a change set.
    pub fn rank(&self) -> u8 {
        match self {
            ChangeCommand::ChangeSetMarker { .. } => 0,
            ChangeCommand::Remove { .. } => 1,
            ChangeCommand::Release { .. } => 2,
            ChangeCommand::Assign { .. } => 3,
            ChangeCommand::PropertyChange { .. } => 4,
            ChangeCommand::Add { .. } => 5,
            ChangeCommand::AddUser { .. } => 6,
        }
    }

    pub fn task_id(&self) -> Option<TaskId> {
        match self {
            ChangeCommand::Remove { task }
            | ChangeCommand::Release { task }
            | ChangeCommand::Assign { task, .. }
            | ChangeCommand::PropertyChange { task, .. }
            | ChangeCommand::Add { task } => Some(task.id),
            ChangeCommand::ChangeSetMarker { .. } | ChangeCommand::AddUser { .. } => None,
        }
    }

    pub fn is_marker(&self) -> bool {
        matches!(self, ChangeCommand::ChangeSetMarker { .. })
    }
}
