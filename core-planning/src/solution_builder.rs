//! Builds the initial solution from a full pull of the external runtime.

use crate::context::SyncContext;
use core_model::{
    ExternalTaskUpdate, ExternalUser, Solution, Task, TaskId, TaskStatus, User, UserId,
};
use std::collections::HashMap;
use tracing::debug;

/// An element waiting to be placed in a user's queue.
#[derive(Debug, Clone)]
pub(crate) struct IndexedElement<T> {
    pub element: T,
    pub index: Option<usize>,
    pub pinned: bool,
}

impl<T> IndexedElement<T> {
    pub fn new(element: T, index: Option<usize>, pinned: bool) -> Self {
        Self {
            element,
            index,
            pinned,
        }
    }

    fn goes_before(&self, other: &IndexedElement<T>) -> bool {
        if self.pinned != other.pinned {
            return self.pinned;
        }
        match (self.index, other.index) {
            (Some(mine), Some(theirs)) => mine < theirs,
            (Some(_), None) => true,
            _ => false,
        }
    }
}

/// Inserts keeping pinned elements first, then ascending index, unindexed
/// elements last. Ties keep insertion order.
pub(crate) fn add_in_order<T>(elements: &mut Vec<IndexedElement<T>>, element: IndexedElement<T>) {
    let position = elements
        .iter()
        .position(|existing| element.goes_before(existing))
        .unwrap_or(elements.len());
    elements.insert(position, element);
}

/// Builds a fresh [`Solution`] for a cold start.
///
/// - the planning user and the dummy task are always present;
/// - `Ready` tasks are left unassigned;
/// - active tasks with an owner are queued on that owner, synthesizing users
///   the directory does not know;
/// - `InProgress` and `Suspended` tasks are pinned, `Reserved` ones only when
///   the stored plan is absent or was published.
///
/// Each task's modification time is recorded in the context so the first
/// incremental poll does not replay it.
pub struct SolutionBuilder<'a> {
    tasks: &'a [ExternalTaskUpdate],
    users: &'a [ExternalUser],
    context: &'a SyncContext,
}

impl<'a> SolutionBuilder<'a> {
    pub fn new(context: &'a SyncContext) -> Self {
        Self {
            tasks: &[],
            users: &[],
            context,
        }
    }

    pub fn with_tasks(mut self, tasks: &'a [ExternalTaskUpdate]) -> Self {
        self.tasks = tasks;
        self
    }

    pub fn with_users(mut self, users: &'a [ExternalUser]) -> Self {
        self.users = users;
        self
    }

    pub fn build(self) -> Solution {
        let mut users: Vec<User> = vec![User::planning_user()];
        for external in self.users {
            if !users.iter().any(|u| u.id == external.id) {
                let mut user = User::new(external.id.clone());
                user.enabled = external.active;
                users.push(user);
            }
        }

        let mut tasks = vec![Task::dummy()];
        let mut queues: HashMap<UserId, Vec<IndexedElement<TaskId>>> = HashMap::new();

        for update in self.tasks {
            self.context
                .set_task_change_time(update.task_id, update.last_modification);

            match (update.status, &update.actual_owner) {
                (TaskStatus::Ready, _) => tasks.push(update.to_task()),
                (status, Some(owner)) if status.is_active() => {
                    let pinned = match status {
                        TaskStatus::InProgress | TaskStatus::Suspended => true,
                        _ => update.is_plan_published(),
                    };
                    let index = update.planning_task.as_ref().and_then(|p| p.index);

                    let mut task = update.to_task();
                    task.user = Some(owner.clone());
                    task.pinned = pinned;
                    tasks.push(task);

                    if !users.iter().any(|u| &u.id == owner) {
                        debug!(user = %owner, "Synthesizing user missing from the directory");
                        users.push(User::new(owner.clone()));
                    }
                    add_in_order(
                        queues.entry(owner.clone()).or_default(),
                        IndexedElement::new(update.task_id, index, pinned),
                    );
                }
                (status, _) => {
                    debug!(task_id = %update.task_id, %status, "Skipping task on cold start");
                }
            }
        }

        for user in &mut users {
            if let Some(queue) = queues.remove(&user.id) {
                user.task_ids = queue.into_iter().map(|e| e.element).collect();
            }
        }

        let mut solution = Solution::new(tasks, users);
        solution.change_set_id = self.context.current_change_set_id();
        solution
    }
}
