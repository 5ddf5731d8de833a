//! # Change Set Builder
//!
//! Diffs a solution snapshot against a batch of external task updates and
//! produces the ordered change set for the solver.
//!
//! ## Output order
//!
//! 1. change set marker (only when anything else is emitted)
//! 2. removes
//! 3. releases
//! 4. assigns, grouped per user and ordered by requested index
//! 5. property changes
//! 6. adds
//! 7. new users from a directory refresh
//!
//! Removals and releases free capacity before the solver considers the new
//! assignments. New tasks come after every assignment so their insertion
//! does not shift indices used by pinned work.

use crate::context::SyncContext;
use crate::solution_builder::{add_in_order, IndexedElement};
use core_model::{
    ChangeCommand, ExternalTaskUpdate, ExternalUser, Solution, Task, TaskId, TaskStatus, User,
    UserId, DUMMY_TASK_PLANNER_241_ID,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, trace};

pub struct ChangeSetBuilder<'a> {
    solution: &'a Solution,
    context: &'a SyncContext,
    updates: &'a [ExternalTaskUpdate],
    users: &'a [ExternalUser],
    users_update: Option<&'a [ExternalUser]>,
}

impl<'a> ChangeSetBuilder<'a> {
    pub fn new(solution: &'a Solution, context: &'a SyncContext) -> Self {
        Self {
            solution,
            context,
            updates: &[],
            users: &[],
            users_update: None,
        }
    }

    pub fn with_updates(mut self, updates: &'a [ExternalTaskUpdate]) -> Self {
        self.updates = updates;
        self
    }

    /// Directory consulted for owners missing from the solution.
    pub fn with_users(mut self, users: &'a [ExternalUser]) -> Self {
        self.users = users;
        self
    }

    /// A freshly pulled directory. It takes precedence for lookups, and its
    /// users missing from the solution are added.
    pub fn with_users_update(mut self, users: &'a [ExternalUser]) -> Self {
        self.users_update = Some(users);
        self
    }

    pub fn build(self) -> Vec<ChangeCommand> {
        let mut task_by_id: HashMap<TaskId, &Task> = self
            .solution
            .tasks
            .iter()
            .filter(|task| !task.is_dummy())
            .map(|task| (task.id, task))
            .collect();

        let mut removed: Vec<&Task> = Vec::new();
        let mut removed_ids: HashSet<TaskId> = HashSet::new();
        let mut releases = Vec::new();
        let mut property_changes = Vec::new();
        let mut adds = Vec::new();
        let mut assigns: BTreeMap<UserId, Vec<IndexedElement<ChangeCommand>>> = BTreeMap::new();

        for update in self.updates {
            if self
                .context
                .is_processed_task_change(update.task_id, update.last_modification)
            {
                trace!(task_id = %update.task_id, "Skipping already processed task change");
                continue;
            }
            self.context
                .set_task_change_time(update.task_id, update.last_modification);

            let Some(task) = task_by_id.remove(&update.task_id) else {
                match (update.status, &update.actual_owner) {
                    (TaskStatus::Ready, _) => adds.push(ChangeCommand::Add {
                        task: update.to_task(),
                    }),
                    // Created and taken entirely outside the planner
                    (status, Some(owner)) if status.is_active() => {
                        let user = self.lookup_user(owner);
                        self.push_assign(&mut assigns, update.to_task(), user, None);
                    }
                    _ => {}
                }
                continue;
            };

            match update.status {
                TaskStatus::Ready => {
                    if task.status != TaskStatus::Ready {
                        releases.push(ChangeCommand::Release { task: task.clone() });
                    }
                }
                status if status.is_active() => match &update.actual_owner {
                    None => {
                        if task.user.is_some() {
                            removed_ids.insert(task.id);
                            removed.push(task);
                        }
                    }
                    // Reassigned externally, which must be honored
                    Some(owner) if task.user.as_ref() != Some(owner) => {
                        let user = self.lookup_user(owner);
                        self.push_assign(&mut assigns, task.clone(), user, None);
                    }
                    // Published by an earlier plan but not yet pinned here
                    Some(owner) if update.is_plan_published() && !task.pinned => {
                        let user = self.lookup_user(owner);
                        let index = update.planning_task.as_ref().and_then(|p| p.index);
                        self.push_assign(&mut assigns, task.clone(), user, index);
                    }
                    Some(_) => {}
                },
                _ => {
                    if removed_ids.insert(task.id) {
                        removed.push(task);
                    }
                }
            }

            if !removed_ids.contains(&task.id)
                && (update.priority != task.priority || update.status != task.status)
            {
                property_changes.push(ChangeCommand::PropertyChange {
                    task: task.clone(),
                    priority: (update.priority != task.priority).then_some(update.priority),
                    status: (update.status != task.status).then_some(update.status),
                });
            }
        }

        let mut changes: Vec<ChangeCommand> = removed
            .into_iter()
            .map(|task| ChangeCommand::Remove { task: task.clone() })
            .collect();
        changes.extend(releases);
        changes.extend(
            assigns
                .into_values()
                .flat_map(|queue| queue.into_iter().map(|e| e.element)),
        );

        if !self.solution.contains_task(DUMMY_TASK_PLANNER_241_ID) {
            changes.push(ChangeCommand::Assign {
                task: Task::dummy_planner_241(),
                user: User::planning_user(),
                publish: false,
                index: None,
            });
        }

        changes.extend(property_changes);
        changes.extend(adds);
        changes.extend(self.new_users());

        if changes.is_empty() {
            trace!("No changes calculated");
            return changes;
        }

        let change_set_id = self.context.next_change_set_id();
        debug!(change_set_id, changes = changes.len(), "Built change set");
        changes.insert(0, ChangeCommand::ChangeSetMarker { change_set_id });
        changes
    }

    fn push_assign(
        &self,
        assigns: &mut BTreeMap<UserId, Vec<IndexedElement<ChangeCommand>>>,
        task: Task,
        user: User,
        index: Option<usize>,
    ) {
        let user_id = user.id.clone();
        let command = ChangeCommand::Assign {
            task,
            user,
            publish: true,
            index,
        };
        add_in_order(
            assigns.entry(user_id).or_default(),
            IndexedElement::new(command, index, true),
        );
    }

    /// Solution first, then the directories, else a synthesized user since
    /// tasks can be delegated to users the directory does not know.
    fn lookup_user(&self, id: &UserId) -> User {
        if let Some(user) = self.solution.user(id) {
            return user.clone();
        }
        let known = self
            .users_update
            .unwrap_or_default()
            .iter()
            .chain(self.users)
            .find(|u| &u.id == id);
        match known {
            Some(external) => {
                let mut user = User::new(external.id.clone());
                user.enabled = external.active;
                user
            }
            None => {
                debug!(user = %id, "User unknown to the directory, assuming a manual delegation");
                User::new(id.clone())
            }
        }
    }

    fn new_users(&self) -> Vec<ChangeCommand> {
        let Some(users) = self.users_update else {
            return Vec::new();
        };
        let mut seen = HashSet::new();
        users
            .iter()
            .filter(|u| self.solution.user(&u.id).is_none() && seen.insert(u.id.clone()))
            .map(|external| {
                let mut user = User::new(external.id.clone());
                user.enabled = external.active;
                ChangeCommand::AddUser { user }
            })
            .collect()
    }
}
