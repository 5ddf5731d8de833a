//! The optimizer's working model.

use crate::change::ChangeCommand;
use crate::error::{ModelError, Result};
use crate::models::{Score, Task, TaskId, User, UserId};
use serde::{Deserialize, Serialize};

/// Tasks, users and the score of the last evaluation.
///
/// A running solver owns exactly one mutable copy; everything handed out of
/// it is a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Solution {
    pub tasks: Vec<Task>,
    pub users: Vec<User>,
    pub score: Score,
    /// Id of the last change set applied to this model
    pub change_set_id: u64,
}

impl Solution {
    pub fn new(tasks: Vec<Task>, users: Vec<User>) -> Self {
        Self {
            tasks,
            users,
            score: Score::default(),
            change_set_id: 0,
        }
    }

    pub fn with_score(mut self, score: Score) -> Self {
        self.score = score;
        self
    }

    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn contains_task(&self, id: TaskId) -> bool {
        self.task(id).is_some()
    }

    pub fn user(&self, id: &UserId) -> Option<&User> {
        self.users.iter().find(|u| &u.id == id)
    }

    /// Queue position of a task within its user's queue.
    pub fn position_of(&self, id: TaskId) -> Option<usize> {
        let user_id = self.task(id)?.user.as_ref()?;
        self.user(user_id)?.task_ids.iter().position(|t| *t == id)
    }

    /// Tasks of a user in queue order.
    pub fn user_tasks<'a>(&'a self, user: &'a User) -> impl Iterator<Item = &'a Task> + 'a {
        user.task_ids.iter().filter_map(move |id| self.task(*id))
    }

    pub fn apply_all<'a>(
        &mut self,
        commands: impl IntoIterator<Item = &'a ChangeCommand>,
    ) -> Result<()> {
        for command in commands {
            self.apply(command)?;
        }
        Ok(())
    }

    /// Applies one change command to the model.
    pub fn apply(&mut self, command: &ChangeCommand) -> Result<()> {
        match command {
            ChangeCommand::ChangeSetMarker { change_set_id } => {
                self.change_set_id = *change_set_id;
            }
            ChangeCommand::Add { task } => {
                if !self.contains_task(task.id) {
                    let mut task = task.clone();
                    task.user = None;
                    task.pinned = false;
                    self.tasks.push(task);
                }
            }
            ChangeCommand::AddUser { user } => {
                if self.user(&user.id).is_none() {
                    self.users.push(User {
                        task_ids: Vec::new(),
                        ..user.clone()
                    });
                }
            }
            ChangeCommand::Remove { task } => {
                if !self.contains_task(task.id) {
                    return Err(ModelError::TaskNotFound(task.id));
                }
                self.detach(task.id);
                self.tasks.retain(|t| t.id != task.id);
            }
            ChangeCommand::Release { task } => {
                self.detach(task.id);
                let existing = self
                    .task_mut(task.id)
                    .ok_or(ModelError::TaskNotFound(task.id))?;
                existing.user = None;
                existing.pinned = false;
            }
            ChangeCommand::PropertyChange {
                task,
                priority,
                status,
            } => {
                let existing = self
                    .task_mut(task.id)
                    .ok_or(ModelError::TaskNotFound(task.id))?;
                if let Some(priority) = priority {
                    existing.priority = *priority;
                }
                if let Some(status) = status {
                    existing.status = *status;
                }
            }
            ChangeCommand::Assign {
                task,
                user,
                publish,
                index,
            } => self.assign(task, user, *publish, *index),
        }
        Ok(())
    }

    fn assign(&mut self, task: &Task, user: &User, publish: bool, index: Option<usize>) {
        if self.user(&user.id).is_none() {
            self.users.push(User {
                task_ids: Vec::new(),
                ..user.clone()
            });
        }
        self.detach(task.id);

        match self.task_mut(task.id) {
            Some(existing) => {
                existing.user = Some(user.id.clone());
                existing.pinned = publish;
            }
            None => {
                let mut task = task.clone();
                task.user = Some(user.id.clone());
                task.pinned = publish;
                self.tasks.push(task);
            }
        }

        let pinned_len = self.pinned_prefix_len(&user.id);
        let Some(queue) = self.users.iter_mut().find(|u| u.id == user.id) else {
            return;
        };
        // Pinned work never jumps ahead of work that is already pinned.
        let position = if publish {
            index.map_or(pinned_len, |i| i.min(pinned_len))
        } else {
            queue.task_ids.len()
        };
        queue.task_ids.insert(position, task.id);
    }

    fn pinned_prefix_len(&self, user_id: &UserId) -> usize {
        self.user(user_id).map_or(0, |user| {
            user.task_ids
                .iter()
                .take_while(|id| self.task(**id).is_some_and(|t| t.pinned))
                .count()
        })
    }

    fn detach(&mut self, task_id: TaskId) {
        for user in &mut self.users {
            user.task_ids.retain(|id| *id != task_id);
        }
    }

    fn task_mut(&mut self, id: TaskId) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }
}
