use crate::models::{TaskId, UserId};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("Unknown task status: {0}")]
    UnknownStatus(String),

    #[error("Task not found in solution: {0}")]
    TaskNotFound(TaskId),

    #[error("User not found in solution: {0}")]
    UserNotFound(UserId),
}

pub type Result<T> = std::result::Result<T, ModelError>;
