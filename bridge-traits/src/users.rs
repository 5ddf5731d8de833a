//! External user directory.

use crate::error::Result;
use async_trait::async_trait;
use core_model::{ExternalUser, UserId};

#[async_trait]
pub trait UserSystem: Send + Sync {
    /// Every user known to the directory.
    async fn find_all_users(&self) -> Result<Vec<ExternalUser>>;

    /// Looks up one user; `Ok(None)` when the directory has no such user.
    async fn find_user(&self, id: &UserId) -> Result<Option<ExternalUser>>;
}
