use std::future::Future;

use time::OffsetDateTime;
use uuid::Uuid;

use crate::core::db::UserDb;

#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub created_at: OffsetDateTime,
    pub(super) _guard: (),
}

pub trait UserRepository {
    fn add_user(&self, username: &str) -> impl Future<Output = anyhow::Result<UserDb>> + Send;
    fn get_users(&self) -> impl Future<Output = anyhow::Result<Vec<User>>> + Send;
    fn get_user_by_name(
        &self,
        username: &str,
    ) -> impl Future<Output = anyhow::Result<Option<User>>> + Send;
    /// Bind a repository to an existing user; fails with `NotFound` otherwise.
    fn get_user_repo(&self, id: Uuid) -> impl Future<Output = anyhow::Result<UserDb>> + Send;
}
