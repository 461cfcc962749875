//! Credential store.
//!
//! Persists users, OAuth2 clients, authorization codes and issued tokens.
//! Components never hold authoritative copies of these rows; every decision
//! re-reads through this trait.
//!
//! Two adapters are provided:
//! - [`DatabaseStore`] backed by SeaORM (Postgres or SQLite)
//! - [`MemoryStore`] backed by `DashMap`, for tests and local experiments

mod database;
mod memory;

pub use database::DatabaseStore;
pub use memory::MemoryStore;

use crate::entity::{oauth_authorization, oauth_client, oauth_token, user};
use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Unique constraint violated: {0}")]
    Conflict(String),
    #[error("Database error: {0}")]
    Database(String),
}

impl From<sea_orm::DbErr> for StoreError {
    fn from(e: sea_orm::DbErr) -> Self {
        match e.sql_err() {
            Some(sea_orm::SqlErr::UniqueConstraintViolation(detail)) => {
                StoreError::Conflict(detail)
            }
            _ => StoreError::Database(e.to_string()),
        }
    }
}

/// Fields needed to create a user. The password must already be hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub role: String,
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_user(&self, id: i32) -> Result<Option<user::Model>, StoreError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<user::Model>, StoreError>;

    /// Fails with [`StoreError::Conflict`] when the email is taken.
    async fn create_user(&self, new_user: NewUser) -> Result<user::Model, StoreError>;

    /// Returns false when the user does not exist.
    async fn update_user_role(&self, id: i32, role: &str) -> Result<bool, StoreError>;

    /// Soft-deleted clients are never returned.
    async fn find_client(&self, id: &str) -> Result<Option<oauth_client::Model>, StoreError>;

    async fn create_client(
        &self,
        client: oauth_client::Model,
    ) -> Result<oauth_client::Model, StoreError>;

    async fn list_clients(&self, owner_id: i32) -> Result<Vec<oauth_client::Model>, StoreError>;

    /// Marks the client deleted if it exists and belongs to `owner_id`.
    async fn soft_delete_client(&self, id: &str, owner_id: i32) -> Result<bool, StoreError>;

    async fn insert_authorization_code(
        &self,
        code: oauth_authorization::Model,
    ) -> Result<(), StoreError>;

    async fn find_authorization_code(
        &self,
        code: &str,
    ) -> Result<Option<oauth_authorization::Model>, StoreError>;

    /// Deletes the code. Returns true only for the single caller whose delete
    /// removed the row; concurrent callers observe false.
    async fn consume_authorization_code(&self, code: &str) -> Result<bool, StoreError>;

    /// Removes codes that expired before `now`. Returns the number removed.
    async fn delete_expired_authorization_codes(
        &self,
        now: OffsetDateTime,
    ) -> Result<u64, StoreError>;

    async fn insert_token(&self, token: oauth_token::Model) -> Result<(), StoreError>;

    /// Looks a token up by its access token or refresh token string.
    async fn find_token(&self, token: &str) -> Result<Option<oauth_token::Model>, StoreError>;

    async fn revoke_token(&self, id: &str, at: OffsetDateTime) -> Result<(), StoreError>;
}
