//! Persistence collaborator for users and single-use tokens
//!
//! The service talks to storage through the [`AuthStore`] trait: record CRUD
//! by key plus the two consume operations that must delete a token and apply
//! its state transition atomically. [`PgStore`] is the production
//! implementation; an in-memory store backs the unit tests.

pub mod postgres;

#[cfg(test)]
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    NewPasswordResetToken, NewUser, NewVerificationToken, PasswordResetToken, User,
    VerificationToken,
};

pub use postgres::PgStore;

/// Custom error type for store operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// The requested record does not exist (or was deleted concurrently)
    #[error("Record not found")]
    NotFound,

    /// A record with the same unique key already exists
    #[error("Record already exists")]
    AlreadyExists,

    /// Underlying database failure
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Type alias for store results
pub type StoreResult<T> = Result<T, StoreError>;

/// Storage operations required by the authentication service
///
/// Both `consume_*` operations run as a single transaction: the token delete
/// and the state change either land together or not at all. The loser of a
/// concurrent redemption race observes the already-deleted token and gets
/// [`StoreError::NotFound`].
#[async_trait]
pub trait AuthStore: Send + Sync {
    // Users

    async fn create_user(&self, new_user: NewUser) -> StoreResult<User>;

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    async fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>>;

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> StoreResult<()>;

    // Verification tokens

    async fn find_verification_token_by_email(
        &self,
        email: &str,
    ) -> StoreResult<Option<VerificationToken>>;

    async fn find_verification_token_by_prefix(
        &self,
        prefix: &str,
    ) -> StoreResult<Option<VerificationToken>>;

    async fn create_verification_token(
        &self,
        token: NewVerificationToken,
    ) -> StoreResult<VerificationToken>;

    async fn delete_verification_token(&self, id: Uuid) -> StoreResult<()>;

    /// Delete the token and mark the user's email verified, atomically
    async fn consume_verification_token(
        &self,
        token_id: Uuid,
        user_id: Uuid,
        email: &str,
        verified_at: DateTime<Utc>,
    ) -> StoreResult<()>;

    // Password-reset tokens

    async fn find_reset_token_by_user(
        &self,
        user_id: Uuid,
    ) -> StoreResult<Option<PasswordResetToken>>;

    async fn find_reset_token_by_prefix(
        &self,
        prefix: &str,
    ) -> StoreResult<Option<PasswordResetToken>>;

    async fn create_reset_token(
        &self,
        token: NewPasswordResetToken,
    ) -> StoreResult<PasswordResetToken>;

    async fn delete_reset_token(&self, id: Uuid) -> StoreResult<()>;

    /// Delete the token and update the user's password hash, atomically
    async fn consume_reset_token(
        &self,
        token_id: Uuid,
        user_id: Uuid,
        new_password_hash: &str,
    ) -> StoreResult<()>;
}
