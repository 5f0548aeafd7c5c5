//! PostgreSQL implementation of the auth store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use super::{AuthStore, StoreError, StoreResult};
use crate::models::{
    NewPasswordResetToken, NewUser, NewVerificationToken, PasswordResetToken, User,
    VerificationToken,
};

/// PostgreSQL-backed auth store
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new store over an existing connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn map_insert_error(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e {
        if db_err.is_unique_violation() {
            return StoreError::AlreadyExists;
        }
    }
    StoreError::Database(e)
}

#[async_trait]
impl AuthStore for PgStore {
    async fn create_user(&self, new_user: NewUser) -> StoreResult<User> {
        info!("Creating new user: {}", new_user.email);

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (name, email, password_hash)
            VALUES ($1, $2, $3)
            RETURNING id, name, email, password_hash, image, email_verified, created_at, updated_at
            "#,
        )
        .bind(&new_user.name)
        .bind(&new_user.email)
        .bind(&new_user.password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(map_insert_error)?;

        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, password_hash, image, email_verified, created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, password_hash, image, email_verified, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(password_hash)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        Ok(())
    }

    async fn find_verification_token_by_email(
        &self,
        email: &str,
    ) -> StoreResult<Option<VerificationToken>> {
        let token = sqlx::query_as::<_, VerificationToken>(
            r#"
            SELECT id, email, token_hash, prefix, expires_at, last_sent_at
            FROM verification_tokens
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(token)
    }

    async fn find_verification_token_by_prefix(
        &self,
        prefix: &str,
    ) -> StoreResult<Option<VerificationToken>> {
        let token = sqlx::query_as::<_, VerificationToken>(
            r#"
            SELECT id, email, token_hash, prefix, expires_at, last_sent_at
            FROM verification_tokens
            WHERE prefix = $1
            LIMIT 1
            "#,
        )
        .bind(prefix)
        .fetch_optional(&self.pool)
        .await?;

        Ok(token)
    }

    async fn create_verification_token(
        &self,
        token: NewVerificationToken,
    ) -> StoreResult<VerificationToken> {
        let token = sqlx::query_as::<_, VerificationToken>(
            r#"
            INSERT INTO verification_tokens (email, token_hash, prefix, expires_at, last_sent_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, email, token_hash, prefix, expires_at, last_sent_at
            "#,
        )
        .bind(&token.email)
        .bind(&token.token_hash)
        .bind(&token.prefix)
        .bind(token.expires_at)
        .bind(token.last_sent_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_insert_error)?;

        Ok(token)
    }

    async fn delete_verification_token(&self, id: Uuid) -> StoreResult<()> {
        sqlx::query("DELETE FROM verification_tokens WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn consume_verification_token(
        &self,
        token_id: Uuid,
        user_id: Uuid,
        email: &str,
        verified_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        // Delete first: losing a concurrent redemption race shows up here as
        // zero affected rows, before any state change is applied.
        let deleted = sqlx::query("DELETE FROM verification_tokens WHERE id = $1")
            .bind(token_id)
            .execute(&mut *tx)
            .await?;

        if deleted.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        let updated = sqlx::query(
            r#"
            UPDATE users
            SET email_verified = $2, email = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(verified_at)
        .bind(email)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_reset_token_by_user(
        &self,
        user_id: Uuid,
    ) -> StoreResult<Option<PasswordResetToken>> {
        let token = sqlx::query_as::<_, PasswordResetToken>(
            r#"
            SELECT id, user_id, token_hash, prefix, expires_at, created_at
            FROM password_reset_tokens
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(token)
    }

    async fn find_reset_token_by_prefix(
        &self,
        prefix: &str,
    ) -> StoreResult<Option<PasswordResetToken>> {
        let token = sqlx::query_as::<_, PasswordResetToken>(
            r#"
            SELECT id, user_id, token_hash, prefix, expires_at, created_at
            FROM password_reset_tokens
            WHERE prefix = $1
            LIMIT 1
            "#,
        )
        .bind(prefix)
        .fetch_optional(&self.pool)
        .await?;

        Ok(token)
    }

    async fn create_reset_token(
        &self,
        token: NewPasswordResetToken,
    ) -> StoreResult<PasswordResetToken> {
        let token = sqlx::query_as::<_, PasswordResetToken>(
            r#"
            INSERT INTO password_reset_tokens (user_id, token_hash, prefix, expires_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, token_hash, prefix, expires_at, created_at
            "#,
        )
        .bind(token.user_id)
        .bind(&token.token_hash)
        .bind(&token.prefix)
        .bind(token.expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_insert_error)?;

        Ok(token)
    }

    async fn delete_reset_token(&self, id: Uuid) -> StoreResult<()> {
        sqlx::query("DELETE FROM password_reset_tokens WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn consume_reset_token(
        &self,
        token_id: Uuid,
        user_id: Uuid,
        new_password_hash: &str,
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM password_reset_tokens WHERE id = $1")
            .bind(token_id)
            .execute(&mut *tx)
            .await?;

        if deleted.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        let updated = sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(new_password_hash)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        tx.commit().await?;
        Ok(())
    }
}
