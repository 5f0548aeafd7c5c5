//! In-memory auth store used as a test double
//!
//! Every operation takes the single mutex, so the consume operations get the
//! same all-or-nothing behavior a database transaction provides: a concurrent
//! redemption race has exactly one winner.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use super::{AuthStore, StoreError, StoreResult};
use crate::models::{
    NewPasswordResetToken, NewUser, NewVerificationToken, PasswordResetToken, User,
    VerificationToken,
};

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, User>,
    verification_tokens: HashMap<Uuid, VerificationToken>,
    reset_tokens: HashMap<Uuid, PasswordResetToken>,
}

/// Mutex-guarded in-memory store
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live verification tokens, for asserting single-token invariants
    pub fn verification_token_count(&self) -> usize {
        self.inner.lock().unwrap().verification_tokens.len()
    }

    /// Number of live reset tokens, for asserting single-token invariants
    pub fn reset_token_count(&self) -> usize {
        self.inner.lock().unwrap().reset_tokens.len()
    }
}

#[async_trait]
impl AuthStore for MemoryStore {
    async fn create_user(&self, new_user: NewUser) -> StoreResult<User> {
        let mut inner = self.inner.lock().unwrap();

        if inner.users.values().any(|u| u.email == new_user.email) {
            return Err(StoreError::AlreadyExists);
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            name: new_user.name,
            email: new_user.email,
            password_hash: Some(new_user.password_hash),
            image: None,
            email_verified: None,
            created_at: now,
            updated_at: now,
        };
        inner.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.users.get(&id).cloned())
    }

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let user = inner.users.get_mut(&user_id).ok_or(StoreError::NotFound)?;
        user.password_hash = Some(password_hash.to_string());
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn find_verification_token_by_email(
        &self,
        email: &str,
    ) -> StoreResult<Option<VerificationToken>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .verification_tokens
            .values()
            .find(|t| t.email == email)
            .cloned())
    }

    async fn find_verification_token_by_prefix(
        &self,
        prefix: &str,
    ) -> StoreResult<Option<VerificationToken>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .verification_tokens
            .values()
            .find(|t| t.prefix == prefix)
            .cloned())
    }

    async fn create_verification_token(
        &self,
        token: NewVerificationToken,
    ) -> StoreResult<VerificationToken> {
        let mut inner = self.inner.lock().unwrap();
        let token = VerificationToken {
            id: Uuid::new_v4(),
            email: token.email,
            token_hash: token.token_hash,
            prefix: token.prefix,
            expires_at: token.expires_at,
            last_sent_at: token.last_sent_at,
        };
        inner.verification_tokens.insert(token.id, token.clone());
        Ok(token)
    }

    async fn delete_verification_token(&self, id: Uuid) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.verification_tokens.remove(&id);
        Ok(())
    }

    async fn consume_verification_token(
        &self,
        token_id: Uuid,
        user_id: Uuid,
        email: &str,
        verified_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();

        // Same shape as the SQL transaction: the delete decides the race.
        if inner.verification_tokens.remove(&token_id).is_none() {
            return Err(StoreError::NotFound);
        }

        let user = inner.users.get_mut(&user_id).ok_or(StoreError::NotFound)?;
        user.email_verified = Some(verified_at);
        user.email = email.to_string();
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn find_reset_token_by_user(
        &self,
        user_id: Uuid,
    ) -> StoreResult<Option<PasswordResetToken>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .reset_tokens
            .values()
            .find(|t| t.user_id == user_id)
            .cloned())
    }

    async fn find_reset_token_by_prefix(
        &self,
        prefix: &str,
    ) -> StoreResult<Option<PasswordResetToken>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .reset_tokens
            .values()
            .find(|t| t.prefix == prefix)
            .cloned())
    }

    async fn create_reset_token(
        &self,
        token: NewPasswordResetToken,
    ) -> StoreResult<PasswordResetToken> {
        let mut inner = self.inner.lock().unwrap();
        let token = PasswordResetToken {
            id: Uuid::new_v4(),
            user_id: token.user_id,
            token_hash: token.token_hash,
            prefix: token.prefix,
            expires_at: token.expires_at,
            created_at: Utc::now(),
        };
        inner.reset_tokens.insert(token.id, token.clone());
        Ok(token)
    }

    async fn delete_reset_token(&self, id: Uuid) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.reset_tokens.remove(&id);
        Ok(())
    }

    async fn consume_reset_token(
        &self,
        token_id: Uuid,
        user_id: Uuid,
        new_password_hash: &str,
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();

        if inner.reset_tokens.remove(&token_id).is_none() {
            return Err(StoreError::NotFound);
        }

        let user = inner.users.get_mut(&user_id).ok_or(StoreError::NotFound)?;
        user.password_hash = Some(new_password_hash.to_string());
        user.updated_at = Utc::now();
        Ok(())
    }
}
