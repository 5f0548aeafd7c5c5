//! Verification token manager
//!
//! Issues, cools down, and redeems the single-use tokens behind email
//! verification and password reset. Only a salted hash and a short lookup
//! prefix are persisted; the raw secret goes out by email and is gone. Each
//! token redeems at most once: the consuming state transition and the token
//! delete share one store transaction.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{error, info};

use crate::crypto;
use crate::error::{AuthError, AuthResult};
use crate::models::{NewPasswordResetToken, NewVerificationToken, User};
use crate::store::{AuthStore, StoreError};

/// Token lifecycle configuration
#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// Minimum interval between verification emails for one address (default: 5 minutes)
    pub verification_cooldown_secs: u64,
    /// Verification token time-to-live (default: 1 hour)
    pub verification_ttl_secs: u64,
    /// Minimum interval between password-reset emails for one user (default: 1 hour)
    pub reset_cooldown_secs: u64,
    /// Password-reset token time-to-live (default: 1 hour)
    pub reset_ttl_secs: u64,
}

impl TokenConfig {
    /// Create a new TokenConfig from environment variables
    ///
    /// # Environment Variables
    /// - `VERIFICATION_TOKEN_COOLDOWN`: seconds between verification emails (default: 300)
    /// - `VERIFICATION_TOKEN_TTL`: verification token TTL in seconds (default: 3600)
    /// - `RESET_TOKEN_COOLDOWN`: seconds between reset emails (default: 3600)
    /// - `RESET_TOKEN_TTL`: reset token TTL in seconds (default: 3600)
    pub fn from_env() -> Self {
        let read = |name: &str, default: u64| {
            std::env::var(name)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default)
        };

        TokenConfig {
            verification_cooldown_secs: read("VERIFICATION_TOKEN_COOLDOWN", 300),
            verification_ttl_secs: read("VERIFICATION_TOKEN_TTL", 3600),
            reset_cooldown_secs: read("RESET_TOKEN_COOLDOWN", 3600),
            reset_ttl_secs: read("RESET_TOKEN_TTL", 3600),
        }
    }
}

impl Default for TokenConfig {
    fn default() -> Self {
        TokenConfig {
            verification_cooldown_secs: 300,
            verification_ttl_secs: 3600,
            reset_cooldown_secs: 3600,
            reset_ttl_secs: 3600,
        }
    }
}

/// Seconds left in a cooldown window, or `None` once it has elapsed
fn remaining_cooldown(
    last_event: DateTime<Utc>,
    now: DateTime<Utc>,
    window_secs: u64,
) -> Option<u64> {
    let elapsed = (now - last_event).num_seconds().max(0) as u64;
    if elapsed < window_secs {
        Some(window_secs - elapsed)
    } else {
        None
    }
}

/// Manager for single-use, time-limited tokens
#[derive(Clone)]
pub struct VerificationTokenManager {
    store: Arc<dyn AuthStore>,
    config: TokenConfig,
}

impl VerificationTokenManager {
    /// Create a new token manager
    pub fn new(store: Arc<dyn AuthStore>, config: TokenConfig) -> Self {
        Self { store, config }
    }

    /// Issue a fresh email-verification token, superseding any live one
    ///
    /// Fails with `CooldownActive` while the previous token's send window is
    /// still open. Returns the raw secret for out-of-band delivery; only its
    /// hash and lookup prefix are persisted.
    pub async fn issue_email_verification(&self, email: &str) -> AuthResult<String> {
        let now = Utc::now();

        if let Some(existing) = self.store.find_verification_token_by_email(email).await? {
            if let Some(remaining) = remaining_cooldown(
                existing.last_sent_at,
                now,
                self.config.verification_cooldown_secs,
            ) {
                return Err(AuthError::CooldownActive(remaining));
            }

            self.store.delete_verification_token(existing.id).await?;
        }

        let raw = crypto::generate_token();
        let token_hash = crypto::hash_secret(&raw).map_err(|e| {
            error!("Failed to hash verification token: {}", e);
            AuthError::Internal
        })?;

        self.store
            .create_verification_token(NewVerificationToken {
                email: email.to_string(),
                token_hash,
                prefix: crypto::token_prefix(&raw).to_string(),
                expires_at: now + Duration::seconds(self.config.verification_ttl_secs as i64),
                last_sent_at: now,
            })
            .await?;

        info!("Issued verification token for {}", email);
        Ok(raw)
    }

    /// Remaining verification-resend cooldown for an email, in seconds
    pub async fn verification_cooldown_status(&self, email: &str) -> AuthResult<u64> {
        let existing = self.store.find_verification_token_by_email(email).await?;

        Ok(existing
            .and_then(|token| {
                remaining_cooldown(
                    token.last_sent_at,
                    Utc::now(),
                    self.config.verification_cooldown_secs,
                )
            })
            .unwrap_or(0))
    }

    /// Redeem an email-verification token
    ///
    /// On success the owning user's email is marked verified and the token is
    /// deleted, in one transaction; the second of two concurrent redemptions
    /// observes the deleted token and fails like any other invalid attempt.
    pub async fn redeem_email_verification(&self, raw_token: &str) -> AuthResult<User> {
        let now = Utc::now();

        let token = self
            .store
            .find_verification_token_by_prefix(crypto::token_prefix(raw_token))
            .await?
            .ok_or(AuthError::InvalidOrExpiredToken)?;

        if token.expires_at <= now {
            return Err(AuthError::InvalidOrExpiredToken);
        }

        // The prefix only narrowed the candidate set; the full secret decides.
        let matches = crypto::verify_secret(raw_token, &token.token_hash).map_err(|e| {
            error!("Failed to verify token hash: {}", e);
            AuthError::Internal
        })?;

        if !matches {
            return Err(AuthError::InvalidOrExpiredToken);
        }

        let mut user = self
            .store
            .find_user_by_email(&token.email)
            .await?
            .ok_or(AuthError::InvalidOrExpiredToken)?;

        match self
            .store
            .consume_verification_token(token.id, user.id, &token.email, now)
            .await
        {
            Ok(()) => {}
            Err(StoreError::NotFound) => return Err(AuthError::InvalidOrExpiredToken),
            Err(e) => return Err(e.into()),
        }

        info!("Email verified for user {}", user.id);
        user.email = token.email;
        user.email_verified = Some(now);
        Ok(user)
    }

    /// Issue a fresh password-reset token for a user, superseding any live one
    pub async fn issue_password_reset(&self, user: &User) -> AuthResult<String> {
        let now = Utc::now();

        if let Some(existing) = self.store.find_reset_token_by_user(user.id).await? {
            if let Some(remaining) =
                remaining_cooldown(existing.created_at, now, self.config.reset_cooldown_secs)
            {
                return Err(AuthError::CooldownActive(remaining));
            }

            self.store.delete_reset_token(existing.id).await?;
        }

        let raw = crypto::generate_token();
        let token_hash = crypto::hash_secret(&raw).map_err(|e| {
            error!("Failed to hash reset token: {}", e);
            AuthError::Internal
        })?;

        self.store
            .create_reset_token(NewPasswordResetToken {
                user_id: user.id,
                token_hash,
                prefix: crypto::token_prefix(&raw).to_string(),
                expires_at: now + Duration::seconds(self.config.reset_ttl_secs as i64),
            })
            .await?;

        info!("Issued password-reset token for user {}", user.id);
        Ok(raw)
    }

    /// Redeem a password-reset token and rotate the password
    ///
    /// The token delete and the password update share one transaction, so a
    /// token can never be both consumed and still redeemable.
    pub async fn redeem_password_reset(
        &self,
        raw_token: &str,
        new_password: &str,
    ) -> AuthResult<User> {
        let now = Utc::now();

        let token = self
            .store
            .find_reset_token_by_prefix(crypto::token_prefix(raw_token))
            .await?
            .ok_or(AuthError::InvalidOrExpiredToken)?;

        if token.expires_at <= now {
            return Err(AuthError::InvalidOrExpiredToken);
        }

        let matches = crypto::verify_secret(raw_token, &token.token_hash).map_err(|e| {
            error!("Failed to verify token hash: {}", e);
            AuthError::Internal
        })?;

        if !matches {
            return Err(AuthError::InvalidOrExpiredToken);
        }

        let mut user = self
            .store
            .find_user_by_id(token.user_id)
            .await?
            .ok_or(AuthError::InvalidOrExpiredToken)?;

        let Some(current_hash) = user.password_hash.clone() else {
            return Err(AuthError::Validation(
                "This account does not have a password.".to_string(),
            ));
        };

        let unchanged = crypto::verify_secret(new_password, &current_hash).map_err(|e| {
            error!("Failed to verify current password hash: {}", e);
            AuthError::Internal
        })?;

        if unchanged {
            return Err(AuthError::Validation(
                "New password cannot be the same as the old password".to_string(),
            ));
        }

        let new_hash = crypto::hash_secret(new_password).map_err(|e| {
            error!("Failed to hash new password: {}", e);
            AuthError::Internal
        })?;

        match self
            .store
            .consume_reset_token(token.id, user.id, &new_hash)
            .await
        {
            Ok(()) => {}
            Err(StoreError::NotFound) => return Err(AuthError::InvalidOrExpiredToken),
            Err(e) => return Err(e.into()),
        }

        info!("Password reset completed for user {}", user.id);
        user.password_hash = Some(new_hash);
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewUser;
    use crate::store::memory::MemoryStore;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_token_config_from_env_overrides() {
        unsafe {
            std::env::set_var("VERIFICATION_TOKEN_COOLDOWN", "120");
            std::env::set_var("RESET_TOKEN_COOLDOWN", "1800");
        }

        let config = TokenConfig::from_env();
        assert_eq!(config.verification_cooldown_secs, 120);
        assert_eq!(config.reset_cooldown_secs, 1800);
        assert_eq!(config.verification_ttl_secs, 3600);
        assert_eq!(config.reset_ttl_secs, 3600);

        unsafe {
            std::env::remove_var("VERIFICATION_TOKEN_COOLDOWN");
            std::env::remove_var("RESET_TOKEN_COOLDOWN");
        }
    }

    fn manager_with_store() -> (VerificationTokenManager, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let manager = VerificationTokenManager::new(store.clone(), TokenConfig::default());
        (manager, store)
    }

    async fn seed_user(store: &MemoryStore, email: &str) -> User {
        store
            .create_user(NewUser {
                name: "Test User".to_string(),
                email: email.to_string(),
                password_hash: crypto::hash_secret("Old-pass1").unwrap(),
            })
            .await
            .unwrap()
    }

    #[test]
    fn test_remaining_cooldown_math() {
        let now = Utc::now();

        assert_eq!(remaining_cooldown(now, now, 300), Some(300));
        assert_eq!(
            remaining_cooldown(now - Duration::seconds(100), now, 300),
            Some(200)
        );
        assert_eq!(remaining_cooldown(now - Duration::seconds(300), now, 300), None);
        assert_eq!(remaining_cooldown(now - Duration::seconds(999), now, 300), None);
        // A clock that appears to run backwards still keeps the full window.
        assert_eq!(
            remaining_cooldown(now + Duration::seconds(60), now, 300),
            Some(300)
        );
    }

    #[tokio::test]
    async fn test_verification_token_redeems_exactly_once() {
        let (manager, store) = manager_with_store();
        let user = seed_user(&store, "user@example.com").await;
        assert!(user.email_verified.is_none());

        let raw = manager
            .issue_email_verification("user@example.com")
            .await
            .unwrap();

        // Stored record: hash and prefix only, expiry about an hour out.
        let stored = store
            .find_verification_token_by_email("user@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_ne!(stored.token_hash, raw);
        assert!(!stored.token_hash.contains(&raw));
        assert_eq!(stored.prefix, &raw[..crypto::PREFIX_LENGTH]);
        let ttl = (stored.expires_at - Utc::now()).num_seconds();
        assert!((3590..=3600).contains(&ttl), "unexpected ttl {}", ttl);

        let verified = manager.redeem_email_verification(&raw).await.unwrap();
        assert!(verified.email_verified.is_some());
        assert_eq!(store.verification_token_count(), 0);

        let stored_user = store.find_user_by_id(user.id).await.unwrap().unwrap();
        assert!(stored_user.email_verified.is_some());

        // The same raw value must not redeem twice.
        let second = manager.redeem_email_verification(&raw).await;
        assert!(matches!(second, Err(AuthError::InvalidOrExpiredToken)));
    }

    #[tokio::test]
    async fn test_issue_within_cooldown_fails_and_keeps_single_token() {
        let (manager, store) = manager_with_store();
        seed_user(&store, "user@example.com").await;

        manager
            .issue_email_verification("user@example.com")
            .await
            .unwrap();

        let second = manager.issue_email_verification("user@example.com").await;
        match second {
            Err(AuthError::CooldownActive(remaining)) => {
                assert!(remaining > 0 && remaining <= 300);
            }
            other => panic!("expected CooldownActive, got {:?}", other.map(|_| ())),
        }

        assert_eq!(store.verification_token_count(), 1);
    }

    #[tokio::test]
    async fn test_issue_after_cooldown_supersedes_previous_token() {
        let (manager, store) = manager_with_store();
        seed_user(&store, "user@example.com").await;

        // A token whose send window has long elapsed.
        let stale_raw = crypto::generate_token();
        store
            .create_verification_token(NewVerificationToken {
                email: "user@example.com".to_string(),
                token_hash: crypto::hash_secret(&stale_raw).unwrap(),
                prefix: crypto::token_prefix(&stale_raw).to_string(),
                expires_at: Utc::now() + Duration::seconds(3600),
                last_sent_at: Utc::now() - Duration::seconds(301),
            })
            .await
            .unwrap();

        let fresh_raw = manager
            .issue_email_verification("user@example.com")
            .await
            .unwrap();

        // Exactly one live token, and it is the new one.
        assert_eq!(store.verification_token_count(), 1);
        let superseded = manager.redeem_email_verification(&stale_raw).await;
        assert!(matches!(superseded, Err(AuthError::InvalidOrExpiredToken)));
        assert!(manager.redeem_email_verification(&fresh_raw).await.is_ok());
    }

    #[tokio::test]
    async fn test_expired_token_fails_even_with_correct_secret() {
        let (manager, store) = manager_with_store();
        seed_user(&store, "user@example.com").await;

        let raw = crypto::generate_token();
        store
            .create_verification_token(NewVerificationToken {
                email: "user@example.com".to_string(),
                token_hash: crypto::hash_secret(&raw).unwrap(),
                prefix: crypto::token_prefix(&raw).to_string(),
                expires_at: Utc::now() - Duration::seconds(1),
                last_sent_at: Utc::now() - Duration::seconds(3601),
            })
            .await
            .unwrap();

        let result = manager.redeem_email_verification(&raw).await;
        assert!(matches!(result, Err(AuthError::InvalidOrExpiredToken)));
    }

    #[tokio::test]
    async fn test_cooldown_status_counts_down_to_zero() {
        let (manager, store) = manager_with_store();
        seed_user(&store, "user@example.com").await;

        assert_eq!(
            manager
                .verification_cooldown_status("user@example.com")
                .await
                .unwrap(),
            0
        );

        manager
            .issue_email_verification("user@example.com")
            .await
            .unwrap();

        let remaining = manager
            .verification_cooldown_status("user@example.com")
            .await
            .unwrap();
        assert!(remaining > 0 && remaining <= 300);
    }

    #[tokio::test]
    async fn test_second_reset_request_within_window_hits_cooldown() {
        let (manager, store) = manager_with_store();
        let user = seed_user(&store, "user@example.com").await;

        manager.issue_password_reset(&user).await.unwrap();

        let second = manager.issue_password_reset(&user).await;
        match second {
            Err(AuthError::CooldownActive(remaining)) => {
                assert!(remaining > 0 && remaining <= 3600);
            }
            other => panic!("expected CooldownActive, got {:?}", other.map(|_| ())),
        }

        assert_eq!(store.reset_token_count(), 1);
    }

    #[tokio::test]
    async fn test_reset_redemption_rotates_password_once() {
        let (manager, store) = manager_with_store();
        let user = seed_user(&store, "user@example.com").await;

        let raw = manager.issue_password_reset(&user).await.unwrap();

        let updated = manager
            .redeem_password_reset(&raw, "New-pass2")
            .await
            .unwrap();
        assert!(
            crypto::verify_secret("New-pass2", updated.password_hash.as_deref().unwrap()).unwrap()
        );
        assert_eq!(store.reset_token_count(), 0);

        let stored_user = store.find_user_by_id(user.id).await.unwrap().unwrap();
        assert!(
            crypto::verify_secret("New-pass2", stored_user.password_hash.as_deref().unwrap())
                .unwrap()
        );

        let replay = manager.redeem_password_reset(&raw, "Another-pass3").await;
        assert!(matches!(replay, Err(AuthError::InvalidOrExpiredToken)));
    }

    #[tokio::test]
    async fn test_reset_to_same_password_is_rejected_and_token_survives() {
        let (manager, store) = manager_with_store();
        let user = seed_user(&store, "user@example.com").await;

        let raw = manager.issue_password_reset(&user).await.unwrap();

        let result = manager.redeem_password_reset(&raw, "Old-pass1").await;
        assert!(matches!(result, Err(AuthError::Validation(_))));

        // The failed attempt must not consume the token.
        assert_eq!(store.reset_token_count(), 1);
        assert!(manager.redeem_password_reset(&raw, "New-pass2").await.is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_reset_redemptions_have_one_winner() {
        let (manager, store) = manager_with_store();
        let user = seed_user(&store, "user@example.com").await;

        let raw = manager.issue_password_reset(&user).await.unwrap();

        // Distinct new passwords so the loser always fails on the consumed
        // token, never on the same-password check against the winner's write.
        let first = {
            let manager = manager.clone();
            let raw = raw.clone();
            tokio::spawn(async move { manager.redeem_password_reset(&raw, "New-pass2").await })
        };
        let second = {
            let manager = manager.clone();
            let raw = raw.clone();
            tokio::spawn(async move { manager.redeem_password_reset(&raw, "Other-pass3").await })
        };

        let first = first.await.unwrap();
        let second = second.await.unwrap();

        let successes = [&first, &second].iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1, "exactly one concurrent redemption may win");

        let loser = if first.is_ok() { second } else { first };
        assert!(matches!(loser, Err(AuthError::InvalidOrExpiredToken)));
        assert_eq!(store.reset_token_count(), 0);
    }

    #[tokio::test]
    async fn test_garbage_token_is_rejected() {
        let (manager, _store) = manager_with_store();

        let result = manager.redeem_email_verification("definitely-not-a-token").await;
        assert!(matches!(result, Err(AuthError::InvalidOrExpiredToken)));
    }
}
