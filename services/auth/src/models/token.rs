//! Single-use token records
//!
//! Both token kinds store only a salted hash of the secret plus a short
//! clear-text prefix used for indexed lookup. The raw secret exists only in
//! the email that delivers it.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Email-verification token entity
///
/// At most one live token per email; issuing a replacement deletes the
/// predecessor first. Consumed tokens are deleted, never updated in place.
#[derive(Debug, Clone, FromRow)]
pub struct VerificationToken {
    pub id: Uuid,
    pub email: String,
    pub token_hash: String,
    pub prefix: String,
    pub expires_at: DateTime<Utc>,
    pub last_sent_at: DateTime<Utc>,
}

/// New verification token payload
#[derive(Debug, Clone)]
pub struct NewVerificationToken {
    pub email: String,
    pub token_hash: String,
    pub prefix: String,
    pub expires_at: DateTime<Utc>,
    pub last_sent_at: DateTime<Utc>,
}

/// Password-reset token entity
///
/// Owned by exactly one user at a time; deleted in the same transaction that
/// applies the password update.
#[derive(Debug, Clone, FromRow)]
pub struct PasswordResetToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub prefix: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// New password-reset token payload
#[derive(Debug, Clone)]
pub struct NewPasswordResetToken {
    pub user_id: Uuid,
    pub token_hash: String,
    pub prefix: String,
    pub expires_at: DateTime<Utc>,
}
