//! Session guard
//!
//! Gates protected operations and mediates credential login. A successful
//! login yields a long-lived session token with a short-lived access
//! credential embedded in it; `require` re-checks both on every protected
//! request, and `refresh` regenerates the credential without touching the
//! stored account.

use std::sync::Arc;
use tracing::{error, info};

use crate::crypto;
use crate::error::{AuthError, AuthResult};
use crate::jwt::JwtService;
use crate::models::Identity;
use crate::store::AuthStore;

/// Options for [`SessionGuard::require`]
#[derive(Debug, Clone, Copy)]
pub struct RequireOptions {
    /// Whether the operation demands a verified email (default: true)
    pub email_verified: bool,
}

impl Default for RequireOptions {
    fn default() -> Self {
        Self {
            email_verified: true,
        }
    }
}

/// What a protected operation receives after the guard passes
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub identity: Identity,
    pub access_token: String,
}

/// A freshly issued or refreshed session
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub session_token: String,
    pub access_token: String,
    /// Lifetime of the access credential in seconds
    pub expires_in: u64,
}

/// Session guard over the user store and the JWT service
#[derive(Clone)]
pub struct SessionGuard {
    store: Arc<dyn AuthStore>,
    jwt: JwtService,
}

impl SessionGuard {
    /// Create a new session guard
    pub fn new(store: Arc<dyn AuthStore>, jwt: JwtService) -> Self {
        Self { store, jwt }
    }

    /// Verify a credential pair and return the account's identity
    ///
    /// Unknown email, missing local credential, and wrong password all
    /// produce the same `InvalidCredentials`, with the same hashing work
    /// done on every path.
    pub async fn authenticate(&self, email: &str, password: &str) -> AuthResult<Identity> {
        let user = self.store.find_user_by_email(email).await?;

        let Some(user) = user else {
            crypto::dummy_verify(password);
            return Err(AuthError::InvalidCredentials);
        };

        let Some(password_hash) = user.password_hash.as_deref() else {
            crypto::dummy_verify(password);
            return Err(AuthError::InvalidCredentials);
        };

        let matches = crypto::verify_secret(password, password_hash).map_err(|e| {
            error!("Failed to verify password hash: {}", e);
            AuthError::Internal
        })?;

        if !matches {
            return Err(AuthError::InvalidCredentials);
        }

        info!("Authenticated user {}", user.id);
        Ok(user.identity())
    }

    /// Issue a session token with a fresh embedded access credential
    pub fn issue_session(&self, identity: &Identity) -> AuthResult<IssuedSession> {
        let access_token = self.jwt.generate_access_token(identity).map_err(|e| {
            error!("Failed to generate access token: {}", e);
            AuthError::Internal
        })?;

        let session_token = self
            .jwt
            .generate_session_token(identity, &access_token)
            .map_err(|e| {
                error!("Failed to generate session token: {}", e);
                AuthError::Internal
            })?;

        Ok(IssuedSession {
            session_token,
            access_token,
            expires_in: self.jwt.access_token_expiry(),
        })
    }

    /// Refresh a session: reload the account and regenerate the credential
    ///
    /// Claims are rebuilt from the stored record, so an email verified since
    /// the last issuance shows up in the refreshed session.
    pub async fn refresh(&self, session_token: &str) -> AuthResult<IssuedSession> {
        let claims = self
            .jwt
            .validate_session_token(session_token)
            .map_err(|_| AuthError::Unauthorized)?;

        let user = self
            .store
            .find_user_by_id(claims.sub)
            .await?
            .ok_or(AuthError::Unauthorized)?;

        info!("Refreshing session for user {}", user.id);
        self.issue_session(&user.identity())
    }

    /// Admit or reject a session for a protected operation
    pub fn require(&self, session_token: &str, opts: RequireOptions) -> AuthResult<AuthContext> {
        let claims = self
            .jwt
            .validate_session_token(session_token)
            .map_err(|_| AuthError::Unauthorized)?;

        if opts.email_verified && claims.email_verified.is_none() {
            return Err(AuthError::EmailNotVerified);
        }

        // Unreachable through normal issuance, which always embeds one.
        let Some(access_token) = claims.act else {
            return Err(AuthError::MissingAccessToken);
        };

        if self.jwt.validate_access_token(&access_token).is_err() {
            return Err(AuthError::Unauthorized);
        }

        Ok(AuthContext {
            identity: Identity {
                id: claims.sub,
                name: claims.name,
                email: claims.email,
                image: claims.picture,
                email_verified: claims.email_verified,
            },
            access_token,
        })
    }

    /// Rotate a signed-in user's password after re-checking the current one
    pub async fn change_password(
        &self,
        user_id: uuid::Uuid,
        current_password: &str,
        new_password: &str,
    ) -> AuthResult<Identity> {
        let user = self
            .store
            .find_user_by_id(user_id)
            .await?
            .ok_or(AuthError::NotFound("User not found".to_string()))?;

        let Some(password_hash) = user.password_hash.as_deref() else {
            return Err(AuthError::Validation(
                "This account does not have a password.".to_string(),
            ));
        };

        let matches = crypto::verify_secret(current_password, password_hash).map_err(|e| {
            error!("Failed to verify password hash: {}", e);
            AuthError::Internal
        })?;

        if !matches {
            return Err(AuthError::Validation(
                "Current password is incorrect".to_string(),
            ));
        }

        let new_hash = crypto::hash_secret(new_password).map_err(|e| {
            error!("Failed to hash new password: {}", e);
            AuthError::Internal
        })?;

        self.store.update_password(user.id, &new_hash).await?;

        info!("Password changed for user {}", user.id);
        Ok(user.identity())
    }
}
