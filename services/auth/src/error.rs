//! Custom error types for the authentication service

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::store::StoreError;

/// Custom error type for the authentication service
///
/// Validation and policy failures are handled at the boundary and never
/// reach the persistence layer. Credential and token failures carry
/// deliberately generic messages so responses do not confirm whether an
/// account exists.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Malformed input, surfaced with a field-level message
    #[error("{0}")]
    Validation(String),

    /// A live token exists and its cooldown window has not elapsed
    #[error("Please wait {} minute(s) before requesting another email", .0.div_ceil(60))]
    CooldownActive(u64),

    /// Too many attempts from the same subject
    #[error("Too many attempts. Please try again later.")]
    RateLimited,

    /// Bot-verification challenge failed
    #[error("reCAPTCHA verification failed. Please try again.")]
    CaptchaFailed,

    /// Unknown email or wrong password, indistinguishable on purpose
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// Token did not match, was already consumed, or has expired
    #[error("This link is invalid or has expired")]
    InvalidOrExpiredToken,

    /// No session, or the session token failed validation
    #[error("Unauthorized")]
    Unauthorized,

    /// The operation requires a verified email address
    #[error("Account not verified.")]
    EmailNotVerified,

    /// The session carries no derived access credential
    #[error("Missing access token")]
    MissingAccessToken,

    /// Subject genuinely absent where that fact is not secret
    #[error("{0}")]
    NotFound(String),

    /// Persistence, signing, or delivery failure; details stay in the logs
    #[error("Internal server error")]
    Internal,
}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        tracing::error!("Store error: {}", e);
        AuthError::Internal
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match &self {
            AuthError::Validation(_) => StatusCode::BAD_REQUEST,
            AuthError::CooldownActive(_) | AuthError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AuthError::CaptchaFailed
            | AuthError::InvalidCredentials
            | AuthError::Unauthorized
            | AuthError::MissingAccessToken => StatusCode::UNAUTHORIZED,
            AuthError::EmailNotVerified => StatusCode::FORBIDDEN,
            AuthError::InvalidOrExpiredToken | AuthError::NotFound(_) => StatusCode::NOT_FOUND,
            AuthError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = match &self {
            AuthError::CooldownActive(remaining_secs) => Json(json!({
                "error": self.to_string(),
                "remaining_secs": remaining_secs,
            })),
            _ => Json(json!({
                "error": self.to_string(),
            })),
        };

        (status, body).into_response()
    }
}

/// Type alias for authentication results
pub type AuthResult<T> = Result<T, AuthError>;
