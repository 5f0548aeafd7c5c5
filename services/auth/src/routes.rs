//! Authentication service routes

use axum::{
    Extension, Json, Router,
    extract::{Query, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::{get, patch, post},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::AppState;
use crate::error::{AuthError, AuthResult};
use crate::mailer::{self, Mailer};
use crate::middleware::require_session;
use crate::models::Identity;
use crate::password_policy::{RequirementStatus, default_policy};
use crate::session::AuthContext;
use crate::store::{AuthStore, StoreError};
use crate::validation::{validate_email, validate_name};

/// Response for session issuance and refresh
#[derive(Serialize)]
pub struct TokenResponse {
    pub session_token: String,
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
}

/// Request for user registration
#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
    pub recaptcha_token: Option<String>,
}

/// Response for user registration
#[derive(Serialize)]
pub struct RegisterResponse {
    pub message: String,
    pub user: Identity,
}

/// Request for credential login
#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    pub recaptcha_token: Option<String>,
}

/// Request for session refresh
#[derive(Deserialize)]
pub struct RefreshRequest {
    pub session_token: String,
}

/// Request carrying a raw verification token
#[derive(Deserialize)]
pub struct VerifyEmailRequest {
    pub token: String,
}

/// Request addressed by email only
#[derive(Deserialize)]
pub struct EmailRequest {
    pub email: String,
}

/// Request for password reset redemption
#[derive(Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
}

/// Request for an authenticated password change
#[derive(Deserialize)]
pub struct UpdatePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// Query parameters of the public cooldown endpoint
#[derive(Deserialize)]
pub struct CooldownQuery {
    pub email: Option<String>,
}

/// Request for password-strength feedback
#[derive(Deserialize)]
pub struct PasswordStrengthRequest {
    pub password: String,
}

/// Per-requirement feedback plus the aggregate score
#[derive(Serialize)]
pub struct PasswordStrengthResponse {
    pub requirements: Vec<RequirementStatus>,
    pub strength: u8,
    pub valid: bool,
}

/// Message-only response body
#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

fn message(text: &str) -> Json<MessageResponse> {
    Json(MessageResponse {
        message: text.to_string(),
    })
}

/// Create the router for the authentication service
pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/users/me", get(me))
        .route("/users/password", patch(update_password))
        .layer(from_fn_with_state(state.clone(), require_session));

    Router::new()
        .route("/health", get(health_check))
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh_session))
        .route("/auth/verify-email", post(verify_email))
        .route("/auth/resend-verification", post(resend_verification))
        .route("/auth/request-password-reset", post(request_password_reset))
        .route("/auth/reset-password", post(reset_password))
        .route("/public/cooldown", get(cooldown))
        .route("/public/password-strength", post(password_strength))
        .merge(protected)
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "auth-service"
    }))
}

/// Register a new account and send the verification email
///
/// A duplicate email gets the same body as a brand-new registration so the
/// response never confirms whether an address already has an account.
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AuthResult<impl IntoResponse> {
    validate_email(&payload.email).map_err(AuthError::Validation)?;
    validate_name(&payload.name).map_err(AuthError::Validation)?;

    if !state
        .recaptcha
        .verify(payload.recaptcha_token.as_deref().unwrap_or_default())
        .await
    {
        return Err(AuthError::CaptchaFailed);
    }

    if !default_policy().is_valid(&payload.password) {
        return Err(AuthError::Validation(
            "Password does not meet complexity requirements. Password must be at least 6 \
             characters long and meet all security requirements."
                .to_string(),
        ));
    }

    let generic_response = "Registration request received. If this email is not already \
                            registered, you will receive a verification email shortly.";

    if state
        .store
        .find_user_by_email(&payload.email)
        .await?
        .is_some()
    {
        return Ok((StatusCode::OK, message(generic_response)).into_response());
    }

    let password_hash = crate::crypto::hash_secret(&payload.password).map_err(|e| {
        error!("Failed to hash password: {}", e);
        AuthError::Internal
    })?;

    let user = match state
        .store
        .create_user(crate::models::NewUser {
            name: payload.name,
            email: payload.email,
            password_hash,
        })
        .await
    {
        Ok(user) => user,
        // Lost a concurrent-registration race; same answer as the pre-check.
        Err(StoreError::AlreadyExists) => {
            return Ok((StatusCode::OK, message(generic_response)).into_response());
        }
        Err(e) => return Err(e.into()),
    };

    let raw_token = state
        .token_manager
        .issue_email_verification(&user.email)
        .await?;

    let email =
        mailer::verification_email(&state.mailer_config, &user.name, &user.email, &raw_token);
    state.mailer.send(email).await.map_err(|e| {
        error!("Failed to send verification email: {}", e);
        AuthError::Internal
    })?;

    info!("Registered user {}", user.id);
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "User created".to_string(),
            user: user.identity(),
        }),
    )
        .into_response())
}

/// Credential login endpoint
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AuthResult<impl IntoResponse> {
    validate_email(&payload.email).map_err(AuthError::Validation)?;

    if !state
        .recaptcha
        .verify(payload.recaptcha_token.as_deref().unwrap_or_default())
        .await
    {
        return Err(AuthError::CaptchaFailed);
    }

    if !state
        .rate_limiter
        .is_allowed(&format!("login:{}", payload.email))
        .await
    {
        return Err(AuthError::RateLimited);
    }

    let identity = state
        .session_guard
        .authenticate(&payload.email, &payload.password)
        .await?;

    let session = state.session_guard.issue_session(&identity)?;

    Ok((
        StatusCode::OK,
        Json(TokenResponse {
            session_token: session.session_token,
            access_token: session.access_token,
            token_type: "Bearer".to_string(),
            expires_in: session.expires_in,
        }),
    ))
}

/// Session refresh endpoint
///
/// Rebuilds claims from the stored account and regenerates the embedded
/// access credential.
pub async fn refresh_session(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> AuthResult<impl IntoResponse> {
    let session = state.session_guard.refresh(&payload.session_token).await?;

    Ok((
        StatusCode::OK,
        Json(TokenResponse {
            session_token: session.session_token,
            access_token: session.access_token,
            token_type: "Bearer".to_string(),
            expires_in: session.expires_in,
        }),
    ))
}

/// Redeem an email-verification token
pub async fn verify_email(
    State(state): State<AppState>,
    Json(payload): Json<VerifyEmailRequest>,
) -> AuthResult<impl IntoResponse> {
    let user = state
        .token_manager
        .redeem_email_verification(&payload.token)
        .await?;

    // The verification is committed; a failed welcome email must not undo it.
    let email = mailer::welcome_email(&state.mailer_config, &user.name, &user.email);
    if let Err(e) = state.mailer.send(email).await {
        warn!("Failed to send welcome email: {}", e);
    }

    Ok((
        StatusCode::OK,
        Json(RegisterResponse {
            message: "Your email has been verified! Please proceed to the dashboard.".to_string(),
            user: user.identity(),
        }),
    ))
}

/// Reissue a verification email, subject to the cooldown window
pub async fn resend_verification(
    State(state): State<AppState>,
    Json(payload): Json<EmailRequest>,
) -> AuthResult<impl IntoResponse> {
    validate_email(&payload.email).map_err(AuthError::Validation)?;

    let user = state
        .store
        .find_user_by_email(&payload.email)
        .await?
        .ok_or_else(|| AuthError::NotFound("User not found".to_string()))?;

    if user.email_verified.is_some() {
        return Err(AuthError::Validation(
            "Your email is already verified.".to_string(),
        ));
    }

    if !state
        .rate_limiter
        .is_allowed(&format!("verify:{}", user.email))
        .await
    {
        return Err(AuthError::RateLimited);
    }

    let raw_token = state
        .token_manager
        .issue_email_verification(&user.email)
        .await?;

    let email =
        mailer::verification_email(&state.mailer_config, &user.name, &user.email, &raw_token);
    state.mailer.send(email).await.map_err(|e| {
        error!("Failed to send verification email: {}", e);
        AuthError::Internal
    })?;

    Ok((
        StatusCode::OK,
        message("Verification email sent. Please check your inbox."),
    ))
}

/// Request a password-reset email
///
/// An unknown address gets the same success body as a known one; only the
/// cooldown is observable, as the client copy requires.
pub async fn request_password_reset(
    State(state): State<AppState>,
    Json(payload): Json<EmailRequest>,
) -> AuthResult<impl IntoResponse> {
    validate_email(&payload.email).map_err(AuthError::Validation)?;

    if !state
        .rate_limiter
        .is_allowed(&format!("reset:{}", payload.email))
        .await
    {
        return Err(AuthError::RateLimited);
    }

    let success_response = "Password reset email sent. Please check your inbox.";

    let Some(user) = state.store.find_user_by_email(&payload.email).await? else {
        info!("Password reset requested for unknown email");
        return Ok((StatusCode::OK, message(success_response)));
    };

    let raw_token = state.token_manager.issue_password_reset(&user).await?;

    let email =
        mailer::password_reset_email(&state.mailer_config, &user.name, &user.email, &raw_token);
    state.mailer.send(email).await.map_err(|e| {
        error!("Failed to send password reset email: {}", e);
        AuthError::Internal
    })?;

    Ok((StatusCode::OK, message(success_response)))
}

/// Redeem a password-reset token and set the new password
pub async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> AuthResult<impl IntoResponse> {
    if !default_policy().is_valid(&payload.password) {
        return Err(AuthError::Validation(
            "Password does not meet complexity requirements. Password must be at least 6 \
             characters long and meet all security requirements."
                .to_string(),
        ));
    }

    let user = state
        .token_manager
        .redeem_password_reset(&payload.token, &payload.password)
        .await?;

    // The reset is committed; the confirmation email is best-effort.
    let email =
        mailer::password_reset_confirmation_email(&state.mailer_config, &user.name, &user.email);
    if let Err(e) = state.mailer.send(email).await {
        warn!("Failed to send password reset confirmation email: {}", e);
    }

    Ok((
        StatusCode::OK,
        message("Password reset successfully. You can now log in with your new password."),
    ))
}

/// Remaining verification-resend cooldown for an email, in seconds
pub async fn cooldown(
    State(state): State<AppState>,
    Query(query): Query<CooldownQuery>,
) -> AuthResult<impl IntoResponse> {
    let email = query
        .email
        .ok_or_else(|| AuthError::Validation("Email is required".to_string()))?;

    let remaining = state
        .token_manager
        .verification_cooldown_status(&email)
        .await?;

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({ "cooldown": remaining })),
    ))
}

/// Per-requirement password feedback for registration and reset forms
pub async fn password_strength(
    Json(payload): Json<PasswordStrengthRequest>,
) -> AuthResult<impl IntoResponse> {
    let policy = default_policy();

    Ok((
        StatusCode::OK,
        Json(PasswordStrengthResponse {
            requirements: policy.check(&payload.password),
            strength: policy.strength(&payload.password),
            valid: policy.is_valid(&payload.password),
        }),
    ))
}

/// Return the authenticated user's identity
pub async fn me(Extension(context): Extension<AuthContext>) -> AuthResult<impl IntoResponse> {
    Ok((StatusCode::OK, Json(context.identity)))
}

/// Change the authenticated user's password
pub async fn update_password(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
    Json(payload): Json<UpdatePasswordRequest>,
) -> AuthResult<impl IntoResponse> {
    if !default_policy().is_valid(&payload.new_password) {
        return Err(AuthError::Validation(
            "Password does not meet complexity requirements. Password must be at least 6 \
             characters long and meet all security requirements."
                .to_string(),
        ));
    }

    let identity = state
        .session_guard
        .change_password(
            context.identity.id,
            &payload.current_password,
            &payload.new_password,
        )
        .await?;

    Ok((StatusCode::OK, Json(identity)))
}
