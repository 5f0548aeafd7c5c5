//! Middleware for session validation on protected routes

use axum::{body::Body, extract::State, http::Request, middleware::Next, response::Response};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};

use crate::AppState;
use crate::error::{AuthError, AuthResult};
use crate::session::RequireOptions;

/// Extract the bearer session token, run the guard, and expose the result
///
/// On success an [`crate::session::AuthContext`] lands in the request
/// extensions for the wrapped handler. Routes behind this middleware require
/// a verified email.
pub async fn require_session(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut req: Request<Body>,
    next: Next,
) -> AuthResult<Response> {
    let Some(TypedHeader(Authorization(bearer))) = bearer else {
        return Err(AuthError::Unauthorized);
    };

    let context = state
        .session_guard
        .require(bearer.token(), RequireOptions::default())?;

    req.extensions_mut().insert(context);

    Ok(next.run(req).await)
}
