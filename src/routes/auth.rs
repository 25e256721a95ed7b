use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};

use crate::constants::ERR_PRINCIPAL_WITHOUT_EMAIL;
use crate::error::{AppError, Result};
use crate::models::user::normalize_email;
use crate::models::User;
use crate::security::parse_bearer_token;
use crate::services::Principal;
use crate::AppState;

/// Bearer-token authentication middleware
///
/// Verifies `Authorization: Bearer <token>` with the identity provider and
/// stores the resulting [`Principal`] in the request extensions. Missing,
/// malformed and rejected tokens all produce the same 401.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_bearer_token)
        .map(str::to_string)
        .ok_or_else(|| {
            tracing::debug!("Missing or malformed Authorization header");
            AppError::Unauthorized
        })?;

    let principal = state.identity.verify(&token).await.map_err(|e| {
        tracing::warn!("Token verification failed: {}", e);
        AppError::Unauthorized
    })?;

    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}

/// Resolve the authenticated principal to its user row, linking on first use
pub async fn current_user(state: &AppState, principal: &Principal) -> Result<User> {
    let email = principal
        .email
        .as_deref()
        .and_then(normalize_email)
        .ok_or_else(|| AppError::InvalidInput(ERR_PRINCIPAL_WITHOUT_EMAIL.to_string()))?;

    state.store.link_auth(&principal.uid, &email).await
}
