use axum::{extract::State, Extension, Json};
use serde::{Deserialize, Serialize};

use crate::constants::ERR_INVALID_EMAIL;
use crate::error::{AppError, Result};
use crate::models::user::normalize_email;
use crate::models::{SubscriptionStatus, User};
use crate::routes::auth::current_user;
use crate::services::Principal;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SaveEmailRequest {
    pub email: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveEmailResponse {
    pub success: bool,
    pub user_id: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionStatusResponse {
    pub status: SubscriptionStatus,
    pub credits: i32,
    pub has_subscription: bool,
}

/// Capture an email address before sign-up
///
/// Public endpoint. Creates a `pending` user, or returns the existing one
/// for a known address.
pub async fn save_email(
    State(state): State<AppState>,
    Json(payload): Json<SaveEmailRequest>,
) -> Result<Json<SaveEmailResponse>> {
    let email = normalize_email(&payload.email).ok_or_else(|| {
        tracing::debug!("Rejected malformed email");
        AppError::InvalidInput(ERR_INVALID_EMAIL.to_string())
    })?;

    let user = state.store.upsert_user_by_email(&email).await?;
    tracing::info!("Saved email for user {}", user.id);

    Ok(Json(SaveEmailResponse {
        success: true,
        user_id: user.id,
    }))
}

/// Link the signed-in identity to its user row and return it
pub async fn link_auth(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<User>> {
    let user = current_user(&state, &principal).await?;
    Ok(Json(user))
}

pub async fn subscription_status(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<SubscriptionStatusResponse>> {
    let user = current_user(&state, &principal).await?;

    Ok(Json(SubscriptionStatusResponse {
        status: user.subscription_status,
        credits: user.credits,
        has_subscription: user.stripe_subscription_id.is_some(),
    }))
}
