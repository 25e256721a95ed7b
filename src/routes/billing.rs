use axum::{
    extract::{Query, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use crate::constants::ERR_MISSING_SESSION_ID;
use crate::error::{AppError, Result};
use crate::models::billing::{checkout_idempotency_key, transition_for_completed_checkout};
use crate::models::{BillingTransition, CheckoutMode, SubscriptionStatus, User};
use crate::routes::auth::current_user;
use crate::services::{NewCheckout, Principal, ProviderError};
use crate::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub client_secret: String,
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub success: bool,
    pub status: SubscriptionStatus,
}

#[derive(Debug, Deserialize)]
pub struct SessionStatusParams {
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatusResponse {
    pub status: Option<String>,
    pub customer_email: Option<String>,
}

/// Start an embedded checkout for the recurring subscription
pub async fn create_checkout_session(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<CheckoutResponse>> {
    let price_id = state.config.stripe.price_id.clone();
    start_checkout(&state, &principal, CheckoutMode::Subscription, price_id).await
}

/// Start an embedded checkout for a one-time credit purchase
pub async fn create_one_time_checkout(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<CheckoutResponse>> {
    let price_id = state.config.stripe.one_time_price_id.clone();
    start_checkout(&state, &principal, CheckoutMode::Payment, price_id).await
}

async fn start_checkout(
    state: &AppState,
    principal: &Principal,
    mode: CheckoutMode,
    price_id: String,
) -> Result<Json<CheckoutResponse>> {
    let user = current_user(state, principal).await?;
    let customer_id = ensure_customer(state, &user).await?;

    let session = state
        .billing
        .create_checkout_session(&NewCheckout {
            mode,
            customer_id,
            price_id,
            client_reference_id: user.id.to_string(),
            return_url: state.config.checkout_return_url(),
        })
        .await?;

    let client_secret = session.client_secret.ok_or_else(|| {
        AppError::Provider(ProviderError::InvalidResponse(
            "checkout session without client_secret".to_string(),
        ))
    })?;

    tracing::info!(
        "Created {} checkout {} for user {}",
        mode.as_str(),
        session.id,
        user.id
    );

    Ok(Json(CheckoutResponse {
        client_secret,
        session_id: session.id,
    }))
}

/// Billing customer for `user`, created on first checkout
///
/// Concurrent first checkouts share the provider idempotency key and the
/// conditional store write, so they settle on a single customer.
async fn ensure_customer(state: &AppState, user: &User) -> Result<String> {
    if let Some(existing) = &user.stripe_customer_id {
        return Ok(existing.clone());
    }

    let created = state
        .billing
        .create_customer(&user.email, &format!("customer-{}", user.id))
        .await?;
    state.store.claim_billing_customer(user.id, &created).await
}

/// Cancel the caller's active subscription
pub async fn cancel_subscription(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<CancelResponse>> {
    let user = current_user(&state, &principal).await?;
    let subscription_id = user
        .cancellable_subscription()
        .ok_or(AppError::NoActiveSubscription)?
        .to_string();

    state.billing.cancel_subscription(&subscription_id).await?;

    state
        .store
        .apply_billing_transition(
            &format!("cancel:{}", subscription_id),
            &BillingTransition::SubscriptionStatusChanged {
                subscription_id: subscription_id.clone(),
                status: SubscriptionStatus::Canceled,
            },
        )
        .await?;

    tracing::info!(
        "User {} canceled subscription {}",
        user.id,
        subscription_id
    );

    Ok(Json(CancelResponse {
        success: true,
        status: SubscriptionStatus::Canceled,
    }))
}

/// Poll a checkout session after the embedded form returns
///
/// Applies the completion the same way the webhook does, so whichever
/// arrives first wins and the other is a no-op.
pub async fn session_status(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(params): Query<SessionStatusParams>,
) -> Result<Json<SessionStatusResponse>> {
    let session_id = params
        .session_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| AppError::InvalidInput(ERR_MISSING_SESSION_ID.to_string()))?;

    let user = current_user(&state, &principal).await?;
    let session = state.billing.retrieve_checkout_session(&session_id).await?;

    if session.user_id() != Some(user.id) {
        tracing::warn!(
            "User {} polled checkout {} belonging to someone else",
            user.id,
            session.id
        );
        return Err(AppError::SessionNotFound);
    }

    if let Some(transition) =
        transition_for_completed_checkout(&session, state.config.credits_per_purchase)
    {
        let applied = state
            .store
            .apply_billing_transition(&checkout_idempotency_key(&session.id), &transition)
            .await?;
        if applied {
            tracing::info!("Applied checkout {} from status poll", session.id);
        }
    }

    Ok(Json(SessionStatusResponse {
        status: session.status,
        customer_email: session.customer_email,
    }))
}
