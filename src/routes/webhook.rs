use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::MAX_WEBHOOK_TIMESTAMP_AGE_SECS;
use crate::error::{AppError, Result};
use crate::models::billing::{
    checkout_idempotency_key, event_idempotency_key, transition_for_completed_checkout,
};
use crate::models::{BillingTransition, CheckoutSession, SubscriptionStatus};
use crate::security::verify_webhook_signature;
use crate::services::billing::StripeCheckoutSession;
use crate::AppState;

const SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Debug, Deserialize)]
struct WebhookEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: EventData,
}

#[derive(Debug, Deserialize)]
struct EventData {
    object: Value,
}

#[derive(Debug, Deserialize)]
struct SubscriptionObject {
    id: String,
    status: String,
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub received: bool,
    pub duplicate: bool,
}

/// Billing provider webhook
///
/// The body is taken raw so the signature is checked over the exact bytes
/// that were signed.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>> {
    let header = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| {
            tracing::warn!("Webhook delivery without signature header");
            AppError::InvalidSignature
        })?;

    verify_webhook_signature(
        &body,
        header,
        &state.config.stripe.webhook_secret,
        Utc::now().timestamp(),
        MAX_WEBHOOK_TIMESTAMP_AGE_SECS,
    )
    .map_err(|reason| {
        tracing::warn!("Rejected webhook signature: {:?}", reason);
        AppError::InvalidSignature
    })?;

    let event: WebhookEvent = serde_json::from_slice(&body).map_err(|e| {
        tracing::warn!("Malformed webhook event: {}", e);
        AppError::InvalidInput("Malformed event payload".to_string())
    })?;

    tracing::info!("Webhook event {} ({})", event.id, event.event_type);

    let Some((key, transition)) = transition_for_event(&state, &event)? else {
        return Ok(Json(WebhookResponse {
            received: true,
            duplicate: false,
        }));
    };

    let applied = state.store.apply_billing_transition(&key, &transition).await?;

    Ok(Json(WebhookResponse {
        received: true,
        duplicate: !applied,
    }))
}

/// Idempotency key and state change for an event, None for events that
/// change nothing
fn transition_for_event(
    state: &AppState,
    event: &WebhookEvent,
) -> Result<Option<(String, BillingTransition)>> {
    match event.event_type.as_str() {
        // Delayed payment methods complete unpaid and settle in a later event
        "checkout.session.completed" | "checkout.session.async_payment_succeeded" => {
            let raw: StripeCheckoutSession = parse_object(event)?;
            let session = match CheckoutSession::try_from(raw) {
                Ok(session) => session,
                Err(e) => {
                    tracing::info!("Ignoring checkout in event {}: {}", event.id, e);
                    return Ok(None);
                }
            };

            match transition_for_completed_checkout(&session, state.config.credits_per_purchase) {
                Some(transition) => Ok(Some((checkout_idempotency_key(&session.id), transition))),
                None => {
                    tracing::warn!(
                        "Checkout {} in event {} is unpaid or missing references",
                        session.id,
                        event.id
                    );
                    Ok(None)
                }
            }
        }
        "customer.subscription.updated" | "customer.subscription.deleted" => {
            let subscription: SubscriptionObject = parse_object(event)?;
            let status = if event.event_type == "customer.subscription.deleted" {
                SubscriptionStatus::Canceled
            } else {
                SubscriptionStatus::from_provider(&subscription.status)
            };

            Ok(Some((
                event_idempotency_key(&event.id),
                BillingTransition::SubscriptionStatusChanged {
                    subscription_id: subscription.id,
                    status,
                },
            )))
        }
        other => {
            tracing::debug!("Ignoring webhook event type {}", other);
            Ok(None)
        }
    }
}

fn parse_object<T: serde::de::DeserializeOwned>(event: &WebhookEvent) -> Result<T> {
    serde_json::from_value(event.data.object.clone()).map_err(|e| {
        tracing::warn!("Unexpected object in event {}: {}", event.id, e);
        AppError::InvalidInput("Malformed event payload".to_string())
    })
}
