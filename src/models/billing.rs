//! Billing state transitions.
//!
//! Every change to a user's subscription state or credit balance that
//! originates at the billing provider goes through [`BillingTransition`],
//! applied by `Store::apply_billing_transition` together with its
//! idempotency key in one transaction.

use serde::{Deserialize, Serialize};

use super::user::SubscriptionStatus;

/// Checkout flavor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckoutMode {
    /// Recurring subscription
    Subscription,
    /// One-time purchase of analysis credits
    Payment,
}

impl CheckoutMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutMode::Subscription => "subscription",
            CheckoutMode::Payment => "payment",
        }
    }
}

/// Provider-neutral view of a checkout session
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutSession {
    pub id: String,
    pub mode: CheckoutMode,
    /// `open`, `complete` or `expired`
    pub status: Option<String>,
    /// `paid`, `unpaid` or `no_payment_required`
    pub payment_status: Option<String>,
    pub client_secret: Option<String>,
    /// Internal user id we attached when creating the session
    pub client_reference_id: Option<String>,
    pub customer_id: Option<String>,
    pub subscription_id: Option<String>,
    pub customer_email: Option<String>,
}

impl CheckoutSession {
    pub fn is_complete(&self) -> bool {
        self.status.as_deref() == Some("complete")
    }

    /// Funds are captured; delayed payment methods complete while `unpaid`
    pub fn is_paid(&self) -> bool {
        matches!(
            self.payment_status.as_deref(),
            Some("paid") | Some("no_payment_required")
        )
    }

    /// Internal user id from `client_reference_id`
    pub fn user_id(&self) -> Option<i64> {
        self.client_reference_id.as_deref()?.parse().ok()
    }
}

/// A state change to apply to the user and subscription tables
#[derive(Debug, Clone, PartialEq)]
pub enum BillingTransition {
    /// Subscription checkout completed
    SubscriptionActivated {
        user_id: i64,
        customer_id: String,
        subscription_id: String,
    },
    /// One-time checkout completed
    CreditsPurchased {
        user_id: i64,
        customer_id: Option<String>,
        credits: i32,
    },
    /// Provider-side lifecycle change, or local cancel
    SubscriptionStatusChanged {
        subscription_id: String,
        status: SubscriptionStatus,
    },
}

/// Key shared by the webhook and the session poll so a checkout applies once
pub fn checkout_idempotency_key(session_id: &str) -> String {
    format!("checkout:{}", session_id)
}

pub fn event_idempotency_key(event_id: &str) -> String {
    format!("event:{}", event_id)
}

/// Derive the transition for a completed checkout session
///
/// Returns None when the session is not complete or lacks what the
/// transition needs (user reference, customer, subscription). Credit
/// purchases also wait until the payment is captured.
pub fn transition_for_completed_checkout(
    session: &CheckoutSession,
    credits_per_purchase: i32,
) -> Option<BillingTransition> {
    if !session.is_complete() {
        return None;
    }

    let user_id = session.user_id()?;

    match session.mode {
        CheckoutMode::Subscription => Some(BillingTransition::SubscriptionActivated {
            user_id,
            customer_id: session.customer_id.clone()?,
            subscription_id: session.subscription_id.clone()?,
        }),
        CheckoutMode::Payment if !session.is_paid() => None,
        CheckoutMode::Payment => Some(BillingTransition::CreditsPurchased {
            user_id,
            customer_id: session.customer_id.clone(),
            credits: credits_per_purchase,
        }),
    }
}
