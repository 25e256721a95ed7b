//! Stripe REST client (customers, embedded checkout, subscriptions).

use async_trait::async_trait;
use serde::Deserialize;

use super::{check_status, ProviderError};
use crate::models::{CheckoutMode, CheckoutSession};

const STRIPE_API: &str = "https://api.stripe.com/v1";

/// Parameters for a new embedded checkout session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCheckout {
    pub mode: CheckoutMode,
    pub customer_id: String,
    pub price_id: String,
    /// Internal user id, echoed back on completion
    pub client_reference_id: String,
    pub return_url: String,
}

#[async_trait]
pub trait BillingProvider: Send + Sync {
    /// Create a customer; `idempotency_key` makes retries return the same one
    async fn create_customer(
        &self,
        email: &str,
        idempotency_key: &str,
    ) -> Result<String, ProviderError>;

    async fn create_checkout_session(
        &self,
        checkout: &NewCheckout,
    ) -> Result<CheckoutSession, ProviderError>;

    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<CheckoutSession, ProviderError>;

    async fn cancel_subscription(&self, subscription_id: &str) -> Result<(), ProviderError>;
}

/// Checkout session object as Stripe serializes it (webhooks included)
#[derive(Debug, Clone, Deserialize)]
pub struct StripeCheckoutSession {
    pub id: String,
    pub mode: String,
    pub status: Option<String>,
    pub payment_status: Option<String>,
    pub client_secret: Option<String>,
    pub client_reference_id: Option<String>,
    pub customer: Option<String>,
    pub subscription: Option<String>,
    pub customer_details: Option<CustomerDetails>,
    pub customer_email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CustomerDetails {
    pub email: Option<String>,
}

impl TryFrom<StripeCheckoutSession> for CheckoutSession {
    type Error = ProviderError;

    fn try_from(session: StripeCheckoutSession) -> Result<Self, Self::Error> {
        let mode = match session.mode.as_str() {
            "subscription" => CheckoutMode::Subscription,
            "payment" => CheckoutMode::Payment,
            other => {
                return Err(ProviderError::InvalidResponse(format!(
                    "unsupported checkout mode '{}'",
                    other
                )))
            }
        };

        let customer_email = session
            .customer_details
            .and_then(|details| details.email)
            .or(session.customer_email);

        Ok(CheckoutSession {
            id: session.id,
            mode,
            status: session.status,
            payment_status: session.payment_status,
            client_secret: session.client_secret,
            client_reference_id: session.client_reference_id,
            customer_id: session.customer,
            subscription_id: session.subscription,
            customer_email,
        })
    }
}

#[derive(Debug, Deserialize)]
struct StripeCustomer {
    id: String,
}

pub struct StripeClient {
    http: reqwest::Client,
    secret_key: String,
}

impl StripeClient {
    pub fn new(http: reqwest::Client, secret_key: impl Into<String>) -> Self {
        Self {
            http,
            secret_key: secret_key.into(),
        }
    }
}

/// Form fields for `POST /v1/checkout/sessions`
fn checkout_form(checkout: &NewCheckout) -> Vec<(&'static str, String)> {
    vec![
        ("ui_mode", "embedded".to_string()),
        ("mode", checkout.mode.as_str().to_string()),
        ("customer", checkout.customer_id.clone()),
        ("client_reference_id", checkout.client_reference_id.clone()),
        ("line_items[0][price]", checkout.price_id.clone()),
        ("line_items[0][quantity]", "1".to_string()),
        ("return_url", checkout.return_url.clone()),
    ]
}

#[async_trait]
impl BillingProvider for StripeClient {
    async fn create_customer(
        &self,
        email: &str,
        idempotency_key: &str,
    ) -> Result<String, ProviderError> {
        let response = self
            .http
            .post(format!("{}/customers", STRIPE_API))
            .bearer_auth(&self.secret_key)
            .header("Idempotency-Key", idempotency_key)
            .form(&[("email", email)])
            .send()
            .await?;
        let customer: StripeCustomer = check_status("stripe", response).await?.json().await?;

        tracing::info!("Created billing customer {}", customer.id);
        Ok(customer.id)
    }

    async fn create_checkout_session(
        &self,
        checkout: &NewCheckout,
    ) -> Result<CheckoutSession, ProviderError> {
        let response = self
            .http
            .post(format!("{}/checkout/sessions", STRIPE_API))
            .bearer_auth(&self.secret_key)
            .form(&checkout_form(checkout))
            .send()
            .await?;
        let session: StripeCheckoutSession = check_status("stripe", response).await?.json().await?;

        tracing::info!(
            "Created {} checkout session {}",
            checkout.mode.as_str(),
            session.id
        );
        session.try_into()
    }

    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<CheckoutSession, ProviderError> {
        let mut url = reqwest::Url::parse(STRIPE_API)
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| ProviderError::InvalidResponse("invalid Stripe base URL".to_string()))?
            .extend(&["checkout", "sessions", session_id]);

        let response = self
            .http
            .get(url)
            .bearer_auth(&self.secret_key)
            .send()
            .await?;
        let session: StripeCheckoutSession = check_status("stripe", response).await?.json().await?;

        session.try_into()
    }

    async fn cancel_subscription(&self, subscription_id: &str) -> Result<(), ProviderError> {
        let mut url = reqwest::Url::parse(STRIPE_API)
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| ProviderError::InvalidResponse("invalid Stripe base URL".to_string()))?
            .extend(&["subscriptions", subscription_id]);

        let response = self
            .http
            .delete(url)
            .bearer_auth(&self.secret_key)
            .send()
            .await?;
        check_status("stripe", response).await?;

        tracing::info!("Canceled subscription {}", subscription_id);
        Ok(())
    }
}
