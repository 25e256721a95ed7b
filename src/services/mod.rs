//! Clients for the managed services the API orchestrates.
//!
//! Each concern is a trait (`TokenVerifier`, `ObjectStore`, `ReportAnalyzer`,
//! `BillingProvider`) with one production implementation here; handlers only
//! ever see the trait object held in `AppState`.

pub mod analyzer;
pub mod billing;
pub mod identity;
pub mod pdf;
pub mod storage;

use std::time::Duration;

use thiserror::Error;

pub use analyzer::{OpenAiAnalyzer, ReportAnalyzer};
pub use billing::{BillingProvider, NewCheckout, StripeClient};
pub use identity::{FirebaseTokenVerifier, Principal, TokenVerifier};
pub use storage::{GcsObjectStore, ObjectStore, StoredObject};

/// Failure talking to a third-party API
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{service} returned {status}: {message}")]
    Api {
        service: &'static str,
        status: u16,
        message: String,
    },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Credential error: {0}")]
    Credentials(String),
}

/// Shared HTTP client settings for provider calls
pub fn http_client(timeout_secs: u64) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(concat!("homeinspect-server/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Turn a non-success response into `ProviderError::Api`, keeping the body
/// text (truncated) for the log line.
pub(crate) async fn check_status(
    service: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let mut message = response.text().await.unwrap_or_default();
    if message.len() > 500 {
        let mut cut = 500;
        while !message.is_char_boundary(cut) {
            cut -= 1;
        }
        message.truncate(cut);
    }

    Err(ProviderError::Api {
        service,
        status: status.as_u16(),
        message,
    })
}
