use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::services::pdf::PdfError;
use crate::services::ProviderError;

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("PDF extraction error: {0}")]
    PdfExtraction(#[from] PdfError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Task join error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("File not found")]
    FileNotFound,

    #[error("Analysis not found")]
    AnalysisNotFound,

    #[error("Checkout session not found")]
    SessionNotFound,

    #[error("No active subscription to cancel")]
    NoActiveSubscription,

    #[error("No analysis credits remaining")]
    InsufficientCredits,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Payload too large")]
    PayloadTooLarge,

    #[error("Invalid signature")]
    InvalidSignature,
}

/// Implement IntoResponse to convert AppError into HTTP responses
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Database(ref e) => {
                tracing::error!("Database error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
            AppError::Provider(ref e) => {
                tracing::error!("Provider error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Upstream service error")
            }
            AppError::PdfExtraction(ref e) => {
                tracing::error!("PDF extraction error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "PDF extraction failed")
            }
            AppError::Serialization(ref e) => {
                tracing::error!("Serialization error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
            AppError::TaskJoin(ref e) => {
                tracing::error!("Task join error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized"),
            AppError::FileNotFound => (StatusCode::NOT_FOUND, "File not found"),
            AppError::AnalysisNotFound => (StatusCode::NOT_FOUND, "Analysis not found"),
            AppError::SessionNotFound => (StatusCode::NOT_FOUND, "Checkout session not found"),
            AppError::NoActiveSubscription => {
                (StatusCode::CONFLICT, "No active subscription to cancel")
            }
            AppError::InsufficientCredits => {
                (StatusCode::PAYMENT_REQUIRED, "No analysis credits remaining")
            }
            AppError::InvalidInput(ref msg) => (StatusCode::BAD_REQUEST, msg.as_str()),
            AppError::PayloadTooLarge => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "Payload exceeds maximum allowed size",
            ),
            AppError::InvalidSignature => (StatusCode::BAD_REQUEST, "Invalid webhook signature"),
        };

        let body = Json(json!({
            "error": error_message
        }));

        (status, body).into_response()
    }
}

/// Result type alias for application results
pub type Result<T> = std::result::Result<T, AppError>;
