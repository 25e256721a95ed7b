//! Home Inspection Report Server Library
//!
//! This module exports the core types and functions for testing and reuse.

pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod security;
pub mod services;

pub use config::Config;
pub use db::{PgStore, Store};
pub use error::{AppError, Result};

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{services::ServeDir, trace::TraceLayer};

use services::{BillingProvider, ObjectStore, ReportAnalyzer, TokenVerifier};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub identity: Arc<dyn TokenVerifier>,
    pub storage: Arc<dyn ObjectStore>,
    pub analyzer: Arc<dyn ReportAnalyzer>,
    pub billing: Arc<dyn BillingProvider>,
    pub config: Config,
}

/// Build the HTTP router
///
/// Everything except `/health`, `/api/save-email` and `/api/webhook` sits
/// behind bearer-token authentication. When `STATIC_DIR` is configured the
/// SPA bundle is served for all other paths.
pub fn build_router(state: AppState) -> Router {
    use routes::*;

    let protected = Router::new()
        .route("/api/link-auth", post(link_auth))
        .route("/api/files", post(upload_file).get(list_files))
        .route("/api/files/:file_id", get(get_file).delete(delete_file))
        .route("/api/files/:file_id/analyze", post(analyze_file))
        .route("/api/files/:file_id/analysis", get(get_analysis))
        .route("/api/files/:file_id/report", get(get_report))
        .route("/api/subscription-status", get(subscription_status))
        .route("/api/create-checkout-session", post(create_checkout_session))
        .route("/api/create-one-time-checkout", post(create_one_time_checkout))
        .route("/api/cancel-subscription", post(cancel_subscription))
        .route("/api/session-status", get(session_status))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let mut app = Router::new()
        .route("/health", get(health_check))
        .route("/api/save-email", post(save_email))
        .route("/api/webhook", post(stripe_webhook))
        .merge(protected);

    if let Some(dir) = &state.config.static_dir {
        tracing::info!("Serving static files from {}", dir);
        app = app.fallback_service(ServeDir::new(dir));
    }

    app.layer(DefaultBodyLimit::max(state.config.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
