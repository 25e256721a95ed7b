use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use homeinspect_server::db::{create_pool, run_migrations};
use homeinspect_server::services::{
    http_client, FirebaseTokenVerifier, GcsObjectStore, OpenAiAnalyzer, StripeClient,
};
use homeinspect_server::{build_router, AppState, Config, PgStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "homeinspect_server=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Home Inspection Report Server...");

    // Load configuration
    let config = Config::from_env().map_err(|e| anyhow::anyhow!(e))?;

    tracing::info!(
        "Environment: {}, Server: {}",
        config.environment,
        config.server_address()
    );

    // Create database connection pool
    let pool = create_pool(&config.database_url).await?;
    run_migrations(&pool).await?;

    // Provider clients
    let http = http_client(config.http_timeout_secs)?;
    let identity = FirebaseTokenVerifier::new(http.clone(), config.firebase.project_id.clone());
    let storage = GcsObjectStore::new(http.clone(), &config.firebase)?;
    let analyzer = OpenAiAnalyzer::new(http.clone(), &config.openai);
    let billing = StripeClient::new(http, config.stripe.secret_key.clone());

    // Configure CORS
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    // Create app state
    let state = AppState {
        store: Arc::new(PgStore::new(pool)),
        identity: Arc::new(identity),
        storage: Arc::new(storage),
        analyzer: Arc::new(analyzer),
        billing: Arc::new(billing),
        config: config.clone(),
    };

    let app = build_router(state).layer(cors);

    // Start server
    let addr: SocketAddr = config.server_address().parse()?;
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
