use std::env;

use crate::constants::{
    DEFAULT_HTTP_TIMEOUT_SECS, DEFAULT_MAX_ANALYSIS_CHARS, DEFAULT_MAX_UPLOAD_BYTES,
    DEFAULT_OPENAI_MODEL,
};

/// Firebase service account and project settings
#[derive(Debug, Clone)]
pub struct FirebaseConfig {
    pub project_id: String,
    pub client_email: String,
    pub private_key: String,
    pub storage_bucket: String,
}

/// Stripe credentials and price ids
#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
    pub price_id: String,
    pub one_time_price_id: String,
}

/// OpenAI credentials and model selection
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub model: String,
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub database_url: String,
    pub allowed_origins: Vec<String>,
    pub environment: String,
    pub frontend_url: String,
    pub static_dir: Option<String>,
    pub max_upload_bytes: usize,
    pub max_analysis_chars: usize,
    pub http_timeout_secs: u64,
    pub credits_per_purchase: i32,
    pub analysis_requires_credit: bool,
    pub firebase: FirebaseConfig,
    pub stripe: StripeConfig,
    pub openai: OpenAiConfig,
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Every missing required variable is reported at once so a broken
    /// deployment can be fixed in a single pass.
    pub fn from_env() -> Result<Self, String> {
        // Load .env file if it exists (development)
        dotenvy::dotenv().ok();

        let mut missing = Vec::new();
        let mut required = |name: &'static str| match env::var(name) {
            Ok(value) if !value.trim().is_empty() => value,
            _ => {
                missing.push(name);
                String::new()
            }
        };

        let firebase = FirebaseConfig {
            project_id: required("FIREBASE_PROJECT_ID"),
            client_email: required("FIREBASE_CLIENT_EMAIL"),
            private_key: unescape_private_key(&required("FIREBASE_PRIVATE_KEY")),
            storage_bucket: required("FIREBASE_STORAGE_BUCKET"),
        };

        let stripe = StripeConfig {
            secret_key: required("STRIPE_SECRET_KEY"),
            webhook_secret: required("STRIPE_WEBHOOK_SECRET"),
            price_id: required("STRIPE_PRICE_ID"),
            one_time_price_id: required("STRIPE_ONE_TIME_PRICE_ID"),
        };

        let openai = OpenAiConfig {
            api_key: required("OPENAI_API_KEY"),
            model: env::var("OPENAI_MODEL").unwrap_or_else(|_| DEFAULT_OPENAI_MODEL.to_string()),
        };

        let database_url = match env::var("DATABASE_URL") {
            Ok(url) => url,
            Err(_) => {
                let user = required("DB_USER");
                let password = required("DB_PASSWORD");
                let host = required("DB_HOST");
                let name = required("DB_NAME");
                let port = env::var("DB_PORT").unwrap_or_else(|_| "5432".to_string());
                format!("postgres://{}:{}@{}:{}/{}", user, password, host, port, name)
            }
        };

        if !missing.is_empty() {
            return Err(format!(
                "Missing required environment variables: {}",
                missing.join(", ")
            ));
        }

        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .map_err(|_| "Invalid SERVER_PORT")?;

        let allowed_origins = env::var("ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let frontend_url = env::var("FRONTEND_URL")
            .unwrap_or_else(|_| "http://localhost:5173".to_string())
            .trim_end_matches('/')
            .to_string();

        let static_dir = env::var("STATIC_DIR").ok().filter(|s| !s.is_empty());

        let max_upload_bytes = env::var("MAX_UPLOAD_BYTES")
            .unwrap_or_else(|_| DEFAULT_MAX_UPLOAD_BYTES.to_string())
            .parse()
            .map_err(|_| "Invalid MAX_UPLOAD_BYTES")?;

        let max_analysis_chars = env::var("MAX_ANALYSIS_CHARS")
            .unwrap_or_else(|_| DEFAULT_MAX_ANALYSIS_CHARS.to_string())
            .parse()
            .map_err(|_| "Invalid MAX_ANALYSIS_CHARS")?;

        let http_timeout_secs = env::var("HTTP_TIMEOUT_SECS")
            .unwrap_or_else(|_| DEFAULT_HTTP_TIMEOUT_SECS.to_string())
            .parse()
            .map_err(|_| "Invalid HTTP_TIMEOUT_SECS")?;

        let credits_per_purchase = env::var("CREDITS_PER_PURCHASE")
            .unwrap_or_else(|_| "1".to_string())
            .parse()
            .map_err(|_| "Invalid CREDITS_PER_PURCHASE")?;

        let analysis_requires_credit = parse_flag(
            &env::var("ANALYSIS_REQUIRES_CREDIT").unwrap_or_default(),
        )
        .ok_or("Invalid ANALYSIS_REQUIRES_CREDIT")?;

        Ok(Config {
            server_host,
            server_port,
            database_url,
            allowed_origins,
            environment,
            frontend_url,
            static_dir,
            max_upload_bytes,
            max_analysis_chars,
            http_timeout_secs,
            credits_per_purchase,
            analysis_requires_credit,
            firebase,
            stripe,
            openai,
        })
    }

    /// Get server address as string
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    /// Where the embedded checkout sends the browser after payment
    pub fn checkout_return_url(&self) -> String {
        format!(
            "{}/return?session_id={{CHECKOUT_SESSION_ID}}",
            self.frontend_url
        )
    }
}

/// Private keys pasted into env files usually carry literal `\n` sequences
fn unescape_private_key(raw: &str) -> String {
    raw.replace("\\n", "\n")
}

/// Empty means unset (false)
fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "" | "0" | "false" | "no" | "off" => Some(false),
        "1" | "true" | "yes" | "on" => Some(true),
        _ => None,
    }
}
