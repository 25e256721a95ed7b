//! Firebase Authentication ID token verification.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::RwLock;

use super::{check_status, ProviderError};
use crate::constants::{SIGNING_KEY_CACHE_SECS, SIGNING_KEY_MIN_REFRESH_SECS};

const FIREBASE_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";

/// Verified caller identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// Identity provider uid
    pub uid: String,
    pub email: Option<String>,
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("unknown signing key '{0}'")]
    UnknownKey(String),

    #[error("failed to fetch signing keys: {0}")]
    KeyFetch(#[from] ProviderError),
}

/// Verifies bearer tokens with the identity provider
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Principal, AuthError>;
}

#[derive(Debug, Deserialize)]
struct Jwk {
    kid: String,
    n: String,
    e: String,
}

#[derive(Debug, Deserialize)]
struct JwkSet {
    keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize)]
struct FirebaseClaims {
    sub: String,
    email: Option<String>,
}

struct CachedKeys {
    fetched_at: Instant,
    keys: HashMap<String, DecodingKey>,
}

enum KeyLookup {
    Found(DecodingKey),
    Unknown,
    Refresh,
}

impl CachedKeys {
    fn lookup(cache: Option<&CachedKeys>, kid: &str) -> KeyLookup {
        let Some(cached) = cache else {
            return KeyLookup::Refresh;
        };
        let age = cached.fetched_at.elapsed();
        if age >= Duration::from_secs(SIGNING_KEY_CACHE_SECS) {
            return KeyLookup::Refresh;
        }
        match cached.keys.get(kid) {
            Some(key) => KeyLookup::Found(key.clone()),
            None if age < Duration::from_secs(SIGNING_KEY_MIN_REFRESH_SECS) => KeyLookup::Unknown,
            None => KeyLookup::Refresh,
        }
    }
}

/// Verifies Firebase ID tokens (RS256) against Google's published keys
pub struct FirebaseTokenVerifier {
    http: reqwest::Client,
    project_id: String,
    keys: RwLock<Option<CachedKeys>>,
}

impl FirebaseTokenVerifier {
    pub fn new(http: reqwest::Client, project_id: impl Into<String>) -> Self {
        Self {
            http,
            project_id: project_id.into(),
            keys: RwLock::new(None),
        }
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[self.project_id.as_str()]);
        validation.set_issuer(&[format!("https://securetoken.google.com/{}", self.project_id)]);
        validation
    }

    async fn fetch_keys(&self) -> Result<HashMap<String, DecodingKey>, AuthError> {
        tracing::debug!("Fetching identity provider signing keys");

        let response = self
            .http
            .get(FIREBASE_JWKS_URL)
            .send()
            .await
            .map_err(ProviderError::from)?;
        let jwks: JwkSet = check_status("identity", response)
            .await?
            .json()
            .await
            .map_err(ProviderError::from)?;

        let mut keys = HashMap::new();
        for jwk in jwks.keys {
            match DecodingKey::from_rsa_components(&jwk.n, &jwk.e) {
                Ok(key) => {
                    keys.insert(jwk.kid, key);
                }
                Err(e) => tracing::warn!("Skipping unusable signing key {}: {}", jwk.kid, e),
            }
        }

        Ok(keys)
    }

    /// Look up a signing key, refreshing the cache when stale or when `kid`
    /// is unknown (Google rotates keys roughly daily).
    ///
    /// Unknown kids refetch at most once per `SIGNING_KEY_MIN_REFRESH_SECS`,
    /// and only the task holding the write lock fetches.
    async fn key_for(&self, kid: &str) -> Result<DecodingKey, AuthError> {
        match CachedKeys::lookup(self.keys.read().await.as_ref(), kid) {
            KeyLookup::Found(key) => return Ok(key),
            KeyLookup::Unknown => return Err(AuthError::UnknownKey(kid.to_string())),
            KeyLookup::Refresh => {}
        }

        let mut cache = self.keys.write().await;
        // Another task may have refreshed while we waited
        match CachedKeys::lookup(cache.as_ref(), kid) {
            KeyLookup::Found(key) => return Ok(key),
            KeyLookup::Unknown => return Err(AuthError::UnknownKey(kid.to_string())),
            KeyLookup::Refresh => {}
        }

        let keys = self.fetch_keys().await?;
        let key = keys.get(kid).cloned();
        *cache = Some(CachedKeys {
            fetched_at: Instant::now(),
            keys,
        });

        key.ok_or_else(|| AuthError::UnknownKey(kid.to_string()))
    }
}

#[async_trait]
impl TokenVerifier for FirebaseTokenVerifier {
    async fn verify(&self, token: &str) -> Result<Principal, AuthError> {
        let header = decode_header(token).map_err(|e| AuthError::InvalidToken(e.to_string()))?;
        if header.alg != Algorithm::RS256 {
            return Err(AuthError::InvalidToken(format!(
                "unexpected algorithm {:?}",
                header.alg
            )));
        }
        let kid = header
            .kid
            .ok_or_else(|| AuthError::InvalidToken("missing kid".to_string()))?;

        let key = self.key_for(&kid).await?;
        let data = decode::<FirebaseClaims>(token, &key, &self.validation())
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        if data.claims.sub.is_empty() {
            return Err(AuthError::InvalidToken("empty subject".to_string()));
        }

        Ok(Principal {
            uid: data.claims.sub,
            email: data.claims.email,
        })
    }
}
