//! Object storage for uploaded reports (Firebase Storage / Google Cloud Storage).

use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;

use super::{check_status, ProviderError};
use crate::config::FirebaseConfig;

const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const STORAGE_SCOPE: &str = "https://www.googleapis.com/auth/devstorage.read_write";
const GCS_API: &str = "https://storage.googleapis.com";
const FIREBASE_STORAGE_API: &str = "https://firebasestorage.googleapis.com";

/// Result of a successful upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub path: String,
    /// Long-lived read link handed to the browser
    pub url: String,
}

/// Storage backend trait for uploaded report blobs
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store bytes at `path` and return a read URL for them
    async fn put(
        &self,
        path: &str,
        content_type: &str,
        data: Vec<u8>,
    ) -> Result<StoredObject, ProviderError>;

    async fn delete(&self, path: &str) -> Result<(), ProviderError>;
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

struct AccessToken {
    value: String,
    expires_at: Instant,
}

/// Google Cloud Storage client authenticated as the Firebase service account
///
/// Read links use Firebase download tokens: a random token stored in the
/// object's metadata that grants read access until it is revoked.
pub struct GcsObjectStore {
    http: reqwest::Client,
    bucket: String,
    client_email: String,
    signing_key: EncodingKey,
    token: Mutex<Option<AccessToken>>,
}

impl GcsObjectStore {
    pub fn new(http: reqwest::Client, config: &FirebaseConfig) -> Result<Self, ProviderError> {
        let signing_key = EncodingKey::from_rsa_pem(config.private_key.as_bytes())
            .map_err(|e| ProviderError::Credentials(format!("invalid service account key: {}", e)))?;

        Ok(Self {
            http,
            bucket: config.storage_bucket.clone(),
            client_email: config.client_email.clone(),
            signing_key,
            token: Mutex::new(None),
        })
    }

    /// OAuth access token via the JWT bearer grant, cached until shortly
    /// before it expires
    async fn access_token(&self) -> Result<String, ProviderError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        let now = chrono::Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: &self.client_email,
            scope: STORAGE_SCOPE,
            aud: TOKEN_URL,
            iat: now,
            exp: now + 3600,
        };
        let assertion = encode(&Header::new(Algorithm::RS256), &claims, &self.signing_key)
            .map_err(|e| ProviderError::Credentials(format!("failed to sign assertion: {}", e)))?;

        let response = self
            .http
            .post(TOKEN_URL)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await?;
        let token: TokenResponse = check_status("storage-auth", response).await?.json().await?;

        let lifetime = Duration::from_secs(token.expires_in.saturating_sub(60));
        *cached = Some(AccessToken {
            value: token.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });

        Ok(token.access_token)
    }

    fn object_url(&self, path: &str) -> Result<Url, ProviderError> {
        object_url(GCS_API, &["storage", "v1", "b", &self.bucket, "o", path])
    }

    async fn set_download_token(
        &self,
        path: &str,
        access_token: &str,
        download_token: &str,
    ) -> Result<(), ProviderError> {
        let response = self
            .http
            .patch(self.object_url(path)?)
            .bearer_auth(access_token)
            .json(&json!({
                "metadata": { "firebaseStorageDownloadTokens": download_token }
            }))
            .send()
            .await?;
        check_status("storage", response).await?;
        Ok(())
    }
}

/// Pass `result` through, deleting the already uploaded `path` first when it
/// is an error so a half-finished upload leaves nothing behind
async fn discard_on_error<S, T>(
    store: &S,
    path: &str,
    result: Result<T, ProviderError>,
) -> Result<T, ProviderError>
where
    S: ObjectStore + ?Sized,
{
    if let Err(e) = &result {
        tracing::warn!("Upload of {} failed after storing bytes: {}", path, e);
        if let Err(cleanup) = store.delete(path).await {
            tracing::error!("Failed to remove partial upload {}: {}", path, cleanup);
        }
    }
    result
}

#[async_trait]
impl ObjectStore for GcsObjectStore {
    async fn put(
        &self,
        path: &str,
        content_type: &str,
        data: Vec<u8>,
    ) -> Result<StoredObject, ProviderError> {
        let token = self.access_token().await?;
        let size = data.len();

        let mut upload_url = object_url(GCS_API, &["upload", "storage", "v1", "b", &self.bucket, "o"])?;
        upload_url
            .query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", path);

        let response = self
            .http
            .post(upload_url)
            .bearer_auth(&token)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(data)
            .send()
            .await?;
        check_status("storage", response).await?;

        let download_token = uuid::Uuid::new_v4().to_string();
        let tagged = self.set_download_token(path, &token, &download_token).await;
        discard_on_error(self, path, tagged).await?;

        tracing::info!("Stored object {} ({} bytes)", path, size);

        Ok(StoredObject {
            path: path.to_string(),
            url: download_url(&self.bucket, path, &download_token)?,
        })
    }

    async fn delete(&self, path: &str) -> Result<(), ProviderError> {
        let token = self.access_token().await?;
        let response = self
            .http
            .delete(self.object_url(path)?)
            .bearer_auth(&token)
            .send()
            .await?;

        // Already gone is as good as deleted
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            tracing::warn!("Object {} was already deleted", path);
            return Ok(());
        }
        check_status("storage", response).await?;

        tracing::info!("Deleted object {}", path);
        Ok(())
    }
}

/// Build `<base>/<segment>/...`, percent-encoding each segment (object
/// names keep their `/` encoded as `%2F`)
fn object_url(base: &str, segments: &[&str]) -> Result<Url, ProviderError> {
    let mut url = Url::parse(base).map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| ProviderError::InvalidResponse(format!("{} cannot be a base URL", base)))?
        .extend(segments);
    Ok(url)
}

fn download_url(bucket: &str, path: &str, token: &str) -> Result<String, ProviderError> {
    let mut url = object_url(FIREBASE_STORAGE_API, &["v0", "b", bucket, "o", path])?;
    url.query_pairs_mut()
        .append_pair("alt", "media")
        .append_pair("token", token);
    Ok(url.to_string())
}
