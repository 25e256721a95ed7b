use chrono::{DateTime, Utc};
use serde::Serialize;

/// Uploaded report row
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub id: i64,
    /// Owning user (users.id)
    pub user_id: i64,
    /// Object path in the storage bucket
    pub storage_path: String,
    pub original_name: String,
    pub size_bytes: i64,
    pub mime_type: String,
    /// Extracted text; None for non-PDF uploads
    pub text_content: Option<String>,
    /// Raw analysis JSON as returned by the model
    pub ai_analysis: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Listing entry (without the potentially large text body)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSummary {
    pub id: i64,
    pub original_name: String,
    pub size_bytes: i64,
    pub mime_type: String,
    pub has_text: bool,
    pub has_analysis: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&FileRecord> for FileSummary {
    fn from(file: &FileRecord) -> Self {
        Self {
            id: file.id,
            original_name: file.original_name.clone(),
            size_bytes: file.size_bytes,
            mime_type: file.mime_type.clone(),
            has_text: file.text_content.is_some(),
            has_analysis: file.ai_analysis.is_some(),
            created_at: file.created_at,
        }
    }
}

/// Values for inserting a freshly uploaded report
#[derive(Debug, Clone)]
pub struct NewFile {
    pub user_id: i64,
    pub storage_path: String,
    pub original_name: String,
    pub size_bytes: i64,
    pub mime_type: String,
    pub text_content: Option<String>,
}

/// Build the object path for an upload: `users/<user>/<millis>-<name>`
pub fn storage_path(user_id: i64, uploaded_at: DateTime<Utc>, original_name: &str) -> String {
    format!(
        "users/{}/{}-{}",
        user_id,
        uploaded_at.timestamp_millis(),
        sanitize_file_name(original_name)
    )
}

/// Reduce a client-supplied file name to a safe single path segment
fn sanitize_file_name(name: &str) -> String {
    // Browsers on Windows may send the full path
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let cleaned = cleaned.trim_matches('.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}
