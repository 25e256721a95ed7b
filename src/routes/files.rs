use axum::{
    extract::{multipart::MultipartError, Multipart, Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use serde::Serialize;

use crate::constants::{ERR_MULTIPLE_FILES, ERR_NO_FILE, PDF_MIME_TYPE, UPLOAD_FIELD_NAME};
use crate::error::{AppError, Result};
use crate::models::file::storage_path;
use crate::models::{FileRecord, FileSummary, NewFile};
use crate::routes::auth::current_user;
use crate::services::{pdf, Principal};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub file: FileRecord,
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct ListFilesResponse {
    pub files: Vec<FileSummary>,
}

#[derive(Debug, Serialize)]
pub struct DeleteFileResponse {
    pub success: bool,
}

/// File part pulled out of the multipart body
#[derive(Debug)]
struct UploadedPart {
    name: String,
    mime_type: String,
    data: Vec<u8>,
}

/// Upload an inspection report
///
/// Accepts a multipart body with exactly one file part. PDFs have their
/// text extracted before the bytes go to object storage; other types are
/// stored without text.
pub async fn upload_file(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>)> {
    let user = current_user(&state, &principal).await?;
    let mut part = read_single_file(multipart).await?;

    let text_content = if part.mime_type == PDF_MIME_TYPE {
        let data = std::mem::take(&mut part.data);
        let (data, extracted) = tokio::task::spawn_blocking(move || {
            let extracted = pdf::extract_text(&data);
            (data, extracted)
        })
        .await?;
        part.data = data;

        let text = extracted?;
        tracing::debug!("Extracted {} chars from {}", text.len(), part.name);
        Some(text)
    } else {
        None
    };

    let path = storage_path(user.id, Utc::now(), &part.name);
    let size_bytes = part.data.len() as i64;
    let stored = state
        .storage
        .put(&path, &part.mime_type, part.data)
        .await?;

    let new_file = NewFile {
        user_id: user.id,
        storage_path: stored.path.clone(),
        original_name: part.name,
        size_bytes,
        mime_type: part.mime_type,
        text_content,
    };

    let file = match state.store.insert_file(&new_file).await {
        Ok(file) => file,
        Err(e) => {
            if let Err(cleanup) = state.storage.delete(&stored.path).await {
                tracing::warn!(
                    "Failed to remove orphaned object {}: {}",
                    stored.path,
                    cleanup
                );
            }
            return Err(e);
        }
    };

    tracing::info!(
        "User {} uploaded file {} ({} bytes)",
        user.id,
        file.id,
        file.size_bytes
    );

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            file,
            url: stored.url,
        }),
    ))
}

pub async fn list_files(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<ListFilesResponse>> {
    let user = current_user(&state, &principal).await?;
    let files = state.store.list_files(user.id).await?;

    Ok(Json(ListFilesResponse {
        files: files.iter().map(FileSummary::from).collect(),
    }))
}

pub async fn get_file(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(file_id): Path<i64>,
) -> Result<Json<FileRecord>> {
    let user = current_user(&state, &principal).await?;
    let file = state
        .store
        .get_file(user.id, file_id)
        .await?
        .ok_or(AppError::FileNotFound)?;

    Ok(Json(file))
}

/// Delete a file and its analyses
///
/// The storage object is removed best-effort; the row is deleted even when
/// that fails.
pub async fn delete_file(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(file_id): Path<i64>,
) -> Result<Json<DeleteFileResponse>> {
    let user = current_user(&state, &principal).await?;
    let file = state
        .store
        .get_file(user.id, file_id)
        .await?
        .ok_or(AppError::FileNotFound)?;

    if let Err(e) = state.storage.delete(&file.storage_path).await {
        tracing::warn!("Failed to delete object {}: {}", file.storage_path, e);
    }

    if !state.store.delete_file(user.id, file_id).await? {
        return Err(AppError::FileNotFound);
    }

    tracing::info!("User {} deleted file {}", user.id, file_id);

    Ok(Json(DeleteFileResponse { success: true }))
}

/// Pull the one file part out of the body
///
/// Only parts carrying a file name count as files; plain form fields are
/// skipped.
async fn read_single_file(mut multipart: Multipart) -> Result<UploadedPart> {
    let mut found: Option<UploadedPart> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };

        if field.name() != Some(UPLOAD_FIELD_NAME) {
            tracing::debug!("Upload used field name {:?}", field.name());
        }

        if found.is_some() {
            return Err(AppError::InvalidInput(ERR_MULTIPLE_FILES.to_string()));
        }

        let mime_type = normalize_mime(field.content_type());
        let data = field.bytes().await.map_err(multipart_error)?;

        found = Some(UploadedPart {
            name: file_name,
            mime_type,
            data: data.to_vec(),
        });
    }

    found.ok_or_else(|| AppError::InvalidInput(ERR_NO_FILE.to_string()))
}

/// Essence of a Content-Type value: `Application/PDF; x=y` -> `application/pdf`
fn normalize_mime(content_type: Option<&str>) -> String {
    content_type
        .and_then(|value| value.split(';').next())
        .map(|essence| essence.trim().to_ascii_lowercase())
        .filter(|essence| !essence.is_empty())
        .unwrap_or_else(|| "application/octet-stream".to_string())
}

fn multipart_error(error: MultipartError) -> AppError {
    if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge
    } else {
        AppError::InvalidInput(error.body_text())
    }
}
