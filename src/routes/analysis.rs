use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::Serialize;
use serde_json::Value;

use crate::constants::ERR_NO_TEXT_CONTENT;
use crate::error::{AppError, Result};
use crate::models::{InspectionAnalysis, ReportView, User};
use crate::routes::auth::current_user;
use crate::services::{Principal, ProviderError};
use crate::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResponse {
    pub file_id: i64,
    pub model: String,
    pub analysis: InspectionAnalysis,
}

/// Run the model over a file's extracted text and store the result
///
/// When credit metering is enabled one credit is taken before the model is
/// called and given back if the call or the save fails.
pub async fn analyze_file(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(file_id): Path<i64>,
) -> Result<Json<AnalyzeResponse>> {
    let user = current_user(&state, &principal).await?;
    let file = state
        .store
        .get_file(user.id, file_id)
        .await?
        .ok_or(AppError::FileNotFound)?;

    let text = match file.text_content.as_deref() {
        Some(text) if !text.trim().is_empty() => text,
        _ => return Err(AppError::InvalidInput(ERR_NO_TEXT_CONTENT.to_string())),
    };

    let chars = text.chars().count();
    if chars > state.config.max_analysis_chars {
        tracing::warn!(
            "File {} has {} chars of text, over the {} limit",
            file_id,
            chars,
            state.config.max_analysis_chars
        );
        return Err(AppError::PayloadTooLarge);
    }

    let metered = state.config.analysis_requires_credit;
    if metered && !state.store.deduct_credit(user.id).await? {
        return Err(AppError::InsufficientCredits);
    }

    match run_analysis(&state, &user, file_id, text).await {
        Ok(analysis) => Ok(Json(AnalyzeResponse {
            file_id,
            model: state.analyzer.model().to_string(),
            analysis,
        })),
        Err(e) => {
            if metered {
                if let Err(refund) = state.store.refund_credit(user.id).await {
                    tracing::error!("Failed to refund credit to user {}: {:?}", user.id, refund);
                }
            }
            Err(e)
        }
    }
}

async fn run_analysis(
    state: &AppState,
    user: &User,
    file_id: i64,
    text: &str,
) -> Result<InspectionAnalysis> {
    tracing::info!("Analyzing file {} for user {}", file_id, user.id);

    let raw = state.analyzer.analyze(text).await?;
    let analysis =
        InspectionAnalysis::parse(&raw).map_err(|e| AppError::Provider(ProviderError::InvalidResponse(e)))?;

    let saved = state
        .store
        .save_analysis(user.id, file_id, &raw, state.analyzer.model())
        .await?;
    if !saved {
        // Deleted while the model was running
        return Err(AppError::FileNotFound);
    }

    tracing::info!(
        "Stored analysis for file {} ({} findings)",
        file_id,
        analysis.findings.len()
    );

    Ok(analysis)
}

/// Stored analysis JSON for a file
pub async fn get_analysis(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(file_id): Path<i64>,
) -> Result<Json<Value>> {
    let raw = stored_analysis(&state, &principal, file_id).await?;
    Ok(Json(serde_json::from_str(&raw)?))
}

/// Cost estimate, prioritized findings and negotiation guide for a file
pub async fn get_report(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(file_id): Path<i64>,
) -> Result<Json<ReportView>> {
    let raw = stored_analysis(&state, &principal, file_id).await?;
    let analysis: InspectionAnalysis = serde_json::from_str(&raw)?;
    Ok(Json(ReportView::from_analysis(&analysis)))
}

async fn stored_analysis(state: &AppState, principal: &Principal, file_id: i64) -> Result<String> {
    let user = current_user(state, principal).await?;
    let file = state
        .store
        .get_file(user.id, file_id)
        .await?
        .ok_or(AppError::FileNotFound)?;

    file.ai_analysis.ok_or(AppError::AnalysisNotFound)
}
