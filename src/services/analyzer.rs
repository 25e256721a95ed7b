//! Structured report analysis through the OpenAI chat completions API.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{check_status, ProviderError};
use crate::config::OpenAiConfig;
use crate::models::analysis::{response_schema, InspectionAnalysis};

const COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";

const SYSTEM_PROMPT: &str = "You are an expert home inspector and real estate repair estimator. \
You will receive the raw text of a home inspection report. The text was extracted from a PDF \
without layout, so tables and columns may be flattened. Extract the property details and the \
inspector's details exactly as written (use an empty string or null when absent). Summarize the \
overall condition, the major concerns and the maintenance outlook in plain language for a home \
buyer. List every deficiency the inspector reported as a finding: name the component (item), \
describe the issue, give the recommendation, choose the closest category, rate urgency from 1 \
(cosmetic) to 5 (safety hazard or imminent failure), and estimate the typical repair cost in \
whole US dollars for the property's region. Do not invent findings that are not in the report.";

/// Turns extracted report text into the analysis JSON document
#[async_trait]
pub trait ReportAnalyzer: Send + Sync {
    /// Returns the raw JSON text; callers persist it verbatim
    async fn analyze(&self, report_text: &str) -> Result<String, ProviderError>;

    /// Model identifier recorded alongside each analysis
    fn model(&self) -> &str;
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Message {
    content: Option<String>,
    refusal: Option<String>,
}

pub struct OpenAiAnalyzer {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiAnalyzer {
    pub fn new(http: reqwest::Client, config: &OpenAiConfig) -> Self {
        Self {
            http,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        }
    }

    fn request_body(&self, report_text: &str) -> serde_json::Value {
        json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": report_text }
            ],
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": "inspection_analysis",
                    "strict": true,
                    "schema": response_schema()
                }
            }
        })
    }
}

#[async_trait]
impl ReportAnalyzer for OpenAiAnalyzer {
    async fn analyze(&self, report_text: &str) -> Result<String, ProviderError> {
        tracing::info!(
            "Requesting analysis from {} ({} chars)",
            self.model,
            report_text.len()
        );

        let response = self
            .http
            .post(COMPLETIONS_URL)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(report_text))
            .send()
            .await?;
        let completion: CompletionResponse = check_status("openai", response).await?.json().await?;

        extract_content(completion)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Pull the JSON document out of a completion and check it against the schema
fn extract_content(completion: CompletionResponse) -> Result<String, ProviderError> {
    let choice = completion
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::InvalidResponse("completion has no choices".to_string()))?;

    if let Some(refusal) = choice.message.refusal {
        return Err(ProviderError::InvalidResponse(format!(
            "model refused: {}",
            refusal
        )));
    }

    // Truncated output cannot be valid JSON for the schema
    if choice.finish_reason.as_deref() == Some("length") {
        return Err(ProviderError::InvalidResponse(
            "completion truncated at token limit".to_string(),
        ));
    }

    let content = choice
        .message
        .content
        .ok_or_else(|| ProviderError::InvalidResponse("completion has no content".to_string()))?;

    InspectionAnalysis::parse(&content).map_err(ProviderError::InvalidResponse)?;

    Ok(content)
}
