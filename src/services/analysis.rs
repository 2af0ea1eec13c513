use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::models::metadata::{
    ImagePayload, RawMetadata, StockMetadata, MAX_TAG_COUNT, MAX_TITLE_CHARS, TARGET_TAG_COUNT,
};

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-3-flash-preview";

const TEMPERATURE: f32 = 0.4;

/// Turns one image into marketplace metadata.
///
/// Implementations must settle exactly once per call. Latency and
/// thread safety are theirs to handle; the scheduler only bounds how many
/// calls are outstanding.
#[async_trait]
pub trait AnalysisClient: Send + Sync {
    async fn analyze(&self, image: &ImagePayload) -> Result<StockMetadata, AnalysisError>;
}

/// Client for the Gemini `generateContent` REST endpoint.
pub struct GeminiClient {
    http: Client,
    base_url: String,
    model: String,
    api_key: String,
    tag_cap: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Serialize, Deserialize, Default)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    message: String,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            model: DEFAULT_GEMINI_MODEL.to_string(),
            api_key: api_key.into(),
            tag_cap: MAX_TAG_COUNT,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(&config.gemini_api_key)
            .with_base_url(&config.gemini_base_url)
            .with_model(&config.gemini_model)
            .with_tag_cap(config.tag_cap)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_tag_cap(mut self, tag_cap: usize) -> Self {
        self.tag_cap = tag_cap.min(MAX_TAG_COUNT);
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }
}

#[async_trait]
impl AnalysisClient for GeminiClient {
    async fn analyze(&self, image: &ImagePayload) -> Result<StockMetadata, AnalysisError> {
        let request_body = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![
                    Part {
                        text: None,
                        inline_data: Some(InlineData {
                            mime_type: image.content_type.clone(),
                            data: base64::engine::general_purpose::STANDARD.encode(&image.bytes),
                        }),
                    },
                    Part {
                        text: Some(metadata_prompt()),
                        inline_data: None,
                    },
                ],
            }],
            generation_config: GenerationConfig {
                temperature: TEMPERATURE,
            },
        };

        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorEnvelope>(&body)
                .map(|envelope| envelope.error.message)
                .unwrap_or(body);
            return Err(AnalysisError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: GenerateContentResponse = response.json().await?;
        let text = response_text(&body).ok_or(AnalysisError::EmptyResponse)?;

        parse_metadata(&text, self.tag_cap)
    }
}

fn metadata_prompt() -> String {
    format!(
        concat!(
            "Analyze this image for Adobe Stock metadata.\n\n",
            "Return ONLY a valid JSON object with this exact structure:\n",
            "{{\n",
            "  \"title\": \"A full sentence commercially viable title (max {max_title} chars)\",\n",
            "  \"tags\": [\"tag1\", \"tag2\", ... exactly {tags} tags]\n",
            "}}\n\n",
            "Requirements:\n",
            "1. Title: Descriptive, commercial, full sentence.\n",
            "2. Keywords: EXACTLY {tags} unique tags. Lowercase.\n",
            "3. Do not include Markdown formatting like ```json. Just the raw JSON."
        ),
        max_title = MAX_TITLE_CHARS,
        tags = TARGET_TAG_COUNT,
    )
}

/// Concatenated text parts of the first candidate.
fn response_text(response: &GenerateContentResponse) -> Option<String> {
    let content = response.candidates.first()?.content.as_ref()?;
    let text: String = content
        .parts
        .iter()
        .filter_map(|part| part.text.as_deref())
        .collect();

    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Removes a Markdown code fence the model may wrap its JSON in.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let inner = if let Some(rest) = trimmed.strip_prefix("```json") {
        rest
    } else if let Some(rest) = trimmed.strip_prefix("```") {
        rest
    } else {
        return trimmed;
    };

    inner.trim_end().strip_suffix("```").unwrap_or(inner).trim()
}

/// Parses model output into stored metadata.
pub fn parse_metadata(text: &str, tag_cap: usize) -> Result<StockMetadata, AnalysisError> {
    let raw: RawMetadata = serde_json::from_str(strip_code_fence(text))?;
    Ok(raw.normalize(tag_cap))
}

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Gemini API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("No response text from Gemini")]
    EmptyResponse,

    #[error("Failed to parse model response as metadata: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Analysis timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Rejected(String),
}
