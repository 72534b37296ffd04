//! Direct image-model backend: one `generateContent` call per page.
//!
//! The request carries a single user turn with two parts, the text prompt from
//! [`crate::prompts`] and the cropped photo as inline data, and asks for an
//! image-only response. The first inline image part of the first candidate is
//! the coloring page. A response without one (safety block, text-only answer)
//! is a [`ColoringError::ConversionFailure`]; a 4xx the service will never
//! accept is a [`ColoringError::RequestRejected`] and is not retried.

use crate::config::ColoringConfig;
use crate::error::ColoringError;
use crate::pipeline::encode::EncodedImage;
use crate::pipeline::service::{ConversionRequest, PageGenerator};
use crate::prompts::build_prompt;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Public endpoint of the hosted generative-language API.
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Calls the hosted image model directly.
pub struct GeminiGenerator {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
    system_prompt: Option<String>,
}

impl GeminiGenerator {
    pub fn new(api_key: impl Into<String>, config: &ColoringConfig) -> Result<Self, ColoringError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ColoringError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: api_key.into(),
            model: config.model_or_default().to_string(),
            system_prompt: config.system_prompt.clone(),
        })
    }

    /// Point at a different API base (proxies, test servers).
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.api_base, self.model)
    }

    fn build_body(&self, request: &ConversionRequest) -> GenerateRequest {
        let prompt = build_prompt(
            self.system_prompt.as_deref(),
            request.style,
            request.difficulty,
            request.notes.as_deref(),
        );
        GenerateRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![
                    Part {
                        text: Some(prompt),
                        inline_data: None,
                    },
                    Part {
                        text: None,
                        inline_data: Some(InlineData {
                            mime_type: request.image.mime_type.clone(),
                            data: request.image.data.clone(),
                        }),
                    },
                ],
            }],
            generation_config: GenerationConfig {
                response_modalities: vec!["IMAGE".to_string()],
            },
        }
    }

    async fn call(&self, request: &ConversionRequest) -> Result<EncodedImage, ColoringError> {
        let body = self.build_body(request);
        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ColoringError::ConversionFailure {
                message: format!("request failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            let text = response.text().await.unwrap_or_default();
            return Err(status_error(status, retry_after_secs, text));
        }

        let parsed: GenerateResponse =
            response
                .json()
                .await
                .map_err(|e| ColoringError::ConversionFailure {
                    message: format!("unreadable response: {e}"),
                })?;
        extract_image(parsed)
    }
}

impl PageGenerator for GeminiGenerator {
    fn generate<'a>(
        &'a self,
        request: &'a ConversionRequest,
    ) -> BoxFuture<'a, Result<EncodedImage, ColoringError>> {
        Box::pin(self.call(request))
    }
}

/// Map a non-success HTTP status to the error taxonomy.
pub(crate) fn status_error(
    status: reqwest::StatusCode,
    retry_after_secs: Option<u64>,
    body: String,
) -> ColoringError {
    let detail: String = body.chars().take(300).collect();
    match status.as_u16() {
        401 | 403 => ColoringError::AuthError { detail },
        429 => ColoringError::RateLimitExceeded { retry_after_secs },
        408 => ColoringError::ConversionFailure {
            message: format!("HTTP {status}: {detail}"),
        },
        code @ 400..=499 => ColoringError::RequestRejected {
            status: code,
            detail,
        },
        _ => ColoringError::ConversionFailure {
            message: format!("HTTP {status}: {detail}"),
        },
    }
}

fn extract_image(response: GenerateResponse) -> Result<EncodedImage, ColoringError> {
    let candidate = response.candidates.into_iter().next();
    let finish_reason = candidate.as_ref().and_then(|c| c.finish_reason.clone());
    let image = candidate
        .and_then(|c| c.content)
        .into_iter()
        .flat_map(|c| c.parts)
        .find_map(|p| p.inline_data.filter(|d| !d.data.is_empty()));

    match image {
        Some(data) => {
            debug!("Model returned {} ({} bytes base64)", data.mime_type, data.data.len());
            Ok(EncodedImage::new(data.mime_type, data.data))
        }
        None => Err(ColoringError::ConversionFailure {
            message: match finish_reason {
                Some(reason) => format!("no image in response (finish reason: {reason})"),
                None => "no image in response".to_string(),
            },
        }),
    }
}

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}
