//! Hosted conversion endpoint client.
//!
//! The endpoint owns the fan-out, so a batch is a single HTTP call:
//!
//! ```text
//! POST {base}/convert     { images: [data-uri..], style, difficulty }  -> { images: [data-uri..] }
//! POST {base}/regenerate  { image: data-uri, style, difficulty, notes? } -> { image: data-uri }
//! ```
//!
//! `style` is `"outline"` or `"realistic"`; `difficulty` is the integer 1..=5.

use crate::config::{ColoringConfig, Difficulty, Style};
use crate::error::ColoringError;
use crate::pipeline::encode::EncodedImage;
use crate::pipeline::gemini::status_error;
use crate::pipeline::service::ColoringService;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// [`ColoringService`] backed by a hosted `/convert` + `/regenerate` pair.
pub struct EndpointService {
    client: reqwest::Client,
    base: String,
    timeout_secs: u64,
}

impl EndpointService {
    /// `base` is the URL the two routes hang off, e.g. `https://host/api`.
    pub fn new(base: impl Into<String>, config: &ColoringConfig) -> Result<Self, ColoringError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.api_timeout_secs))
            .build()
            .map_err(|e| ColoringError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            base: base.into().trim_end_matches('/').to_string(),
            timeout_secs: config.api_timeout_secs,
        })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    fn route(&self, name: &str) -> String {
        format!("{}/{}", self.base, name)
    }

    async fn post<B: Serialize, R: DeserializeOwned>(
        &self,
        route: &str,
        body: &B,
    ) -> Result<R, ColoringError> {
        let url = self.route(route);
        let response = self.client.post(&url).json(body).send().await.map_err(|e| {
            if e.is_timeout() {
                ColoringError::Timeout {
                    index: 0,
                    secs: self.timeout_secs,
                }
            } else {
                ColoringError::ConversionFailure {
                    message: format!("request to {url} failed: {e}"),
                }
            }
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

        response
            .json()
            .await
            .map_err(|e| ColoringError::ConversionFailure {
                message: format!("unreadable response from {url}: {e}"),
            })
    }

    async fn convert(
        &self,
        images: &[EncodedImage],
        style: Style,
        difficulty: Difficulty,
    ) -> Result<Vec<EncodedImage>, ColoringError> {
        info!("Sending {} images to {}", images.len(), self.route("convert"));
        let body = ConvertBody {
            images,
            style,
            difficulty,
        };
        let reply: ConvertReply = self.post("convert", &body).await?;
        debug!("Endpoint returned {} images", reply.images.len());
        one_per_input(images.len(), reply.images)
    }

    async fn regenerate(
        &self,
        image: &EncodedImage,
        style: Style,
        difficulty: Difficulty,
        notes: Option<&str>,
    ) -> Result<EncodedImage, ColoringError> {
        let body = RegenerateBody {
            image,
            style,
            difficulty,
            notes: notes.map(str::trim).filter(|n| !n.is_empty()),
        };
        let reply: RegenerateReply = self.post("regenerate", &body).await?;
        Ok(reply.image)
    }
}

/// A batch reply must hold exactly one page per photo sent.
fn one_per_input(
    expected: usize,
    pages: Vec<EncodedImage>,
) -> Result<Vec<EncodedImage>, ColoringError> {
    if pages.len() != expected {
        return Err(ColoringError::CountMismatch {
            expected,
            actual: pages.len(),
        });
    }
    Ok(pages)
}

impl ColoringService for EndpointService {
    fn convert_batch<'a>(
        &'a self,
        images: &'a [EncodedImage],
        style: Style,
        difficulty: Difficulty,
    ) -> BoxFuture<'a, Result<Vec<EncodedImage>, ColoringError>> {
        Box::pin(self.convert(images, style, difficulty))
    }

    fn regenerate_one<'a>(
        &'a self,
        image: &'a EncodedImage,
        style: Style,
        difficulty: Difficulty,
        notes: Option<&'a str>,
    ) -> BoxFuture<'a, Result<EncodedImage, ColoringError>> {
        Box::pin(self.regenerate(image, style, difficulty, notes))
    }
}

#[derive(Debug, Serialize)]
struct ConvertBody<'a> {
    images: &'a [EncodedImage],
    style: Style,
    difficulty: Difficulty,
}

#[derive(Debug, Deserialize)]
struct ConvertReply {
    images: Vec<EncodedImage>,
}

#[derive(Debug, Serialize)]
struct RegenerateBody<'a> {
    image: &'a EncodedImage,
    style: Style,
    difficulty: Difficulty,
    #[serde(skip_serializing_if = "Option::is_none")]
    notes: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct RegenerateReply {
    image: EncodedImage,
}
