//! Batch conversion: fan requests out to a generator and gather the pages.
//!
//! A batch is all-or-nothing. Up to `concurrency` calls run at once; the first
//! call to fail (after its retries, if any are configured) fails the batch and
//! drops every call still in flight. On success the pages come back in the
//! order the requests went in, one page per request.

use crate::config::ColoringConfig;
use crate::error::ColoringError;
use crate::pipeline::encode::EncodedImage;
use crate::pipeline::endpoint::EndpointService;
use crate::pipeline::gemini::GeminiGenerator;
use crate::pipeline::service::{ColoringService, ConversionRequest, GeneratorService, PageGenerator};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, info, warn};

/// Convert every request, all-or-nothing, preserving input order.
///
/// # Errors
/// Returns the first failure observed. [`ColoringError::CountMismatch`] is
/// returned if the gathered pages somehow do not pair 1:1 with the requests.
pub async fn convert_all<G: PageGenerator + ?Sized>(
    generator: &G,
    requests: Vec<ConversionRequest>,
    config: &ColoringConfig,
) -> Result<Vec<EncodedImage>, ColoringError> {
    let total = requests.len();
    let start = Instant::now();
    info!(
        "Converting {} images (concurrency {}, timeout {}s)",
        total, config.concurrency, config.api_timeout_secs
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(total);
    }

    let calls: Vec<_> = requests
        .iter()
        .enumerate()
        .map(move |(index, request)| async move {
            if let Some(ref cb) = config.progress_callback {
                cb.on_image_start(index, total);
            }
            let result = call_with_policy(generator, request, index, config).await;
            if let Some(ref cb) = config.progress_callback {
                match &result {
                    Ok(img) => cb.on_image_complete(index, total, img.data.len()),
                    Err(e) => cb.on_image_error(index, total, &e.to_string()),
                }
            }
            result.map(|img| (index, img))
        })
        .collect();
    let gathered: Result<Vec<(usize, EncodedImage)>, ColoringError> = stream::iter(calls)
        .buffer_unordered(config.concurrency.max(1))
        .try_collect()
        .await;

    let mut pages = match gathered {
        Ok(pages) => pages,
        Err(e) => {
            warn!("Batch of {} failed: {}", total, e);
            if let Some(ref cb) = config.progress_callback {
                cb.on_batch_complete(total, 0);
            }
            return Err(e);
        }
    };

    if pages.len() != total {
        return Err(ColoringError::CountMismatch {
            expected: total,
            actual: pages.len(),
        });
    }
    pages.sort_by_key(|(index, _)| *index);

    info!("Converted {} images in {}ms", total, start.elapsed().as_millis());
    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_complete(total, total);
    }

    Ok(pages.into_iter().map(|(_, img)| img).collect())
}

/// Run a single request (regeneration) under the same timeout and retry policy.
pub async fn regenerate<G: PageGenerator + ?Sized>(
    generator: &G,
    request: ConversionRequest,
    config: &ColoringConfig,
) -> Result<EncodedImage, ColoringError> {
    info!(
        "Regenerating one image ({}, {}, notes: {})",
        request.style,
        request.difficulty.label(),
        request.notes.is_some()
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(1);
        cb.on_image_start(0, 1);
    }

    let result = call_with_policy(generator, &request, 0, config).await;

    if let Some(ref cb) = config.progress_callback {
        match &result {
            Ok(img) => {
                cb.on_image_complete(0, 1, img.data.len());
                cb.on_batch_complete(1, 1);
            }
            Err(e) => {
                cb.on_image_error(0, 1, &e.to_string());
                cb.on_batch_complete(1, 0);
            }
        }
    }
    result
}

/// Resolve the conversion service, from most-specific to least-specific.
///
/// 1. **Injected service** (`config.service`), used as-is. Tests and embedders
///    with their own backend go here.
/// 2. **Hosted endpoint** (`config.endpoint`, then `COLORBOOK_ENDPOINT`).
/// 3. **Direct model access** with an API key (`config.api_key`, then
///    `GEMINI_API_KEY`, then `GOOGLE_API_KEY`). The model comes from
///    `config.model`, then `COLORBOOK_MODEL`, then the default.
pub fn resolve_service(config: &ColoringConfig) -> Result<Arc<dyn ColoringService>, ColoringError> {
    if let Some(ref service) = config.service {
        return Ok(Arc::clone(service));
    }

    if let Some(base) = config.endpoint.clone().or_else(|| non_empty_env("COLORBOOK_ENDPOINT")) {
        info!("Using conversion endpoint {}", base);
        return Ok(Arc::new(EndpointService::new(base, config)?));
    }

    let key = config
        .api_key
        .clone()
        .or_else(|| non_empty_env("GEMINI_API_KEY"))
        .or_else(|| non_empty_env("GOOGLE_API_KEY"));
    if let Some(key) = key {
        let mut config = config.clone();
        if config.model.is_none() {
            config.model = non_empty_env("COLORBOOK_MODEL");
        }
        let generator = GeminiGenerator::new(key, &config)?;
        info!("Using image model {}", generator.model());
        return Ok(Arc::new(GeneratorService::new(generator, config)));
    }

    Err(ColoringError::ServiceNotConfigured {
        hint: "Set COLORBOOK_ENDPOINT to a hosted conversion endpoint, or set \
               GEMINI_API_KEY (or GOOGLE_API_KEY) to call the image model directly."
            .to_string(),
    })
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// One generator call with per-attempt timeout and optional retries.
///
/// Only transient failures are retried. Backoff doubles after each attempt:
/// with the default 500 ms base the waits are 500 ms → 1 s → 2 s.
async fn call_with_policy<G: PageGenerator + ?Sized>(
    generator: &G,
    request: &ConversionRequest,
    index: usize,
    config: &ColoringConfig,
) -> Result<EncodedImage, ColoringError> {
    let limit = Duration::from_secs(config.api_timeout_secs);
    let mut last_err: Option<ColoringError> = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = config.retry_backoff_ms.saturating_mul(2u64.saturating_pow(attempt - 1));
            warn!(
                "Image {}: retry {}/{} after {}ms",
                index, attempt, config.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        let started = Instant::now();
        let outcome = match timeout(limit, generator.generate(request)).await {
            Ok(Ok(img)) if img.data.is_empty() => Err(ColoringError::ConversionFailure {
                message: format!("empty image returned for image {index}"),
            }),
            Ok(result) => result,
            Err(_) => Err(ColoringError::Timeout {
                index,
                secs: config.api_timeout_secs,
            }),
        };

        match outcome {
            Ok(img) => {
                debug!(
                    "Image {}: {} bytes base64 in {:?}",
                    index,
                    img.data.len(),
                    started.elapsed()
                );
                return Ok(img);
            }
            Err(e) => {
                warn!("Image {}: attempt {} failed — {}", index, attempt + 1, e);
                let transient = e.is_transient();
                last_err = Some(e);
                if !transient {
                    break;
                }
            }
        }
    }

    Err(last_err.unwrap_or_else(|| ColoringError::Internal(format!("image {index}: no attempt made"))))
}
