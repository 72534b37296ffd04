//! The conversion-service boundary.
//!
//! The wizard only ever talks to a [`ColoringService`]: convert a batch,
//! regenerate one. It is injected, never looked up globally, so tests can
//! drive the wizard with an in-memory fake.
//!
//! Two ways to provide one:
//!
//! * [`GeneratorService`] wraps a per-image [`PageGenerator`] (such as
//!   [`crate::pipeline::gemini::GeminiGenerator`]) and does the fan-out
//!   locally with a concurrency cap and per-call timeout.
//! * [`crate::pipeline::endpoint::EndpointService`] forwards whole batches to
//!   a hosted endpoint that does the fan-out itself.

use crate::config::{ColoringConfig, Difficulty, Style};
use crate::convert::{convert_all, regenerate};
use crate::error::ColoringError;
use crate::pipeline::encode::EncodedImage;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One image to convert, with everything the model needs to know about it.
///
/// Immutable once built; a retry re-sends the same request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionRequest {
    pub image: EncodedImage,
    pub style: Style,
    pub difficulty: Difficulty,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl ConversionRequest {
    pub fn new(image: EncodedImage, style: Style, difficulty: Difficulty) -> Self {
        Self {
            image,
            style,
            difficulty,
            notes: None,
        }
    }

    /// Attach free-text guidance. Blank notes are dropped.
    pub fn with_notes(mut self, notes: Option<&str>) -> Self {
        self.notes = notes
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);
        self
    }
}

/// The two operations the wizard needs from the outside world.
pub trait ColoringService: Send + Sync {
    /// Convert every image; returns exactly `images.len()` results in input
    /// order, or fails as a whole.
    fn convert_batch<'a>(
        &'a self,
        images: &'a [EncodedImage],
        style: Style,
        difficulty: Difficulty,
    ) -> BoxFuture<'a, Result<Vec<EncodedImage>, ColoringError>>;

    /// Produce a fresh rendering of one image, optionally guided by notes.
    fn regenerate_one<'a>(
        &'a self,
        image: &'a EncodedImage,
        style: Style,
        difficulty: Difficulty,
        notes: Option<&'a str>,
    ) -> BoxFuture<'a, Result<EncodedImage, ColoringError>>;
}

/// A single-image generator: one request in, one coloring page out.
pub trait PageGenerator: Send + Sync {
    fn generate<'a>(
        &'a self,
        request: &'a ConversionRequest,
    ) -> BoxFuture<'a, Result<EncodedImage, ColoringError>>;
}

impl<G: PageGenerator + ?Sized> PageGenerator for Arc<G> {
    fn generate<'a>(
        &'a self,
        request: &'a ConversionRequest,
    ) -> BoxFuture<'a, Result<EncodedImage, ColoringError>> {
        (**self).generate(request)
    }
}

/// Adapts a [`PageGenerator`] into a [`ColoringService`] with local fan-out.
pub struct GeneratorService<G> {
    generator: G,
    config: ColoringConfig,
}

impl<G: PageGenerator> GeneratorService<G> {
    pub fn new(generator: G, config: ColoringConfig) -> Self {
        Self { generator, config }
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }
}

impl<G: PageGenerator> ColoringService for GeneratorService<G> {
    fn convert_batch<'a>(
        &'a self,
        images: &'a [EncodedImage],
        style: Style,
        difficulty: Difficulty,
    ) -> BoxFuture<'a, Result<Vec<EncodedImage>, ColoringError>> {
        Box::pin(async move {
            let requests = images
                .iter()
                .cloned()
                .map(|img| ConversionRequest::new(img, style, difficulty))
                .collect();
            convert_all(&self.generator, requests, &self.config).await
        })
    }

    fn regenerate_one<'a>(
        &'a self,
        image: &'a EncodedImage,
        style: Style,
        difficulty: Difficulty,
        notes: Option<&'a str>,
    ) -> BoxFuture<'a, Result<EncodedImage, ColoringError>> {
        Box::pin(async move {
            let request = ConversionRequest::new(image.clone(), style, difficulty).with_notes(notes);
            regenerate(&self.generator, request, &self.config).await
        })
    }
}
