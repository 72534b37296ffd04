//! Error types for the colorbook library.
//!
//! A single fatal error type, [`ColoringError`], covers every stage of the
//! pipeline. Where an error lands decides its blast radius, not its type:
//!
//! * During batch conversion any error fails the whole batch and the wizard
//!   force-resets to `Idle`. There is no partial-success path.
//!
//! * During regeneration the error is scoped to the one gallery item being
//!   regenerated; the rest of the gallery is left untouched.
//!
//! * During cropping the error is returned to the caller and the wizard stays
//!   on the same image so it can be re-cropped.

use crate::pipeline::crop::CropRect;
use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the colorbook library.
#[derive(Debug, Error)]
pub enum ColoringError {
    // ── Upload / decode errors ───────────────────────────────────────────
    /// An upload could not be read as a still image.
    #[error("Could not read '{name}' as an image: {detail}")]
    DecodeFailure { name: String, detail: String },

    /// A string that should have been a base64 data URI was not one.
    #[error("Invalid data URI: {0}")]
    InvalidDataUri(String),

    /// The input string is neither an existing file nor an HTTP/HTTPS URL.
    #[error("Invalid input '{input}': not a readable file or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    // ── Crop errors ──────────────────────────────────────────────────────
    /// The crop rectangle is empty or reaches outside the rotated bounding box.
    #[error(
        "Crop region {}x{} at ({}, {}) lies outside the {bound_width}x{bound_height} rotated image",
        .rect.width, .rect.height, .rect.x, .rect.y
    )]
    InvalidCropRegion {
        rect: CropRect,
        bound_width: u32,
        bound_height: u32,
    },

    /// A drawing surface of the requested size could not be allocated.
    #[error("Cannot allocate a {width}x{height} drawing surface")]
    CanvasUnavailable { width: u32, height: u32 },

    // ── Conversion errors ────────────────────────────────────────────────
    /// The external service returned no usable image.
    #[error("Conversion failed: {message}")]
    ConversionFailure { message: String },

    /// The external service returned a different number of images than sent.
    #[error("The service returned {actual} images for {expected} requested")]
    CountMismatch { expected: usize, actual: usize },

    /// A single conversion call exceeded the configured timeout.
    #[error("Conversion of image {index} timed out after {secs}s")]
    Timeout { index: usize, secs: u64 },

    /// No conversion service could be resolved from config or environment.
    #[error("No conversion service is configured.\n{hint}")]
    ServiceNotConfigured { hint: String },

    /// The service answered HTTP 429.
    #[error("Rate limit exceeded by the conversion service")]
    RateLimitExceeded { retry_after_secs: Option<u64> },

    /// The service refused the request itself (a 4xx other than 401, 403,
    /// 408 or 429). Sending the same body again gets the same answer.
    #[error("The conversion service rejected the request (HTTP {status}): {detail}")]
    RequestRejected { status: u16, detail: String },

    /// The service rejected the credentials (401/403).
    #[error("Authentication error from the conversion service: {detail}")]
    AuthError { detail: String },

    // ── Wizard errors ────────────────────────────────────────────────────
    /// An operation was invoked in a state that does not allow it.
    #[error("Cannot {action} while the wizard is {state}")]
    InvalidTransition { state: String, action: &'static str },

    /// The consent gate needs both acknowledgements.
    #[error("Both the photo-rights confirmation and the terms acceptance are required")]
    ConsentIncomplete,

    /// No gallery item at the given index.
    #[error("No gallery item at index {index} (gallery has {len})")]
    ItemNotFound { index: usize, len: usize },

    /// Cropping was requested with nothing uploaded.
    #[error("No images have been uploaded")]
    NoImages,

    // ── I/O errors ───────────────────────────────────────────────────────
    /// Could not create or write an exported file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ColoringError {
    /// Whether retrying the same call could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ColoringError::Timeout { .. }
                | ColoringError::RateLimitExceeded { .. }
                | ColoringError::ConversionFailure { .. }
        )
    }
}
