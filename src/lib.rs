//! # colorbook
//!
//! Turn photos into printable coloring-book pages.
//!
//! The line art itself comes from a generative image model. This crate does
//! everything around it: accepts uploads, rotates and crops each photo to the
//! page's aspect ratio, sends the crops off as a batch, keeps the results in a
//! gallery where any single page can be regenerated with extra guidance, and
//! exports the finished book for printing.
//!
//! ## Pipeline Overview
//!
//! ```text
//! photos
//!  │
//!  ├─ 1. Upload    sniff format, issue revocable preview handles
//!  ├─ 2. Crop      rotate about the centre, cut the page-aspect rectangle (PNG)
//!  ├─ 3. Consent   photo rights + terms, both required
//!  ├─ 4. Convert   one model call per crop, capped concurrency, all-or-nothing
//!  ├─ 5. Review    gallery of (crop, page) pairs; regenerate any one page
//!  └─ 6. Export    page-001.png … plus an HTML print document
//! ```
//!
//! The [`Wizard`] drives these steps as a state machine. The conversion
//! backend is an injected [`ColoringService`], so the wizard can be exercised
//! without the network.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use colorbook::{resolve_service, ColoringConfig, Consent, CropRegion, Wizard};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Service from COLORBOOK_ENDPOINT or GEMINI_API_KEY
//!     let config = ColoringConfig::default();
//!     let service = resolve_service(&config)?;
//!     let mut wizard = Wizard::new(service, config);
//!
//!     wizard.add_files(vec![("dog.jpg", std::fs::read("dog.jpg")?)])?;
//!     wizard.start_cropping()?;
//!     wizard.confirm_crop(CropRegion::default())?;
//!     wizard.acknowledge(Consent { owns_rights: true, accepts_terms: true })?;
//!     wizard.convert().await?;
//!
//!     colorbook::export::write_pages(wizard.gallery(), "out".as_ref())?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `colorbook` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! colorbook = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod export;
pub mod gallery;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod wizard;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ColoringConfig, ColoringConfigBuilder, Difficulty, PageSize, Style};
pub use convert::{convert_all, regenerate, resolve_service};
pub use error::ColoringError;
pub use gallery::{Gallery, GalleryItem};
pub use pipeline::crop::{crop_image, crop_rgba, CropRect, CropRegion};
pub use pipeline::encode::EncodedImage;
pub use pipeline::endpoint::EndpointService;
pub use pipeline::gemini::GeminiGenerator;
pub use pipeline::service::{ColoringService, ConversionRequest, GeneratorService, PageGenerator};
pub use pipeline::upload::{ImageId, PreviewHandle, PreviewStore, UploadedImage, Uploader};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use wizard::{Consent, Wizard, WizardState};
