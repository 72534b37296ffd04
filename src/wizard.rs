//! The multi-step wizard: upload → crop each photo → consent → convert → review.
//!
//! ```text
//!            add_files           start_cropping          confirm_crop (last)
//!   Idle ───────────▶ Uploading ───────────▶ Cropping(i) ───────────▶ AwaitingConsent
//!    ▲                    ▲                  │  ▲    │                     │ acknowledge
//!    │                    └── cancel_cropping┘  │    │ confirm_crop        ▼
//!    │                                          │    └──▶ Cropping(i+1)  Converting
//!    │ reset (any state)     decline_consent ───┘                          │ convert
//!    │ or failed convert                                                   ▼
//!    └──────────────────────────────────────────────────────────────── Reviewing
//!                                          add_more_photos: Reviewing ──▶ Cropping(0)
//! ```
//!
//! A failed batch conversion force-resets everything to `Idle`: crops,
//! uploads and the gallery are discarded. A failed regeneration only fails
//! that one page. Calls made in the wrong state return
//! [`ColoringError::InvalidTransition`] and change nothing.

use crate::config::{ColoringConfig, Difficulty, Style};
use crate::error::ColoringError;
use crate::gallery::{Gallery, GalleryItem};
use crate::pipeline::crop::{crop_image, CropRect, CropRegion};
use crate::pipeline::encode::EncodedImage;
use crate::pipeline::service::ColoringService;
use crate::pipeline::upload::{ImageId, UploadedImage, Uploader};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where the wizard currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardState {
    Idle,
    Uploading,
    /// Cropping the photo at this upload index.
    Cropping(usize),
    AwaitingConsent,
    /// Crops are ready and the batch may be sent.
    Converting,
    Reviewing,
}

impl fmt::Display for WizardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WizardState::Idle => f.write_str("idle"),
            WizardState::Uploading => f.write_str("uploading"),
            WizardState::Cropping(i) => write!(f, "cropping photo {}", i + 1),
            WizardState::AwaitingConsent => f.write_str("awaiting consent"),
            WizardState::Converting => f.write_str("converting"),
            WizardState::Reviewing => f.write_str("reviewing"),
        }
    }
}

/// The two acknowledgements the consent gate needs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Consent {
    /// The user owns, or has permission to use, the photos.
    pub owns_rights: bool,
    pub accepts_terms: bool,
}

impl Consent {
    pub fn is_complete(&self) -> bool {
        self.owns_rights && self.accepts_terms
    }
}

pub struct Wizard {
    service: Arc<dyn ColoringService>,
    config: ColoringConfig,
    state: WizardState,
    uploader: Uploader,
    crops: Vec<EncodedImage>,
    gallery: Gallery,
    style: Style,
    difficulty: Difficulty,
    consented: bool,
    /// Set while a second batch is being prepared from the review screen.
    appending: bool,
}

impl fmt::Debug for Wizard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wizard")
            .field("state", &self.state)
            .field("uploads", &self.uploader.len())
            .field("crops", &self.crops.len())
            .field("gallery", &self.gallery.len())
            .field("style", &self.style)
            .field("difficulty", &self.difficulty)
            .field("appending", &self.appending)
            .finish()
    }
}

impl Wizard {
    pub fn new(service: Arc<dyn ColoringService>, config: ColoringConfig) -> Self {
        Self {
            service,
            style: config.style,
            difficulty: config.difficulty,
            config,
            state: WizardState::Idle,
            uploader: Uploader::new(),
            crops: Vec::new(),
            gallery: Gallery::new(),
            consented: false,
            appending: false,
        }
    }

    // ── Accessors ────────────────────────────────────────────────────────

    pub fn state(&self) -> WizardState {
        self.state
    }

    pub fn gallery(&self) -> &Gallery {
        &self.gallery
    }

    pub fn uploader(&self) -> &Uploader {
        &self.uploader
    }

    /// Crops confirmed so far for the batch being prepared.
    pub fn crops(&self) -> &[EncodedImage] {
        &self.crops
    }

    pub fn style(&self) -> Style {
        self.style
    }

    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    pub fn is_adding_more(&self) -> bool {
        self.appending
    }

    /// The photo being cropped, if any.
    pub fn current_image(&self) -> Option<&UploadedImage> {
        match self.state {
            WizardState::Cropping(i) => self.uploader.get(i),
            _ => None,
        }
    }

    // ── Upload ───────────────────────────────────────────────────────────

    /// Accept photos, skipping anything that is not an image.
    pub fn add_files<I, S>(&mut self, files: I) -> Result<Vec<ImageId>, ColoringError>
    where
        I: IntoIterator<Item = (S, Vec<u8>)>,
        S: Into<String>,
    {
        self.require(
            matches!(self.state, WizardState::Idle | WizardState::Uploading),
            "add photos",
        )?;
        let ids = self.uploader.add_files(files);
        if !self.uploader.is_empty() {
            self.state = WizardState::Uploading;
        }
        Ok(ids)
    }

    /// Remove one upload, releasing its preview. Removing an id twice is a
    /// no-op the second time.
    pub fn remove_file(&mut self, id: ImageId) -> Result<bool, ColoringError> {
        self.require(
            matches!(self.state, WizardState::Idle | WizardState::Uploading),
            "remove a photo",
        )?;
        let removed = self.uploader.remove(id);
        if self.uploader.is_empty() && !self.appending {
            self.state = WizardState::Idle;
        }
        Ok(removed)
    }

    pub fn set_style(&mut self, style: Style) {
        self.style = style;
    }

    pub fn set_difficulty(&mut self, difficulty: Difficulty) {
        self.difficulty = difficulty;
    }

    // ── Crop ─────────────────────────────────────────────────────────────

    pub fn start_cropping(&mut self) -> Result<(), ColoringError> {
        self.require(
            matches!(self.state, WizardState::Idle | WizardState::Uploading),
            "start cropping",
        )?;
        if self.uploader.is_empty() {
            return Err(ColoringError::NoImages);
        }
        self.crops.clear();
        self.state = WizardState::Cropping(0);
        info!("Cropping {} photos", self.uploader.len());
        Ok(())
    }

    /// Confirm the interactive crop of the current photo and move on.
    ///
    /// The region is resolved against the configured page aspect.
    pub fn confirm_crop(&mut self, region: CropRegion) -> Result<WizardState, ColoringError> {
        let rect = self.resolve_region(region, "confirm a crop")?;
        self.confirm_crop_rect(region.rotation, rect)
    }

    /// Confirm an explicit pixel rectangle on the rotated photo.
    ///
    /// On error the wizard stays on the same photo.
    pub fn confirm_crop_rect(&mut self, rotation: f64, rect: CropRect) -> Result<WizardState, ColoringError> {
        let index = self.crop_current(rotation, rect, "confirm a crop")?;
        self.state = if index + 1 < self.uploader.len() {
            WizardState::Cropping(index + 1)
        } else {
            self.after_cropping()
        };
        Ok(self.state)
    }

    /// Crop the current photo and stop, leaving any later photos uncropped.
    pub fn finish_cropping(&mut self, region: CropRegion) -> Result<WizardState, ColoringError> {
        let rect = self.resolve_region(region, "finish cropping")?;
        let index = self.crop_current(region.rotation, rect, "finish cropping")?;
        debug!("Finished early after photo {} of {}", index + 1, self.uploader.len());
        self.state = self.after_cropping();
        Ok(self.state)
    }

    /// Abandon cropping and go back to the upload list.
    pub fn cancel_cropping(&mut self) -> Result<(), ColoringError> {
        self.require(matches!(self.state, WizardState::Cropping(_)), "cancel cropping")?;
        self.crops.clear();
        self.state = WizardState::Uploading;
        Ok(())
    }

    // ── Consent ──────────────────────────────────────────────────────────

    pub fn acknowledge(&mut self, consent: Consent) -> Result<(), ColoringError> {
        self.require(self.state == WizardState::AwaitingConsent, "acknowledge consent")?;
        if !consent.is_complete() {
            return Err(ColoringError::ConsentIncomplete);
        }
        self.consented = true;
        self.state = WizardState::Converting;
        Ok(())
    }

    /// Back out of the gate to re-crop the last photo.
    pub fn decline_consent(&mut self) -> Result<(), ColoringError> {
        self.require(self.state == WizardState::AwaitingConsent, "decline consent")?;
        self.crops.pop();
        self.state = WizardState::Cropping(self.crops.len());
        Ok(())
    }

    // ── Convert / review ─────────────────────────────────────────────────

    /// Send every crop to the service as one batch.
    ///
    /// On success the pages land in the gallery (appended when adding more
    /// photos) and the wizard moves to `Reviewing`. On any failure everything
    /// is discarded and the wizard is back at `Idle`.
    pub async fn convert(&mut self) -> Result<(), ColoringError> {
        self.require(self.state == WizardState::Converting, "convert")?;
        info!(
            "Converting {} photos ({}, {})",
            self.crops.len(),
            self.style,
            self.difficulty.label()
        );

        let outcome = self
            .service
            .convert_batch(&self.crops, self.style, self.difficulty)
            .await
            .and_then(|converted| {
                if converted.len() == self.crops.len() {
                    Ok(converted)
                } else {
                    Err(ColoringError::CountMismatch {
                        expected: self.crops.len(),
                        actual: converted.len(),
                    })
                }
            });

        let converted = match outcome {
            Ok(converted) => converted,
            Err(e) => {
                warn!("Conversion failed, starting over: {}", e);
                self.reset();
                return Err(e);
            }
        };

        let items: Vec<GalleryItem> = self
            .crops
            .drain(..)
            .zip(converted)
            .map(|(original, converted)| GalleryItem { original, converted })
            .collect();
        if self.appending {
            info!("Added {} pages to the coloring book", items.len());
            self.gallery.extend(items);
        } else {
            info!("Created a coloring book of {} pages", items.len());
            self.gallery.replace(items);
        }
        self.uploader.clear();
        self.appending = false;
        self.state = WizardState::Reviewing;
        Ok(())
    }

    /// Regenerate one page. Failure leaves the gallery as it was.
    pub async fn regenerate(&mut self, index: usize, notes: Option<&str>) -> Result<(), ColoringError> {
        self.require(self.state == WizardState::Reviewing, "regenerate a page")?;
        self.gallery
            .regenerate(index, self.service.as_ref(), self.style, self.difficulty, notes)
            .await
    }

    /// Start a second batch from the review screen. The new pages are
    /// appended to the gallery once converted.
    pub fn add_more_photos<I, S>(&mut self, files: I) -> Result<Vec<ImageId>, ColoringError>
    where
        I: IntoIterator<Item = (S, Vec<u8>)>,
        S: Into<String>,
    {
        self.require(self.state == WizardState::Reviewing, "add more photos")?;
        self.uploader.clear();
        let ids = self.uploader.add_files(files);
        if ids.is_empty() {
            return Err(ColoringError::NoImages);
        }
        self.appending = true;
        self.crops.clear();
        self.state = WizardState::Cropping(0);
        Ok(ids)
    }

    /// Drop a second batch in preparation and return to the gallery.
    pub fn back_to_gallery(&mut self) -> Result<(), ColoringError> {
        self.require(
            self.appending && matches!(self.state, WizardState::Uploading | WizardState::Cropping(_)),
            "return to the gallery",
        )?;
        self.uploader.clear();
        self.crops.clear();
        self.appending = false;
        self.state = WizardState::Reviewing;
        Ok(())
    }

    /// Back to `Idle` from anywhere, releasing every preview.
    pub fn reset(&mut self) {
        self.uploader.clear();
        self.crops.clear();
        self.gallery.clear();
        self.appending = false;
        self.consented = false;
        self.state = WizardState::Idle;
        debug!("Wizard reset");
    }

    // ── Internals ────────────────────────────────────────────────────────

    fn require(&self, allowed: bool, action: &'static str) -> Result<(), ColoringError> {
        if allowed {
            Ok(())
        } else {
            Err(ColoringError::InvalidTransition {
                state: self.state.to_string(),
                action,
            })
        }
    }

    fn cropping_index(&self, action: &'static str) -> Result<usize, ColoringError> {
        match self.state {
            WizardState::Cropping(i) => Ok(i),
            _ => Err(ColoringError::InvalidTransition {
                state: self.state.to_string(),
                action,
            }),
        }
    }

    fn current_upload(&self, action: &'static str) -> Result<&UploadedImage, ColoringError> {
        let index = self.cropping_index(action)?;
        self.uploader
            .get(index)
            .ok_or_else(|| ColoringError::Internal(format!("no upload at crop index {index}")))
    }

    fn resolve_region(&self, region: CropRegion, action: &'static str) -> Result<CropRect, ColoringError> {
        let image = self.current_upload(action)?;
        Ok(region.to_pixel_rect(image.width, image.height, self.config.page_size.aspect()))
    }

    /// Crop the current photo and record it. Returns its index.
    fn crop_current(&mut self, rotation: f64, rect: CropRect, action: &'static str) -> Result<usize, ColoringError> {
        let index = self.cropping_index(action)?;
        let image = self.current_upload(action)?;
        let cropped = crop_image(image.source_bytes(), rotation, rect)?;
        debug!(
            "Cropped '{}' to {}x{} at ({}, {}), {}°",
            image.name, rect.width, rect.height, rect.x, rect.y, rotation
        );
        self.crops.truncate(index);
        self.crops.push(cropped);
        Ok(index)
    }

    fn after_cropping(&self) -> WizardState {
        if self.config.require_consent && !self.consented {
            WizardState::AwaitingConsent
        } else {
            WizardState::Converting
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::BoxFuture;
    use image::{DynamicImage, Rgba, RgbaImage};
    use std::io::Cursor;

    struct Echo;

    impl ColoringService for Echo {
        fn convert_batch<'a>(
            &'a self,
            images: &'a [EncodedImage],
            _style: Style,
            _difficulty: Difficulty,
        ) -> BoxFuture<'a, Result<Vec<EncodedImage>, ColoringError>> {
            Box::pin(async move { Ok(images.to_vec()) })
        }

        fn regenerate_one<'a>(
            &'a self,
            image: &'a EncodedImage,
            _style: Style,
            _difficulty: Difficulty,
            _notes: Option<&'a str>,
        ) -> BoxFuture<'a, Result<EncodedImage, ColoringError>> {
            Box::pin(async move { Ok(image.clone()) })
        }
    }

    fn png(w: u32, h: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba([9, 9, 9, 255])))
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    fn wizard() -> Wizard {
        Wizard::new(Arc::new(Echo), ColoringConfig::default())
    }

    #[test]
    fn state_display() {
        assert_eq!(WizardState::Cropping(0).to_string(), "cropping photo 1");
        assert_eq!(WizardState::AwaitingConsent.to_string(), "awaiting consent");
    }

    #[test]
    fn upload_then_crop_walks_every_photo() {
        let mut w = wizard();
        w.add_files(vec![("a.png", png(8, 8)), ("b.png", png(8, 8))]).unwrap();
        assert_eq!(w.state(), WizardState::Uploading);
        w.start_cropping().unwrap();
        assert_eq!(w.current_image().unwrap().name, "a.png");
        assert_eq!(w.confirm_crop(CropRegion::default()).unwrap(), WizardState::Cropping(1));
        assert_eq!(w.confirm_crop(CropRegion::default()).unwrap(), WizardState::AwaitingConsent);
        assert_eq!(w.crops().len(), 2);
    }

    #[test]
    fn bad_crop_keeps_the_same_photo() {
        let mut w = wizard();
        w.add_files(vec![("a.png", png(8, 8))]).unwrap();
        w.start_cropping().unwrap();
        let err = w.confirm_crop_rect(0.0, CropRect::new(4, 4, 8, 8)).unwrap_err();
        assert!(matches!(err, ColoringError::InvalidCropRegion { .. }));
        assert_eq!(w.state(), WizardState::Cropping(0));
        assert!(w.crops().is_empty());
    }

    #[test]
    fn finish_early_skips_the_rest() {
        let mut w = Wizard::new(
            Arc::new(Echo),
            ColoringConfig::builder().require_consent(false).build().unwrap(),
        );
        w.add_files(vec![("a.png", png(8, 8)), ("b.png", png(8, 8)), ("c.png", png(8, 8))])
            .unwrap();
        w.start_cropping().unwrap();
        w.confirm_crop(CropRegion::default()).unwrap();
        assert_eq!(w.finish_cropping(CropRegion::default()).unwrap(), WizardState::Converting);
        assert_eq!(w.crops().len(), 2);
    }

    #[test]
    fn start_cropping_needs_uploads() {
        let mut w = wizard();
        assert!(matches!(w.start_cropping(), Err(ColoringError::NoImages)));
        assert_eq!(w.state(), WizardState::Idle);
    }

    #[test]
    fn removing_last_upload_returns_to_idle() {
        let mut w = wizard();
        let ids = w.add_files(vec![("a.png", png(4, 4))]).unwrap();
        assert!(w.remove_file(ids[0]).unwrap());
        assert_eq!(w.state(), WizardState::Idle);
    }

    #[test]
    fn wrong_state_calls_change_nothing() {
        let mut w = wizard();
        let err = w.acknowledge(Consent::default()).unwrap_err();
        assert!(matches!(err, ColoringError::InvalidTransition { action: "acknowledge consent", .. }));
        assert!(w.cancel_cropping().is_err());
        assert!(tokio_test::block_on(w.convert()).is_err());
        assert!(tokio_test::block_on(w.regenerate(0, None)).is_err());
        assert_eq!(w.state(), WizardState::Idle);
    }
}
