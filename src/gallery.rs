//! Converted pages, each paired with the crop it was generated from.

use crate::config::{Difficulty, Style};
use crate::error::ColoringError;
use crate::pipeline::encode::EncodedImage;
use crate::pipeline::service::ColoringService;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// One page of the coloring book.
///
/// `original` is the cropped photo that was sent; it is kept so the page can
/// be regenerated from the same framing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GalleryItem {
    pub original: EncodedImage,
    pub converted: EncodedImage,
}

/// Ordered list of converted pages.
#[derive(Debug, Clone, Default)]
pub struct Gallery {
    items: Vec<GalleryItem>,
}

impl Gallery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the contents with a freshly converted batch.
    pub fn replace(&mut self, items: Vec<GalleryItem>) {
        self.items = items;
    }

    /// Append a batch after the existing pages.
    pub fn extend(&mut self, items: Vec<GalleryItem>) {
        self.items.extend(items);
    }

    pub fn get(&self, index: usize) -> Option<&GalleryItem> {
        self.items.get(index)
    }

    pub fn items(&self) -> &[GalleryItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Ask the service for a fresh rendering of one page.
    ///
    /// Only `items[index].converted` changes, and only on success. On any
    /// error the gallery is exactly as it was.
    pub async fn regenerate(
        &mut self,
        index: usize,
        service: &dyn ColoringService,
        style: Style,
        difficulty: Difficulty,
        notes: Option<&str>,
    ) -> Result<(), ColoringError> {
        let len = self.items.len();
        let original = self
            .items
            .get(index)
            .map(|item| item.original.clone())
            .ok_or(ColoringError::ItemNotFound { index, len })?;
        let notes = notes.map(str::trim).filter(|n| !n.is_empty());

        info!("Regenerating page {} of {}", index + 1, len);
        match service.regenerate_one(&original, style, difficulty, notes).await {
            Ok(converted) => {
                if let Some(item) = self.items.get_mut(index) {
                    item.converted = converted;
                }
                Ok(())
            }
            Err(e) => {
                warn!("Regeneration of page {} failed: {}", index + 1, e);
                Err(e)
            }
        }
    }
}
