//! Uploads: accepted photos and their revocable preview handles.
//!
//! Each accepted photo gets a [`PreviewHandle`] from the [`PreviewStore`],
//! the equivalent of a browser object URL: it resolves to the photo's bytes
//! while live and to nothing once revoked. Handles must be released when their
//! photo is removed or the session resets, otherwise the store keeps every
//! photo ever uploaded alive. Revocation is idempotent: the first call frees
//! the entry, later calls are no-ops.

use crate::error::ColoringError;
use image::ImageReader;
use std::collections::HashMap;
use std::fmt;
use std::io::Cursor;
use std::sync::Arc;
use tracing::{debug, warn};

/// Stable identifier of an uploaded photo within one [`Uploader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageId(u64);

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A revocable reference to an uploaded photo's bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PreviewHandle {
    key: u64,
    url: String,
}

impl PreviewHandle {
    /// Opaque URL form, suitable for an `<img src>` in a preview server.
    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Issues and revokes preview handles.
#[derive(Debug, Default)]
pub struct PreviewStore {
    next_key: u64,
    live: HashMap<u64, Arc<[u8]>>,
    revoked: usize,
}

impl PreviewStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, bytes: Arc<[u8]>) -> PreviewHandle {
        self.next_key += 1;
        let key = self.next_key;
        self.live.insert(key, bytes);
        PreviewHandle {
            key,
            url: format!("preview:colorbook/{key}"),
        }
    }

    /// The bytes behind `handle`, or None once it has been revoked.
    pub fn resolve(&self, handle: &PreviewHandle) -> Option<Arc<[u8]>> {
        self.live.get(&handle.key).cloned()
    }

    /// Release `handle`. Returns true only on the call that actually freed it.
    pub fn revoke(&mut self, handle: &PreviewHandle) -> bool {
        if self.live.remove(&handle.key).is_some() {
            self.revoked += 1;
            true
        } else {
            false
        }
    }

    /// Handles issued and not yet revoked.
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Handles released so far.
    pub fn revoked_count(&self) -> usize {
        self.revoked
    }
}

/// One accepted photo.
#[derive(Clone)]
pub struct UploadedImage {
    pub id: ImageId,
    pub name: String,
    pub mime_type: &'static str,
    pub width: u32,
    pub height: u32,
    source: Arc<[u8]>,
    preview: PreviewHandle,
}

impl UploadedImage {
    pub fn source_bytes(&self) -> &[u8] {
        &self.source
    }

    pub fn preview(&self) -> &PreviewHandle {
        &self.preview
    }
}

impl fmt::Debug for UploadedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadedImage")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.source.len())
            .field("preview", &self.preview.url)
            .finish()
    }
}

/// Ordered list of uploaded photos plus the store backing their previews.
#[derive(Debug, Default)]
pub struct Uploader {
    images: Vec<UploadedImage>,
    previews: PreviewStore,
    next_id: u64,
}

impl Uploader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept one file if its bytes sniff as a supported still image.
    pub fn add(&mut self, name: impl Into<String>, bytes: Vec<u8>) -> Result<ImageId, ColoringError> {
        let name = name.into();
        let (mime_type, width, height) = sniff(&name, &bytes)?;

        self.next_id += 1;
        let id = ImageId(self.next_id);
        let source: Arc<[u8]> = bytes.into();
        let preview = self.previews.create(Arc::clone(&source));
        debug!("Accepted {} '{}' ({}x{}, {})", id, name, width, height, mime_type);

        self.images.push(UploadedImage {
            id,
            name,
            mime_type,
            width,
            height,
            source,
            preview,
        });
        Ok(id)
    }

    /// Accept many files, skipping anything that is not an image.
    pub fn add_files<I, S>(&mut self, files: I) -> Vec<ImageId>
    where
        I: IntoIterator<Item = (S, Vec<u8>)>,
        S: Into<String>,
    {
        files
            .into_iter()
            .filter_map(|(name, bytes)| match self.add(name, bytes) {
                Ok(id) => Some(id),
                Err(e) => {
                    warn!("Skipping upload: {}", e);
                    None
                }
            })
            .collect()
    }

    /// Remove a photo and release its preview. A second call for the same id
    /// is a no-op and returns false.
    pub fn remove(&mut self, id: ImageId) -> bool {
        let Some(pos) = self.images.iter().position(|img| img.id == id) else {
            return false;
        };
        let removed = self.images.remove(pos);
        self.previews.revoke(&removed.preview);
        debug!("Removed {} '{}'", id, removed.name);
        true
    }

    /// Remove everything, releasing every live preview.
    pub fn clear(&mut self) {
        for img in self.images.drain(..) {
            self.previews.revoke(&img.preview);
        }
    }

    pub fn images(&self) -> &[UploadedImage] {
        &self.images
    }

    pub fn get(&self, index: usize) -> Option<&UploadedImage> {
        self.images.get(index)
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn previews(&self) -> &PreviewStore {
        &self.previews
    }
}

/// Sniff format and dimensions without decoding the pixels.
fn sniff(name: &str, bytes: &[u8]) -> Result<(&'static str, u32, u32), ColoringError> {
    let decode_err = |detail: String| ColoringError::DecodeFailure {
        name: name.to_string(),
        detail,
    };

    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| decode_err(e.to_string()))?;
    let format = reader
        .format()
        .ok_or_else(|| decode_err("unrecognised image format".to_string()))?;
    let (width, height) = reader
        .into_dimensions()
        .map_err(|e| decode_err(e.to_string()))?;
    if width == 0 || height == 0 {
        return Err(decode_err(format!("empty {width}x{height} image")));
    }
    Ok((format.to_mime_type(), width, height))
}
