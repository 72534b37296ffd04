//! Encoded still images: `DynamicImage` ⇄ base64 payload ⇄ data URI.
//!
//! Every image that crosses a boundary (crop output, conversion request,
//! conversion result, gallery item) is carried as an [`EncodedImage`]. On the
//! wire it is a `data:<mime>;base64,<payload>` string, which is what both the
//! hosted endpoint and the print document expect. Crops are always PNG so the
//! pixels the model sees are exactly the pixels the user framed.

use crate::error::ColoringError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{DynamicImage, ImageFormat};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Cursor;
use tracing::debug;

static RE_DATA_URI: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^data:([A-Za-z0-9!#$&^_.+-]+/[A-Za-z0-9!#$&^_.+-]+);base64,([A-Za-z0-9+/]*={0,2})$")
        .unwrap()
});

/// An encoded still image with its MIME type.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EncodedImage {
    pub mime_type: String,
    /// Standard-alphabet base64 of the encoded file.
    pub data: String,
}

impl EncodedImage {
    pub fn new(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    /// Wrap already-encoded PNG bytes.
    pub fn from_png_bytes(bytes: &[u8]) -> Self {
        Self::new("image/png", STANDARD.encode(bytes))
    }

    /// Parse a `data:<mime>;base64,<payload>` URI.
    pub fn parse_data_uri(uri: &str) -> Result<Self, ColoringError> {
        let caps = RE_DATA_URI.captures(uri.trim()).ok_or_else(|| {
            let head: String = uri.chars().take(32).collect();
            ColoringError::InvalidDataUri(format!("expected data:<mime>;base64,… got '{head}…'"))
        })?;
        Ok(Self::new(&caps[1], &caps[2]))
    }

    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }

    /// Raw bytes of the encoded file.
    pub fn decode_bytes(&self) -> Result<Vec<u8>, ColoringError> {
        STANDARD
            .decode(&self.data)
            .map_err(|e| ColoringError::InvalidDataUri(format!("bad base64 payload: {e}")))
    }

    /// Decode the payload into pixels.
    pub fn decode_image(&self) -> Result<DynamicImage, ColoringError> {
        let bytes = self.decode_bytes()?;
        image::load_from_memory(&bytes).map_err(|e| ColoringError::DecodeFailure {
            name: self.mime_type.clone(),
            detail: e.to_string(),
        })
    }

    /// File extension matching the MIME type, defaulting to `png`.
    pub fn extension(&self) -> &'static str {
        ImageFormat::from_mime_type(&self.mime_type)
            .and_then(|f| f.extensions_str().first().copied())
            .unwrap_or("png")
    }
}

impl fmt::Debug for EncodedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodedImage")
            .field("mime_type", &self.mime_type)
            .field("data", &format_args!("<{} base64 chars>", self.data.len()))
            .finish()
    }
}

impl TryFrom<String> for EncodedImage {
    type Error = ColoringError;

    fn try_from(uri: String) -> Result<Self, Self::Error> {
        EncodedImage::parse_data_uri(&uri)
    }
}

impl From<EncodedImage> for String {
    fn from(img: EncodedImage) -> Self {
        img.to_data_uri()
    }
}

/// Encode pixels as a base64 PNG.
///
/// PNG is lossless and keeps the alpha channel that rotated crops carry in
/// their corners.
pub fn encode_png(img: &DynamicImage) -> Result<EncodedImage, ColoringError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(|e| ColoringError::Internal(format!("PNG encoding failed: {e}")))?;

    let encoded = EncodedImage::from_png_bytes(&buf);
    debug!("Encoded {}x{} image → {} bytes base64", img.width(), img.height(), encoded.data.len());
    Ok(encoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn encode_small_image() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])));
        let data = encode_png(&img).expect("encode should succeed");
        assert_eq!(data.mime_type, "image/png");
        assert!(!data.data.is_empty());
        let decoded = data.decode_image().expect("valid png");
        assert_eq!((decoded.width(), decoded.height()), (10, 10));
    }

    #[test]
    fn data_uri_parse_and_format() {
        let img = EncodedImage::parse_data_uri("data:image/jpeg;base64,AAEC").unwrap();
        assert_eq!(img.mime_type, "image/jpeg");
        assert_eq!(img.data, "AAEC");
        assert_eq!(img.to_data_uri(), "data:image/jpeg;base64,AAEC");
        assert_eq!(img.decode_bytes().unwrap(), vec![0, 1, 2]);
        assert_eq!(img.extension(), "jpg");
    }

    #[test]
    fn rejects_non_data_uris() {
        for bad in ["https://example.com/a.png", "data:image/png,raw", "data:;base64,AAAA", ""] {
            assert!(
                matches!(EncodedImage::parse_data_uri(bad), Err(ColoringError::InvalidDataUri(_))),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn serde_uses_data_uri_string() {
        let img = EncodedImage::new("image/png", "AAAA");
        let json = serde_json::to_string(&img).unwrap();
        assert_eq!(json, "\"data:image/png;base64,AAAA\"");
        let back: EncodedImage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, img);
        assert!(serde_json::from_str::<EncodedImage>("\"not a uri\"").is_err());
    }

    #[test]
    fn debug_does_not_dump_payload() {
        let img = EncodedImage::new("image/png", "A".repeat(5000));
        let dbg = format!("{img:?}");
        assert!(dbg.len() < 200);
        assert!(dbg.contains("5000 base64 chars"));
    }
}
