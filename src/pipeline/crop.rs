//! Crop/rotate/export: cut a page-shaped region out of a rotated photo.
//!
//! The crop rectangle is expressed in the coordinate space of the *rotated*
//! image. The photo is first drawn, rotated about its own centre, onto a
//! transparent surface the size of its rotated bounding box; the rectangle is
//! then cut from that surface and becomes the output, exactly
//! `width × height` pixels, PNG-encoded.
//!
//! ## Geometry
//!
//! For a `W × H` image rotated by θ the bounding box is
//!
//! ```text
//! boundW = |cos θ|·W + |sin θ|·H
//! boundH = |sin θ|·W + |cos θ|·H
//! ```
//!
//! Surface pixel centres are mapped back into the source with the inverse
//! transform (translate to the surface centre, rotate by −θ, translate by the
//! source half-size). Quarter turns skip the sampling entirely and use exact
//! pixel rotation, so a 0° crop of the full frame is pixel-identical to the
//! input.

use crate::error::ColoringError;
use crate::pipeline::encode::{encode_png, EncodedImage};
use image::{imageops, DynamicImage, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Largest side length a drawing surface may have.
pub const MAX_CANVAS_SIDE: u32 = 32_767;

/// Largest pixel count a drawing surface may have.
pub const MAX_CANVAS_AREA: u64 = 268_435_456;

/// Slack for snapping float surface sizes to whole pixels.
const SIZE_EPSILON: f64 = 1e-6;

/// Zoom slider range.
pub const MIN_ZOOM: f64 = 1.0;
pub const MAX_ZOOM: f64 = 3.0;

/// A pixel rectangle in rotated-image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The full frame of a `width × height` surface.
    pub const fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Whether the rectangle is non-empty and inside a `bound_w × bound_h` surface.
    pub fn fits_within(&self, bound_w: u32, bound_h: u32) -> bool {
        self.width > 0
            && self.height > 0
            && u64::from(self.x) + u64::from(self.width) <= u64::from(bound_w)
            && u64::from(self.y) + u64::from(self.height) <= u64::from(bound_h)
    }
}

/// Interactive crop state for one photo.
///
/// `offset_x`/`offset_y` move the crop window away from the centre of the
/// rotated image, in rotated-image pixels. `zoom` shrinks the window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropRegion {
    pub offset_x: f64,
    pub offset_y: f64,
    pub zoom: f64,
    pub rotation: f64,
}

impl Default for CropRegion {
    fn default() -> Self {
        Self {
            offset_x: 0.0,
            offset_y: 0.0,
            zoom: MIN_ZOOM,
            rotation: 0.0,
        }
    }
}

impl CropRegion {
    pub fn with_zoom(mut self, zoom: f64) -> Self {
        self.zoom = if zoom.is_finite() {
            zoom.clamp(MIN_ZOOM, MAX_ZOOM)
        } else {
            MIN_ZOOM
        };
        self
    }

    pub fn with_rotation(mut self, degrees: f64) -> Self {
        self.rotation = normalize_degrees(degrees);
        self
    }

    pub fn with_offset(mut self, x: f64, y: f64) -> Self {
        self.offset_x = x;
        self.offset_y = y;
        self
    }

    /// Turn a further 90° clockwise.
    pub fn rotate_clockwise(&mut self) {
        self.rotation = normalize_degrees(self.rotation + 90.0);
    }

    /// Resolve to a pixel rectangle on the rotated surface of a
    /// `width × height` photo, for a page of the given `aspect` (w / h).
    ///
    /// At zoom 1 this is the largest centred rectangle of that aspect; higher
    /// zoom shrinks it about the centre. The offset moves it, and the result is
    /// clamped so it never leaves the surface.
    pub fn to_pixel_rect(&self, width: u32, height: u32, aspect: f64) -> CropRect {
        let (bw, bh) = canvas_size(width, height, self.rotation);
        if bw == 0 || bh == 0 || !(aspect.is_finite() && aspect > 0.0) {
            return CropRect::full(bw, bh);
        }

        let zoom = if self.zoom.is_finite() {
            self.zoom.max(MIN_ZOOM)
        } else {
            MIN_ZOOM
        };
        let (bw_f, bh_f) = (f64::from(bw), f64::from(bh));
        let (mut cw, mut ch) = if bw_f / bh_f > aspect {
            (bh_f * aspect, bh_f)
        } else {
            (bw_f, bw_f / aspect)
        };
        cw /= zoom;
        ch /= zoom;

        let w = (cw.round() as u32).clamp(1, bw);
        let h = (ch.round() as u32).clamp(1, bh);
        let max_x = f64::from(bw - w);
        let max_y = f64::from(bh - h);
        let offset_x = if self.offset_x.is_finite() { self.offset_x } else { 0.0 };
        let offset_y = if self.offset_y.is_finite() { self.offset_y } else { 0.0 };
        let x = (max_x / 2.0 + offset_x).round().clamp(0.0, max_x) as u32;
        let y = (max_y / 2.0 + offset_y).round().clamp(0.0, max_y) as u32;

        CropRect::new(x, y, w, h)
    }
}

/// Map any angle into `[0, 360)`.
pub fn normalize_degrees(degrees: f64) -> f64 {
    if !degrees.is_finite() {
        return 0.0;
    }
    let d = degrees.rem_euclid(360.0);
    // rem_euclid can return 360.0 for tiny negative inputs
    if d >= 360.0 {
        0.0
    } else {
        d
    }
}

/// Exact bounding box of a `width × height` image rotated by `degrees`.
pub fn rotated_bounds(width: u32, height: u32, degrees: f64) -> (f64, f64) {
    let rad = normalize_degrees(degrees).to_radians();
    let (sin, cos) = (rad.sin().abs(), rad.cos().abs());
    let (w, h) = (f64::from(width), f64::from(height));
    (cos * w + sin * h, sin * w + cos * h)
}

/// Whole-pixel surface size for the rotated bounding box.
///
/// Values within `1e-6` of an integer snap to it so quarter turns come out
/// exact; anything else rounds up so no source pixel is clipped.
pub fn canvas_size(width: u32, height: u32, degrees: f64) -> (u32, u32) {
    let (bw, bh) = rotated_bounds(width, height, degrees);
    (snap_up(bw), snap_up(bh))
}

fn snap_up(v: f64) -> u32 {
    let r = v.round();
    let px = if (v - r).abs() < SIZE_EPSILON { r } else { v.ceil() };
    px.clamp(0.0, f64::from(u32::MAX)) as u32
}

/// Number of clockwise quarter turns if `degrees` is a multiple of 90.
fn quarter_turns(degrees: f64) -> Option<u32> {
    let d = normalize_degrees(degrees);
    let q = (d / 90.0).round();
    if (d - q * 90.0).abs() < 1e-9 {
        Some((q as u32) % 4)
    } else {
        None
    }
}

fn check_surface(width: u32, height: u32) -> Result<(), ColoringError> {
    let area = u64::from(width) * u64::from(height);
    if width == 0
        || height == 0
        || width > MAX_CANVAS_SIDE
        || height > MAX_CANVAS_SIDE
        || area > MAX_CANVAS_AREA
    {
        return Err(ColoringError::CanvasUnavailable { width, height });
    }
    Ok(())
}

/// Crop-and-rotate encoded image bytes, returning a PNG of exactly
/// `rect.width × rect.height`.
///
/// # Errors
/// - [`ColoringError::DecodeFailure`] if `bytes` is not a readable image
/// - [`ColoringError::CanvasUnavailable`] if a surface cannot be allocated
/// - [`ColoringError::InvalidCropRegion`] if `rect` leaves the rotated bounds
pub fn crop_image(bytes: &[u8], degrees: f64, rect: CropRect) -> Result<EncodedImage, ColoringError> {
    let source = image::load_from_memory(bytes).map_err(|e| ColoringError::DecodeFailure {
        name: "crop source".to_string(),
        detail: e.to_string(),
    })?;
    let cropped = crop_rgba(&source.to_rgba8(), degrees, rect)?;
    encode_png(&DynamicImage::ImageRgba8(cropped))
}

/// Crop-and-rotate decoded pixels.
pub fn crop_rgba(source: &RgbaImage, degrees: f64, rect: CropRect) -> Result<RgbaImage, ColoringError> {
    let (src_w, src_h) = source.dimensions();
    let (bound_w, bound_h) = canvas_size(src_w, src_h, degrees);
    check_surface(bound_w, bound_h)?;

    if !rect.fits_within(bound_w, bound_h) {
        return Err(ColoringError::InvalidCropRegion {
            rect,
            bound_width: bound_w,
            bound_height: bound_h,
        });
    }

    debug!(
        "Cropping {}x{} at {:.2}° → surface {}x{}, rect {:?}",
        src_w, src_h, degrees, bound_w, bound_h, rect
    );

    let surface = match quarter_turns(degrees) {
        Some(0) => None,
        Some(1) => Some(imageops::rotate90(source)),
        Some(2) => Some(imageops::rotate180(source)),
        Some(3) => Some(imageops::rotate270(source)),
        _ => Some(draw_rotated(source, degrees, bound_w, bound_h)),
    };
    let surface = surface.as_ref().unwrap_or(source);

    Ok(imageops::crop_imm(surface, rect.x, rect.y, rect.width, rect.height).to_image())
}

/// Draw `source` rotated about its centre onto a transparent surface.
fn draw_rotated(source: &RgbaImage, degrees: f64, bound_w: u32, bound_h: u32) -> RgbaImage {
    let rad = normalize_degrees(degrees).to_radians();
    let (sin, cos) = rad.sin_cos();
    let (half_sw, half_sh) = (f64::from(source.width()) / 2.0, f64::from(source.height()) / 2.0);
    let (half_bw, half_bh) = (f64::from(bound_w) / 2.0, f64::from(bound_h) / 2.0);

    RgbaImage::from_fn(bound_w, bound_h, |u, v| {
        let dx = f64::from(u) + 0.5 - half_bw;
        let dy = f64::from(v) + 0.5 - half_bh;
        // inverse of a clockwise rotation in y-down space
        let sx = dx * cos + dy * sin + half_sw;
        let sy = -dx * sin + dy * cos + half_sh;
        sample_bilinear(source, sx - 0.5, sy - 0.5)
    })
}

/// Bilinear sample with transparent black outside the image.
fn sample_bilinear(img: &RgbaImage, x: f64, y: f64) -> Rgba<u8> {
    let (w, h) = (i64::from(img.width()), i64::from(img.height()));
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let (x0, y0) = (x0 as i64, y0 as i64);

    let texel = |px: i64, py: i64| -> [f64; 4] {
        if px < 0 || py < 0 || px >= w || py >= h {
            return [0.0; 4];
        }
        let p = img.get_pixel(px as u32, py as u32).0;
        let a = f64::from(p[3]) / 255.0;
        // premultiply so transparent neighbours don't darken edges
        [f64::from(p[0]) * a, f64::from(p[1]) * a, f64::from(p[2]) * a, f64::from(p[3])]
    };

    let weights = [
        ((1.0 - fx) * (1.0 - fy), texel(x0, y0)),
        (fx * (1.0 - fy), texel(x0 + 1, y0)),
        ((1.0 - fx) * fy, texel(x0, y0 + 1)),
        (fx * fy, texel(x0 + 1, y0 + 1)),
    ];

    let mut acc = [0.0f64; 4];
    for (wgt, t) in weights {
        for c in 0..4 {
            acc[c] += wgt * t[c];
        }
    }

    let alpha = acc[3];
    if alpha <= 0.0 {
        return Rgba([0, 0, 0, 0]);
    }
    let a = alpha / 255.0;
    Rgba([
        (acc[0] / a).round().clamp(0.0, 255.0) as u8,
        (acc[1] / a).round().clamp(0.0, 255.0) as u8,
        (acc[2] / a).round().clamp(0.0, 255.0) as u8,
        alpha.round().clamp(0.0, 255.0) as u8,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn gradient(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| {
            Rgba([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8, 255])
        })
    }

    fn png_bytes(img: &RgbaImage) -> Vec<u8> {
        let mut buf = Vec::new();
        DynamicImage::ImageRgba8(img.clone())
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn bounds_at_quarter_turns() {
        for (w, h) in [(850, 1100), (1, 1), (4000, 3000), (7, 13)] {
            for deg in [0.0, 180.0, 360.0, -180.0, 540.0] {
                assert_eq!(canvas_size(w, h, deg), (w, h), "{w}x{h} @ {deg}");
            }
            for deg in [90.0, 270.0, -90.0, 450.0] {
                assert_eq!(canvas_size(w, h, deg), (h, w), "{w}x{h} @ {deg}");
            }
        }
    }

    #[test]
    fn bounds_at_45_degrees() {
        let (bw, bh) = rotated_bounds(100, 100, 45.0);
        let expected = 100.0 * std::f64::consts::SQRT_2;
        assert!((bw - expected).abs() < 1e-9);
        assert!((bh - expected).abs() < 1e-9);
        assert_eq!(canvas_size(100, 100, 45.0), (142, 142));
    }

    #[test]
    fn bounds_never_smaller_than_source_extent() {
        for deg in (0..360).step_by(7) {
            let (bw, bh) = rotated_bounds(300, 200, f64::from(deg));
            assert!(bw >= 200.0 - 1e-9 && bh >= 200.0 - 1e-9, "deg {deg}: {bw}x{bh}");
        }
    }

    #[test]
    fn full_frame_at_zero_is_identity() {
        let src = gradient(850, 1100);
        let out = crop_rgba(&src, 0.0, CropRect::full(850, 1100)).unwrap();
        assert_eq!(out, src);
    }

    #[test]
    fn full_frame_through_png_is_pixel_identical() {
        let src = gradient(64, 80);
        let encoded = crop_image(&png_bytes(&src), 0.0, CropRect::full(64, 80)).unwrap();
        assert_eq!(encoded.mime_type, "image/png");
        let back = encoded.decode_image().unwrap().to_rgba8();
        assert_eq!(back, src);
    }

    #[test]
    fn quarter_turn_matches_clockwise_rotation() {
        let src = gradient(3, 2);
        let out = crop_rgba(&src, 90.0, CropRect::full(2, 3)).unwrap();
        // top-left of a clockwise turn is the source's bottom-left
        assert_eq!(out.get_pixel(0, 0), src.get_pixel(0, 1));
        assert_eq!(out.get_pixel(1, 0), src.get_pixel(0, 0));
        assert_eq!(out.get_pixel(1, 2), src.get_pixel(2, 0));
    }

    #[test]
    fn half_turn_reverses_pixels() {
        let src = gradient(5, 4);
        let out = crop_rgba(&src, 180.0, CropRect::full(5, 4)).unwrap();
        assert_eq!(out.get_pixel(0, 0), src.get_pixel(4, 3));
        assert_eq!(out.get_pixel(4, 3), src.get_pixel(0, 0));
    }

    #[test]
    fn sub_rect_is_exact_size_and_content() {
        let src = gradient(50, 60);
        let out = crop_rgba(&src, 0.0, CropRect::new(10, 20, 15, 25)).unwrap();
        assert_eq!(out.dimensions(), (15, 25));
        assert_eq!(out.get_pixel(0, 0), src.get_pixel(10, 20));
        assert_eq!(out.get_pixel(14, 24), src.get_pixel(24, 44));
    }

    #[test]
    fn arbitrary_angle_has_transparent_corners_and_opaque_centre() {
        let src = RgbaImage::from_pixel(100, 100, Rgba([200, 10, 10, 255]));
        let (bw, bh) = canvas_size(100, 100, 30.0);
        let out = crop_rgba(&src, 30.0, CropRect::full(bw, bh)).unwrap();
        assert_eq!(out.dimensions(), (bw, bh));
        assert_eq!(out.get_pixel(0, 0)[3], 0);
        let centre = out.get_pixel(bw / 2, bh / 2);
        assert_eq!(centre.0, [200, 10, 10, 255]);
    }

    #[test]
    fn rect_outside_rotated_bounds_is_rejected() {
        let src = gradient(100, 50);
        // 100 wide fits at 0°, but the surface is 50 wide after a quarter turn
        let err = crop_rgba(&src, 90.0, CropRect::new(0, 0, 100, 50)).unwrap_err();
        assert!(matches!(
            err,
            ColoringError::InvalidCropRegion {
                bound_width: 50,
                bound_height: 100,
                ..
            }
        ));
        assert!(crop_rgba(&src, 0.0, CropRect::new(90, 0, 11, 10)).is_err());
        assert!(crop_rgba(&src, 0.0, CropRect::new(0, 0, 0, 10)).is_err());
    }

    #[test]
    fn oversized_surface_is_unavailable() {
        assert!(matches!(
            check_surface(MAX_CANVAS_SIDE + 1, 10),
            Err(ColoringError::CanvasUnavailable { .. })
        ));
        assert!(matches!(
            check_surface(20_000, 20_000),
            Err(ColoringError::CanvasUnavailable { .. })
        ));
        assert!(check_surface(0, 10).is_err());
        assert!(check_surface(8000, 6000).is_ok());
    }

    #[test]
    fn undecodable_bytes_fail_to_decode() {
        let err = crop_image(b"not an image", 0.0, CropRect::full(1, 1)).unwrap_err();
        assert!(matches!(err, ColoringError::DecodeFailure { .. }));
    }

    #[test]
    fn region_default_fills_page_aspect() {
        let rect = CropRegion::default().to_pixel_rect(1700, 1100, 8.5 / 11.0);
        assert_eq!((rect.width, rect.height), (850, 1100));
        assert_eq!((rect.x, rect.y), (425, 0));
    }

    #[test]
    fn region_zoom_shrinks_about_centre_and_offset_clamps() {
        let region = CropRegion::default().with_zoom(2.0);
        let rect = region.to_pixel_rect(850, 1100, 8.5 / 11.0);
        assert_eq!((rect.width, rect.height), (425, 550));
        assert_eq!((rect.x, rect.y), (213, 275));

        let far = region.with_offset(10_000.0, -10_000.0).to_pixel_rect(850, 1100, 8.5 / 11.0);
        assert_eq!((far.x, far.y), (425, 0));
        assert!(far.fits_within(850, 1100));
    }

    #[test]
    fn region_uses_rotated_surface() {
        let region = CropRegion::default().with_rotation(90.0);
        let rect = region.to_pixel_rect(1100, 850, 8.5 / 11.0);
        assert_eq!(rect, CropRect::full(850, 1100));
    }

    #[test]
    fn rotate_button_wraps() {
        let mut region = CropRegion::default();
        for expected in [90.0, 180.0, 270.0, 0.0] {
            region.rotate_clockwise();
            assert_eq!(region.rotation, expected);
        }
        assert_eq!(CropRegion::default().with_zoom(9.0).zoom, MAX_ZOOM);
        assert_eq!(CropRegion::default().with_zoom(0.2).zoom, MIN_ZOOM);
    }

    #[test]
    fn normalize_handles_negatives_and_nan() {
        assert_eq!(normalize_degrees(-90.0), 270.0);
        assert_eq!(normalize_degrees(720.0), 0.0);
        assert_eq!(normalize_degrees(f64::NAN), 0.0);
    }
}
