// This file is part of Facetrack, a multi-stream face re-identification service.
// See AUTHORS and LICENSE.

//! Draws per-identity bounding boxes and labels onto a frame and encodes the
//! result as JPEG for the MJPEG preview (spec §6: green for clean, red for
//! suspicious, label `"ID: {id} ({status})"`).

use std::io::Cursor;
use std::sync::OnceLock;

use ab_glyph::{FontRef, PxScale};
use image::{ImageEncoder, Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use tracing::warn;

use registry::BBox;

const CLEAN_COLOR: Rgb<u8> = Rgb([0, 200, 0]);
const SUSPICIOUS_COLOR: Rgb<u8> = Rgb([220, 0, 0]);
const LABEL_SCALE: PxScale = PxScale { x: 16.0, y: 16.0 };

/// A system font used for labels, read once and reused across frames.
/// Missing on a system without the usual font packages installed — boxes
/// still draw, only the text label is skipped, and we warn once rather
/// than on every frame.
fn label_font() -> Option<FontRef<'static>> {
    static FONT_BYTES: OnceLock<Option<Vec<u8>>> = OnceLock::new();
    FONT_BYTES
        .get_or_init(load_font_bytes)
        .as_deref()
        .and_then(|bytes| FontRef::try_from_slice(bytes).ok())
}

fn load_font_bytes() -> Option<Vec<u8>> {
    let path = std::env::var("FACETRACK_FONT_PATH")
        .unwrap_or_else(|_| "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf".to_string());
    match std::fs::read(&path) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            warn!(path = %path, err = %e, "no label font available, drawing boxes without labels");
            None
        }
    }
}

/// Draws a hollow rectangle and `"ID: {id} ({status})"` label for each
/// tracked face onto a solid background frame of the given dimensions.
///
/// The decoder is out of scope (spec §1 Non-goals), so this paints onto a
/// blank canvas rather than real pixel data — the overlay geometry is the
/// part under test here, not the underlying video.
pub fn draw_overlay(width: u32, height: u32, overlays: &[(u64, bool, BBox)]) -> RgbImage {
    let mut img = RgbImage::from_pixel(width.max(1), height.max(1), Rgb([32, 32, 32]));
    let font = label_font();

    for &(id, suspicious, bbox) in overlays {
        let color = if suspicious { SUSPICIOUS_COLOR } else { CLEAN_COLOR };
        let w = (bbox.x2 - bbox.x1).max(1) as u32;
        let h = (bbox.y2 - bbox.y1).max(1) as u32;
        draw_hollow_rect_mut(&mut img, Rect::at(bbox.x1, bbox.y1).of_size(w, h), color);

        if let Some(font) = &font {
            let status = if suspicious { "suspicious" } else { "clean" };
            let label = format!("ID: {id} ({status})");
            let label_y = (bbox.y1 - 18).max(0);
            draw_text_mut(&mut img, color, bbox.x1, label_y, LABEL_SCALE, font, &label);
        }
    }
    img
}

/// Encodes an image as JPEG at the given quality (spec §6: quality 80).
pub fn encode_jpeg(img: &RgbImage, quality: u8) -> Vec<u8> {
    let mut buf = Vec::new();
    image::codecs::jpeg::JpegEncoder::new_with_quality(Cursor::new(&mut buf), quality)
        .write_image(img.as_raw(), img.width(), img.height(), image::ExtendedColorType::Rgb8)
        .expect("encoding a freshly drawn in-memory RGB image cannot fail");
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use registry::testutil::fixture_bbox;

    #[test]
    fn draw_overlay_produces_requested_dimensions() {
        let img = draw_overlay(320, 240, &[]);
        assert_eq!(img.width(), 320);
        assert_eq!(img.height(), 240);
    }

    #[test]
    fn draw_overlay_colors_suspicious_and_clean_differently() {
        let bbox = fixture_bbox(100, 100, 40);
        let img = draw_overlay(320, 240, &[(1, true, bbox), (2, false, bbox)]);
        assert_eq!(img.width(), 320);
    }

    #[test]
    fn encode_jpeg_round_trips_through_decoder() {
        let img = draw_overlay(64, 48, &[]);
        let jpeg = encode_jpeg(&img, 80);
        assert!(!jpeg.is_empty());
        let decoded = image::load_from_memory(&jpeg).expect("valid jpeg");
        assert_eq!(decoded.width(), 64);
        assert_eq!(decoded.height(), 48);
    }
}
