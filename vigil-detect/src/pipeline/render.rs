//! Frame rendering for broadcast and snapshots

use crate::error::{Error, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

/// JPEG quality for live frames
pub const BROADCAST_JPEG_QUALITY: u8 = 80;

/// JPEG quality for saved snapshots
pub const SNAPSHOT_JPEG_QUALITY: u8 = 90;

const ALERT_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const BORDER_WIDTH: u32 = 4;

/// Red banner across the top plus a red border
pub fn draw_alert_overlay(image: &mut RgbImage) {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return;
    }

    let banner_height = (height / 10).max(1);
    draw_filled_rect_mut(image, Rect::at(0, 0).of_size(width, banner_height), ALERT_COLOR);

    let border = BORDER_WIDTH.min(width / 2).min(height / 2);
    for inset in 0..border {
        let w = width - 2 * inset;
        let h = height - 2 * inset;
        if w == 0 || h == 0 {
            break;
        }
        draw_hollow_rect_mut(
            image,
            Rect::at(inset as i32, inset as i32).of_size(w, h),
            ALERT_COLOR,
        );
    }
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality)
        .encode_image(image)
        .map_err(|e| Error::Media(format!("JPEG encode failed: {}", e)))?;
    Ok(bytes)
}

/// Render one live frame: optional overlay, JPEG, base64
pub fn render_broadcast_frame(image: &RgbImage, overlay: bool) -> Result<String> {
    let bytes = if overlay {
        let mut annotated = image.clone();
        draw_alert_overlay(&mut annotated);
        encode_jpeg(&annotated, BROADCAST_JPEG_QUALITY)?
    } else {
        encode_jpeg(image, BROADCAST_JPEG_QUALITY)?
    };
    Ok(STANDARD.encode(bytes))
}
