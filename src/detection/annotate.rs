use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use std::io::Cursor;

use crate::models::BoundingBox;

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const BOX_THICKNESS: i32 = 2;

/// Copy of `image` with a green outline around every box.
pub fn draw_regions(image: &DynamicImage, boxes: &[BoundingBox]) -> RgbImage {
    let mut canvas = image.to_rgb8();
    let (w, h) = canvas.dimensions();
    for bbox in boxes {
        let b = bbox.clamp_to(w, h);
        for inset in 0..BOX_THICKNESS {
            let width = b.width() - 2 * inset;
            let height = b.height() - 2 * inset;
            if width <= 0 || height <= 0 {
                break;
            }
            let rect = Rect::at(b.x1 + inset, b.y1 + inset).of_size(width as u32, height as u32);
            draw_hollow_rect_mut(&mut canvas, rect, BOX_COLOR);
        }
    }
    canvas
}

pub fn encode_jpeg(image: &RgbImage) -> anyhow::Result<Vec<u8>> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Jpeg)
        .map_err(|e| anyhow::anyhow!("Failed to encode JPEG: {}", e))?;
    Ok(bytes)
}

pub fn encode_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}
