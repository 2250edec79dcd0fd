//! Broken-image placeholder
//!
//! A light gray rectangle with a centered "Image Error" label, drawn with a
//! small built-in bitmap font so no font files are needed.

use std::io::Cursor;

use base64::Engine;
use image::{Rgb, RgbImage};

use super::ExportError;

pub const DEFAULT_PLACEHOLDER_SIZE: u32 = 200;
/// Largest placeholder side in pixels
pub const MAX_PLACEHOLDER_SIZE: u32 = 4096;
const FILL: Rgb<u8> = Rgb([0xee, 0xee, 0xee]);
const INK: Rgb<u8> = Rgb([0x99, 0x99, 0x99]);
const LABEL: &str = "Image Error";

const GLYPH_WIDTH: u32 = 5;
const GLYPH_HEIGHT: u32 = 7;
/// Horizontal advance per glyph, spacing included
const ADVANCE: u32 = GLYPH_WIDTH + 1;

/// 5x7 rows, most significant of the low five bits is the leftmost pixel
fn glyph(c: char) -> [u8; 7] {
    match c {
        'I' => [0b01110, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        'E' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b11111],
        'm' => [0b00000, 0b00000, 0b11010, 0b10101, 0b10101, 0b10101, 0b10101],
        'a' => [0b00000, 0b00000, 0b01110, 0b00001, 0b01111, 0b10001, 0b01111],
        'g' => [0b00000, 0b01111, 0b10001, 0b10001, 0b01111, 0b00001, 0b01110],
        'e' => [0b00000, 0b00000, 0b01110, 0b10001, 0b11111, 0b10000, 0b01110],
        'r' => [0b00000, 0b00000, 0b10110, 0b11001, 0b10000, 0b10000, 0b10000],
        'o' => [0b00000, 0b00000, 0b01110, 0b10001, 0b10001, 0b10001, 0b01110],
        _ => [0; 7],
    }
}

/// Placeholder bitmap of the given size, clamped to 1..=MAX_PLACEHOLDER_SIZE per side
pub fn placeholder_image(width: u32, height: u32) -> RgbImage {
    let width = width.clamp(1, MAX_PLACEHOLDER_SIZE);
    let height = height.clamp(1, MAX_PLACEHOLDER_SIZE);
    let mut img = RgbImage::from_pixel(width, height, FILL);

    let columns = LABEL.chars().count() as u32 * ADVANCE - 1;
    // Label spans at most 80% of the width and 30% of the height
    let scale = (width.saturating_mul(4) / 5 / columns)
        .min(height.saturating_mul(3) / 10 / GLYPH_HEIGHT);
    if scale == 0 {
        return img;
    }

    let label_width = columns * scale;
    let label_height = GLYPH_HEIGHT * scale;
    let left = (width - label_width) / 2;
    let top = (height - label_height) / 2;

    for (i, c) in LABEL.chars().enumerate() {
        let origin_x = left + i as u32 * ADVANCE * scale;
        for (row, bits) in glyph(c).iter().enumerate() {
            for col in 0..GLYPH_WIDTH {
                if bits & (1 << (GLYPH_WIDTH - 1 - col)) == 0 {
                    continue;
                }
                for dy in 0..scale {
                    for dx in 0..scale {
                        let x = origin_x + col * scale + dx;
                        img.put_pixel(x, top + row as u32 * scale + dy, INK);
                    }
                }
            }
        }
    }

    img
}

/// Placeholder as a PNG data URL
pub fn placeholder_data_url(width: u32, height: u32) -> Result<String, ExportError> {
    let mut png = Vec::new();
    placeholder_image(width, height)
        .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
        .map_err(|e| ExportError::Encode(e.to_string()))?;
    Ok(format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(&png)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_has_fill_and_centered_label() {
        let img = placeholder_image(200, 120);
        assert_eq!(img.dimensions(), (200, 120));
        assert_eq!(*img.get_pixel(0, 0), FILL);
        assert_eq!(*img.get_pixel(199, 119), FILL);

        let ink: Vec<(u32, u32)> = img
            .enumerate_pixels()
            .filter(|(_, _, p)| **p == INK)
            .map(|(x, y, _)| (x, y))
            .collect();
        assert!(!ink.is_empty());
        let min_x = ink.iter().map(|p| p.0).min().unwrap();
        let max_x = ink.iter().map(|p| p.0).max().unwrap();
        // Symmetric within a glyph column of slack
        assert!((min_x as i64 - (199 - max_x) as i64).abs() <= 4);
    }

    #[test]
    fn test_tiny_placeholder_skips_label() {
        let img = placeholder_image(10, 0);
        assert_eq!(img.dimensions(), (10, 1));
        assert!(img.pixels().all(|p| *p == FILL));
    }

    #[test]
    fn test_oversized_placeholder_is_capped() {
        let img = placeholder_image(u32::MAX, u32::MAX);
        assert_eq!(img.dimensions(), (MAX_PLACEHOLDER_SIZE, MAX_PLACEHOLDER_SIZE));
        assert!(img.pixels().any(|p| *p == INK));
    }

    #[test]
    fn test_data_url_is_png() {
        let url = placeholder_data_url(40, 30).unwrap();
        let data = url.strip_prefix("data:image/png;base64,").unwrap();
        let bytes = base64::engine::general_purpose::STANDARD.decode(data).unwrap();
        let img = image::load_from_memory(&bytes).unwrap();
        assert_eq!((img.width(), img.height()), (40, 30));
    }
}
