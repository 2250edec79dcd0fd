//! Images inserted through the editor

use std::io::Cursor;

use base64::Engine;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use tracing::warn;

/// Quality for JPEG uploads re-encoded after resizing
const JPEG_QUALITY: u8 = 95;

const PLACEHOLDER_SVG: &str = "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"200\" height=\"200\">\
<rect width=\"200\" height=\"200\" fill=\"#eeeeee\"/>\
<text x=\"100\" y=\"100\" font-family=\"Arial\" font-size=\"16\" fill=\"#999999\" \
text-anchor=\"middle\" dominant-baseline=\"middle\">Image Error</text></svg>";

/// Turn uploaded image bytes into a data URL fit for a page.
///
/// Wider images are scaled to `max_width`. Undecodable input yields an SVG
/// placeholder instead of an error.
pub fn normalize_inserted_image(bytes: &[u8], max_width: u32) -> String {
    match try_normalize(bytes, max_width) {
        Ok(url) => url,
        Err(e) => {
            warn!("Inserted image could not be decoded, using placeholder: {}", e);
            placeholder_data_url()
        }
    }
}

fn try_normalize(bytes: &[u8], max_width: u32) -> Result<String, image::ImageError> {
    let format = image::guess_format(bytes)?;
    let mut img = image::load_from_memory_with_format(bytes, format)?;

    if img.width() > max_width && max_width > 0 {
        let height = ((img.height() as f64 * max_width as f64) / img.width() as f64)
            .round()
            .max(1.0) as u32;
        img = img.resize_exact(max_width, height, FilterType::Lanczos3);
    }

    let mut out = Vec::new();
    let content_type = if format == ImageFormat::Jpeg {
        let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY);
        DynamicImage::ImageRgb8(img.to_rgb8()).write_with_encoder(encoder)?;
        "image/jpeg"
    } else {
        img.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)?;
        "image/png"
    };

    Ok(format!(
        "data:{};base64,{}",
        content_type,
        base64::engine::general_purpose::STANDARD.encode(&out)
    ))
}

pub fn placeholder_data_url() -> String {
    format!(
        "data:image/svg+xml;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(PLACEHOLDER_SVG)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    fn decode(url: &str) -> (String, DynamicImage) {
        let (head, data) = url.split_once(";base64,").unwrap();
        let bytes = base64::engine::general_purpose::STANDARD.decode(data).unwrap();
        (head.to_string(), image::load_from_memory(&bytes).unwrap())
    }

    #[test]
    fn test_wide_png_is_scaled_to_max_width() {
        let mut bytes = Vec::new();
        RgbaImage::from_pixel(1400, 200, Rgba([10, 20, 30, 128]))
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();

        let (head, img) = decode(&normalize_inserted_image(&bytes, 700));
        assert_eq!(head, "data:image/png");
        assert_eq!((img.width(), img.height()), (700, 100));
    }

    #[test]
    fn test_jpeg_stays_jpeg() {
        let mut bytes = Vec::new();
        RgbImage::from_pixel(64, 32, Rgb([200, 100, 50]))
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Jpeg)
            .unwrap();

        let (head, img) = decode(&normalize_inserted_image(&bytes, 700));
        assert_eq!(head, "data:image/jpeg");
        assert_eq!((img.width(), img.height()), (64, 32));
    }

    #[test]
    fn test_garbage_yields_placeholder() {
        let url = normalize_inserted_image(b"not an image", 700);
        assert_eq!(url, placeholder_data_url());
        assert!(url.starts_with("data:image/svg+xml;base64,"));
    }
}
