//! Image XObject decoding
//!
//! Turns an image stream into an RGBA pixel buffer. Only the encodings seen
//! in ordinary office and scanner output are handled; everything else is
//! reported as unsupported so the caller can skip that image.

use image::{DynamicImage, RgbaImage};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Object is not an image stream: {0}")]
    NotAnImage(String),
    #[error("Unsupported image encoding: {0}")]
    Unsupported(String),
    #[error("Image data is truncated: got {got} bytes, expected {expected}")]
    Truncated { got: usize, expected: usize },
    #[error("Failed to decompress image: {0}")]
    Decompress(String),
    #[error("Failed to decode embedded JPEG: {0}")]
    Jpeg(String),
}

/// Decode the image stream `id` into RGBA, applying its soft mask if any
pub fn decode_image(doc: &Document, id: ObjectId) -> Result<RgbaImage, DecodeError> {
    let stream = doc
        .get_object(id)
        .and_then(|o| o.as_stream())
        .map_err(|e| DecodeError::NotAnImage(e.to_string()))?;

    let subtype = stream.dict.get(b"Subtype").and_then(|o| o.as_name()).unwrap_or(b"");
    if subtype != b"Image" {
        return Err(DecodeError::NotAnImage(String::from_utf8_lossy(subtype).into_owned()));
    }

    let mut rgba = decode_color(doc, stream)?.to_rgba8();

    if let Some(mask) = soft_mask(doc, &stream.dict) {
        match decode_alpha(mask, rgba.width(), rgba.height()) {
            Ok(alpha) => {
                for (pixel, a) in rgba.pixels_mut().zip(alpha) {
                    pixel.0[3] = a;
                }
            }
            Err(e) => tracing::debug!("Ignoring unreadable soft mask on {:?}: {}", id, e),
        }
    }

    Ok(rgba)
}

fn dimension(dict: &Dictionary, key: &[u8]) -> Result<u32, DecodeError> {
    match dict.get(key) {
        Ok(Object::Integer(v)) if *v > 0 => Ok(*v as u32),
        _ => Err(DecodeError::NotAnImage(format!(
            "missing {}",
            String::from_utf8_lossy(key)
        ))),
    }
}

fn filters(stream: &Stream) -> Vec<Vec<u8>> {
    match stream.dict.get(b"Filter") {
        Ok(Object::Name(name)) => vec![name.clone()],
        Ok(Object::Array(items)) => items
            .iter()
            .filter_map(|f| f.as_name().ok().map(|n| n.to_vec()))
            .collect(),
        _ => Vec::new(),
    }
}

/// Raw sample bytes with stream filters removed
fn sample_data(stream: &Stream) -> Result<Vec<u8>, DecodeError> {
    if stream.dict.get(b"Filter").is_ok() {
        stream
            .decompressed_content()
            .map_err(|e| DecodeError::Decompress(e.to_string()))
    } else {
        Ok(stream.content.clone())
    }
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        other => other,
    }
}

enum ColorModel {
    Gray,
    Rgb,
    Cmyk,
    /// Palette of RGB triples
    Indexed(Vec<u8>),
}

fn color_model(doc: &Document, dict: &Dictionary) -> Result<ColorModel, DecodeError> {
    if matches!(dict.get(b"ImageMask"), Ok(Object::Boolean(true))) {
        return Ok(ColorModel::Gray);
    }
    let Ok(space) = dict.get(b"ColorSpace") else {
        return Ok(ColorModel::Gray);
    };
    model_for(doc, resolve(doc, space))
}

fn model_for(doc: &Document, space: &Object) -> Result<ColorModel, DecodeError> {
    match space {
        Object::Name(name) => match name.as_slice() {
            b"DeviceGray" | b"CalGray" | b"G" => Ok(ColorModel::Gray),
            b"DeviceRGB" | b"CalRGB" | b"RGB" => Ok(ColorModel::Rgb),
            b"DeviceCMYK" | b"CMYK" => Ok(ColorModel::Cmyk),
            other => Err(DecodeError::Unsupported(String::from_utf8_lossy(other).into_owned())),
        },
        Object::Array(items) => {
            let family = items.first().and_then(|o| o.as_name().ok()).unwrap_or(b"");
            match family {
                b"ICCBased" => {
                    let components = items
                        .get(1)
                        .map(|o| resolve(doc, o))
                        .and_then(|o| o.as_stream().ok())
                        .and_then(|s| s.dict.get(b"N").ok())
                        .and_then(|n| n.as_i64().ok())
                        .unwrap_or(3);
                    match components {
                        1 => Ok(ColorModel::Gray),
                        4 => Ok(ColorModel::Cmyk),
                        _ => Ok(ColorModel::Rgb),
                    }
                }
                b"CalRGB" | b"Lab" => Ok(ColorModel::Rgb),
                b"CalGray" => Ok(ColorModel::Gray),
                b"Indexed" | b"I" => {
                    let base = items
                        .get(1)
                        .map(|o| resolve(doc, o))
                        .ok_or_else(|| {
                            DecodeError::Unsupported("Indexed without base".to_string())
                        })?;
                    if !matches!(model_for(doc, base)?, ColorModel::Rgb) {
                        let reason = "Indexed over non-RGB base".to_string();
                        return Err(DecodeError::Unsupported(reason));
                    }
                    let lookup = match items.get(3).map(|o| resolve(doc, o)) {
                        Some(Object::String(bytes, _)) => bytes.clone(),
                        Some(Object::Stream(s)) => sample_data(s)?,
                        _ => return Err(DecodeError::Unsupported("Indexed lookup".to_string())),
                    };
                    Ok(ColorModel::Indexed(lookup))
                }
                other => Err(DecodeError::Unsupported(String::from_utf8_lossy(other).into_owned())),
            }
        }
        _ => Err(DecodeError::Unsupported("color space".to_string())),
    }
}

fn decode_color(doc: &Document, stream: &Stream) -> Result<DynamicImage, DecodeError> {
    let filters = filters(stream);
    if let Some(last) = filters.last() {
        match last.as_slice() {
            b"DCTDecode" | b"DCT" if filters.len() == 1 => {
                return image::load_from_memory_with_format(
                    &stream.content,
                    image::ImageFormat::Jpeg,
                )
                .map_err(|e| DecodeError::Jpeg(e.to_string()));
            }
            b"DCTDecode" | b"DCT" | b"JPXDecode" | b"JBIG2Decode" | b"CCITTFaxDecode" => {
                return Err(DecodeError::Unsupported(String::from_utf8_lossy(last).into_owned()));
            }
            _ => {}
        }
    }

    let width = dimension(&stream.dict, b"Width")?;
    let height = dimension(&stream.dict, b"Height")?;
    let bits = stream
        .dict
        .get(b"BitsPerComponent")
        .and_then(|o| o.as_i64())
        .unwrap_or(8);
    let data = sample_data(stream)?;
    let pixels = width as usize * height as usize;

    let model = color_model(doc, &stream.dict)?;

    let rgb: Vec<u8> = match (bits, model) {
        (1, ColorModel::Gray) => {
            let row_bytes = (width as usize + 7) / 8;
            require(&data, row_bytes * height as usize)?;
            let mut out = Vec::with_capacity(pixels * 3);
            for y in 0..height as usize {
                for x in 0..width as usize {
                    let bit = (data[y * row_bytes + x / 8] >> (7 - (x % 8))) & 1;
                    // Stencil masks paint where the bit is 0, which also reads as black
                    let v = if bit == 0 { 0 } else { 255 };
                    out.extend_from_slice(&[v, v, v]);
                }
            }
            out
        }
        (8, ColorModel::Gray) => {
            require(&data, pixels)?;
            data[..pixels].iter().flat_map(|&v| [v, v, v]).collect()
        }
        (8, ColorModel::Rgb) => {
            require(&data, pixels * 3)?;
            data[..pixels * 3].to_vec()
        }
        (8, ColorModel::Cmyk) => {
            require(&data, pixels * 4)?;
            data[..pixels * 4]
                .chunks_exact(4)
                .flat_map(|px| {
                    let k = 1.0 - px[3] as f32 / 255.0;
                    [
                        ((255 - px[0]) as f32 * k) as u8,
                        ((255 - px[1]) as f32 * k) as u8,
                        ((255 - px[2]) as f32 * k) as u8,
                    ]
                })
                .collect()
        }
        (8, ColorModel::Indexed(lookup)) => {
            require(&data, pixels)?;
            data[..pixels]
                .iter()
                .flat_map(|&i| {
                    let at = i as usize * 3;
                    match lookup.get(at..at + 3) {
                        Some(rgb) => [rgb[0], rgb[1], rgb[2]],
                        None => [0, 0, 0],
                    }
                })
                .collect()
        }
        (bits, _) => {
            return Err(DecodeError::Unsupported(format!("{} bits per component", bits)));
        }
    };

    image::RgbImage::from_raw(width, height, rgb)
        .map(DynamicImage::ImageRgb8)
        .ok_or(DecodeError::Truncated {
            got: data.len(),
            expected: pixels * 3,
        })
}

fn require(data: &[u8], expected: usize) -> Result<(), DecodeError> {
    if data.len() < expected {
        return Err(DecodeError::Truncated {
            got: data.len(),
            expected,
        });
    }
    Ok(())
}

fn soft_mask<'a>(doc: &'a Document, dict: &'a Dictionary) -> Option<&'a Stream> {
    let id = dict.get(b"SMask").ok()?.as_reference().ok()?;
    doc.get_object(id).ok()?.as_stream().ok()
}

fn decode_alpha(mask: &Stream, width: u32, height: u32) -> Result<Vec<u8>, DecodeError> {
    let mask_width = dimension(&mask.dict, b"Width")?;
    let mask_height = dimension(&mask.dict, b"Height")?;
    let data = sample_data(mask)?;
    require(&data, (mask_width * mask_height) as usize)?;

    if mask_width == width && mask_height == height {
        return Ok(data[..(width * height) as usize].to_vec());
    }

    let expected = (mask_width * mask_height) as usize;
    let gray = image::GrayImage::from_raw(mask_width, mask_height, data[..expected].to_vec())
        .ok_or(DecodeError::Truncated {
            got: data.len(),
            expected,
        })?;
    let resized =
        image::imageops::resize(&gray, width, height, image::imageops::FilterType::Triangle);
    Ok(resized.into_raw())
}
