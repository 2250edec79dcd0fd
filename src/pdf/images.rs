//! Image extraction
//!
//! Walks a page's content stream, records every image draw with its current
//! transformation matrix, decodes each distinct image once and positions one
//! placement per draw in viewport space.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;

use base64::Engine;
use futures::future::join_all;
use image::RgbaImage;
use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, ObjectId};
use thiserror::Error;

use super::decode::{decode_image, DecodeError};
use super::objects::{page_object, ObjectStore};
use super::retry::{RetryError, RetryPolicy};
use super::types::{ImageFormat, ImagePlacement, PageViewport};

/// Above this many pixels an image is a JPEG candidate
const JPEG_PIXEL_THRESHOLD: u64 = 10_000;
/// Upper bound on alpha samples taken from one image
const ALPHA_SAMPLE_BUDGET: u64 = 4_096;
const JPEG_QUALITY: u8 = 95;
/// Nesting limit for form XObjects
const MAX_FORM_DEPTH: usize = 8;
/// `/Parent` links followed when inheriting page resources
const MAX_TREE_DEPTH: usize = 8;

type Matrix = [f32; 6];
const IDENTITY: Matrix = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("Image object never resolved: {0}")]
    Unresolved(#[from] RetryError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("Failed to encode image: {0}")]
    Encode(String),
    #[error("Failed to read page content: {0}")]
    Content(String),
    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// An image re-encoded for embedding in HTML
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub data_url: String,
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
}

/// One `Do` of an image XObject
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawOp {
    pub reference: ObjectId,
    pub ctm: Matrix,
}

/// Encoded images of one page, keyed by object reference
#[derive(Default)]
pub struct ImageCache {
    entries: HashMap<ObjectId, Arc<EncodedImage>>,
}

impl ImageCache {
    pub fn get(&self, id: &ObjectId) -> Option<Arc<EncodedImage>> {
        self.entries.get(id).cloned()
    }

    pub fn insert(&mut self, id: ObjectId, image: EncodedImage) -> Arc<EncodedImage> {
        let image = Arc::new(image);
        self.entries.insert(id, image.clone());
        image
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Result of extracting one page
#[derive(Debug, Default)]
pub struct ExtractionReport {
    pub placements: Vec<ImagePlacement>,
    /// Distinct images decoded
    pub decoded: usize,
    /// Distinct images skipped after a failure
    pub failed: usize,
}

/// Extracts positioned images from pages of one document
#[derive(Clone)]
pub struct ImageExtractor {
    objects: ObjectStore,
    policy: RetryPolicy,
}

impl ImageExtractor {
    pub fn new(objects: ObjectStore, policy: RetryPolicy) -> Self {
        Self { objects, policy }
    }

    /// Extract the images drawn on `page` (1-indexed).
    ///
    /// Never fails: problems are logged and the affected images skipped.
    pub async fn extract(&self, page: usize, viewport: PageViewport) -> ExtractionReport {
        let doc = match self.objects.document(self.policy).await {
            Ok(doc) => doc,
            Err(e) => {
                tracing::warn!("Page {}: object graph unavailable, no images: {}", page, e);
                return ExtractionReport::default();
            }
        };

        let scan_doc = doc.clone();
        let scan = tokio::task::spawn_blocking(move || collect_draws(&scan_doc, page));
        let draws = match scan.await {
            Ok(Ok(draws)) => draws,
            Ok(Err(e)) => {
                tracing::warn!("Page {}: skipping images: {}", page, e);
                return ExtractionReport::default();
            }
            Err(e) => {
                tracing::warn!("Page {}: image scan task failed: {}", page, e);
                return ExtractionReport::default();
            }
        };

        let mut distinct: Vec<ObjectId> = Vec::new();
        for draw in &draws {
            if !distinct.contains(&draw.reference) {
                distinct.push(draw.reference);
            }
        }

        let results = join_all(distinct.iter().map(|id| self.load(*id))).await;

        let mut cache = ImageCache::default();
        let mut report = ExtractionReport::default();
        for (id, result) in distinct.into_iter().zip(results) {
            match result {
                Ok(image) => {
                    cache.insert(id, image);
                    report.decoded += 1;
                }
                Err(e) => {
                    tracing::warn!("Page {}: skipping image {} {} R: {}", page, id.0, id.1, e);
                    report.failed += 1;
                }
            }
        }

        report.placements = draws
            .iter()
            .filter_map(|draw| {
                let image = cache.get(&draw.reference)?;
                Some(place(draw.ctm, &image, viewport))
            })
            .collect();

        tracing::debug!(
            "Page {}: {} image placements from {} decoded images",
            page,
            report.placements.len(),
            report.decoded
        );
        report
    }

    async fn load(&self, id: ObjectId) -> Result<EncodedImage, ImageError> {
        let doc = self.objects.resolve(id, self.policy).await?;
        tokio::task::spawn_blocking(move || {
            let pixels = decode_image(&doc, id)?;
            encode_image(&pixels)
        })
        .await?
    }
}

/// Gather image draws of a page in content-stream order
pub fn collect_draws(doc: &Document, page: usize) -> Result<Vec<DrawOp>, ImageError> {
    let page_id = page_object(doc, page)
        .ok_or_else(|| ImageError::Content(format!("page {} not found", page)))?;
    let content = doc
        .get_page_content(page_id)
        .map_err(|e| ImageError::Content(e.to_string()))?;
    let resources = page_resources(doc, page_id);

    let mut draws = Vec::new();
    walk(doc, &content, resources, IDENTITY, 0, &mut draws)?;
    Ok(draws)
}

fn walk(
    doc: &Document,
    content: &[u8],
    resources: Option<&Dictionary>,
    base: Matrix,
    depth: usize,
    draws: &mut Vec<DrawOp>,
) -> Result<(), ImageError> {
    let operations = Content::decode(content)
        .map_err(|e| ImageError::Content(e.to_string()))?
        .operations;

    let mut ctm = base;
    let mut stack: Vec<Matrix> = Vec::new();

    for op in operations {
        match op.operator.as_str() {
            "q" => stack.push(ctm),
            "Q" => ctm = stack.pop().unwrap_or(base),
            "cm" => {
                if let Some(m) = matrix_from(&op.operands) {
                    ctm = concat(m, ctm);
                }
            }
            "Do" => {
                let Some(name) = op.operands.first().and_then(|o| o.as_name().ok()) else {
                    continue;
                };
                let Some(id) = xobject_ref(doc, resources, name) else {
                    continue;
                };
                let Ok(stream) = doc.get_object(id).and_then(|o| o.as_stream()) else {
                    continue;
                };
                match stream.dict.get(b"Subtype").and_then(|o| o.as_name()) {
                    Ok(b"Image") => draws.push(DrawOp { reference: id, ctm }),
                    Ok(b"Form") if depth < MAX_FORM_DEPTH => {
                        let form_matrix = stream
                            .dict
                            .get(b"Matrix")
                            .ok()
                            .and_then(|m| m.as_array().ok())
                            .and_then(|m| matrix_from(m))
                            .unwrap_or(IDENTITY);
                        let form_resources = stream
                            .dict
                            .get(b"Resources")
                            .ok()
                            .and_then(|r| as_dict(doc, r))
                            .or(resources);
                        let body = if stream.dict.get(b"Filter").is_ok() {
                            stream
                                .decompressed_content()
                                .map_err(|e| ImageError::Content(e.to_string()))?
                        } else {
                            stream.content.clone()
                        };
                        let matrix = concat(form_matrix, ctm);
                        walk(doc, &body, form_resources, matrix, depth + 1, draws)?;
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }

    Ok(())
}

fn as_dict<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Dictionary> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok()?.as_dict().ok(),
        Object::Dictionary(dict) => Some(dict),
        _ => None,
    }
}

/// Page resources, inherited through at most `MAX_TREE_DEPTH` parents when absent
fn page_resources(doc: &Document, page_id: ObjectId) -> Option<&Dictionary> {
    let mut current = page_id;
    for _ in 0..=MAX_TREE_DEPTH {
        let dict = doc.get_object(current).ok()?.as_dict().ok()?;
        if let Ok(resources) = dict.get(b"Resources") {
            return as_dict(doc, resources);
        }
        current = dict.get(b"Parent").ok()?.as_reference().ok()?;
    }
    tracing::warn!("Page {:?}: no resources within {} parents", page_id, MAX_TREE_DEPTH);
    None
}

fn xobject_ref(doc: &Document, resources: Option<&Dictionary>, name: &[u8]) -> Option<ObjectId> {
    let xobjects = as_dict(doc, resources?.get(b"XObject").ok()?)?;
    xobjects.get(name).ok()?.as_reference().ok()
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(f) => Some(*f as f32),
        _ => None,
    }
}

fn matrix_from(operands: &[Object]) -> Option<Matrix> {
    if operands.len() != 6 {
        return None;
    }
    let mut m = IDENTITY;
    for (slot, operand) in m.iter_mut().zip(operands) {
        *slot = number(operand)?;
    }
    Some(m)
}

/// `m1 × m2` in PDF row-vector convention
fn concat(m1: Matrix, m2: Matrix) -> Matrix {
    [
        m1[0] * m2[0] + m1[1] * m2[2],
        m1[0] * m2[1] + m1[1] * m2[3],
        m1[2] * m2[0] + m1[3] * m2[2],
        m1[2] * m2[1] + m1[3] * m2[3],
        m1[4] * m2[0] + m1[5] * m2[2] + m2[4],
        m1[4] * m2[1] + m1[5] * m2[3] + m2[5],
    ]
}

/// Map the unit square under `ctm` into viewport pixels (top-left origin)
fn place(ctm: Matrix, image: &EncodedImage, viewport: PageViewport) -> ImagePlacement {
    let scale = viewport.scale;
    let width = ctm[0].hypot(ctm[1]);
    let height = ctm[2].hypot(ctm[3]);

    if width < f32::EPSILON || height < f32::EPSILON {
        return ImagePlacement {
            data_url: image.data_url.clone(),
            width: image.width as f32 * scale,
            height: image.height as f32 * scale,
            x: 0.0,
            y: 0.0,
        };
    }

    // Bounding box of the transformed unit square
    let xs = [ctm[4], ctm[4] + ctm[0], ctm[4] + ctm[2], ctm[4] + ctm[0] + ctm[2]];
    let ys = [ctm[5], ctm[5] + ctm[1], ctm[5] + ctm[3], ctm[5] + ctm[1] + ctm[3]];
    let left = xs.iter().copied().fold(f32::INFINITY, f32::min);
    let top = ys.iter().copied().fold(f32::NEG_INFINITY, f32::max);

    ImagePlacement {
        data_url: image.data_url.clone(),
        width: width * scale,
        height: height * scale,
        x: left * scale,
        y: viewport.height - top * scale,
    }
}

/// True when any sampled pixel is not fully opaque
fn has_transparency(pixels: &RgbaImage) -> bool {
    let total = pixels.width() as u64 * pixels.height() as u64;
    let step = (total / ALPHA_SAMPLE_BUDGET).max(1) as usize;
    pixels.pixels().step_by(step).any(|p| p.0[3] < 255)
}

/// Choose JPEG for large opaque images and PNG otherwise
pub fn choose_format(pixels: &RgbaImage) -> ImageFormat {
    let total = pixels.width() as u64 * pixels.height() as u64;
    if total > JPEG_PIXEL_THRESHOLD && !has_transparency(pixels) {
        ImageFormat::Jpeg
    } else {
        ImageFormat::Png
    }
}

/// Encode pixels as a self-contained data URL
pub fn encode_image(pixels: &RgbaImage) -> Result<EncodedImage, ImageError> {
    let format = choose_format(pixels);
    let mut bytes = Vec::new();

    match format {
        ImageFormat::Jpeg => {
            let rgb = image::DynamicImage::ImageRgba8(pixels.clone()).to_rgb8();
            let encoder =
                image::codecs::jpeg::JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY);
            rgb.write_with_encoder(encoder)
                .map_err(|e| ImageError::Encode(e.to_string()))?;
        }
        ImageFormat::Png => {
            pixels
                .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
                .map_err(|e| ImageError::Encode(e.to_string()))?;
        }
    }

    Ok(EncodedImage {
        data_url: format!(
            "data:{};base64,{}",
            format.content_type(),
            base64::engine::general_purpose::STANDARD.encode(&bytes)
        ),
        format,
        width: pixels.width(),
        height: pixels.height(),
    })
}
