//! Image repair before rasterization
//!
//! Every `<img>` of a page is classified by its source. Decodable data URLs
//! stay as they are, files under the public directory are inlined, and
//! extracted PDF images whose source was lost are restored by element id.
//! Anything else gets a placeholder of the image's intended size.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Component, Path};
use std::rc::Rc;

use base64::Engine;
use lol_html::html_content::EndTag;
use lol_html::{element, rewrite_str, RewriteStrSettings};
use tracing::{debug, warn};

use super::placeholder::{placeholder_data_url, DEFAULT_PLACEHOLDER_SIZE, MAX_PLACEHOLDER_SIZE};
use super::ExportError;
use crate::html::{image_element_id, parse_px, style_property, RewriteError};
use crate::pdf::ImagePlacement;

#[derive(Debug, Clone, Default)]
pub struct RepairReport {
    pub html: String,
    pub kept: usize,
    pub inlined: usize,
    pub restored: usize,
    pub replaced: usize,
}

/// Data URLs of the images extracted at load time, by element id
#[derive(Debug, Clone, Default)]
pub struct ExtractedImages(HashMap<String, String>);

impl ExtractedImages {
    /// `pages` in source order, so the n-th entry holds page n's placements
    pub fn from_pages<'a, I>(pages: I) -> Self
    where
        I: IntoIterator<Item = &'a [ImagePlacement]>,
    {
        let mut images = HashMap::new();
        for (page, placements) in pages.into_iter().enumerate() {
            for (index, placement) in placements.iter().enumerate() {
                images.insert(image_element_id(page + 1, index), placement.data_url.clone());
            }
        }
        Self(images)
    }

    pub fn get(&self, id: &str) -> Option<&str> {
        self.0.get(id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The original data URL for `id`, if it still decodes
    fn restorable(&self, id: &str) -> Option<&str> {
        self.get(id)
            .filter(|url| url.strip_prefix("data:").is_some_and(data_url_decodes))
    }
}

enum Source {
    Keep,
    Inline(String),
    Replace(&'static str),
}

/// Repair every image of `html`. Relative sources resolve under `public_dir`.
pub fn repair_images(
    html: &str,
    public_dir: Option<&Path>,
    extracted: &ExtractedImages,
) -> Result<RepairReport, ExportError> {
    let figures: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
    let placeholders: RefCell<HashMap<(u32, u32), String>> = RefCell::new(HashMap::new());
    let report = RefCell::new(RepairReport::default());

    let html = rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![
                element!("figure", |el| {
                    figures
                        .borrow_mut()
                        .push(el.get_attribute("style").unwrap_or_default());
                    let stack = figures.clone();
                    if let Some(handlers) = el.end_tag_handlers() {
                        handlers.push(Box::new(move |_end: &mut EndTag<'_>| {
                            stack.borrow_mut().pop();
                            Ok(())
                        }) as lol_html::EndTagHandler<'static>);
                    }
                    Ok(())
                }),
                element!("img", |el| {
                    let src = el.get_attribute("src").unwrap_or_default();
                    match classify(&src, public_dir) {
                        Source::Keep => report.borrow_mut().kept += 1,
                        Source::Inline(data_url) => {
                            el.set_attribute("src", &data_url)?;
                            report.borrow_mut().inlined += 1;
                        }
                        Source::Replace(reason) => {
                            let id = el.get_attribute("id").unwrap_or_default();
                            if let Some(original) = extracted.restorable(&id) {
                                debug!(id = id.as_str(), "Restoring extracted image: {}", reason);
                                el.set_attribute("src", original)?;
                                report.borrow_mut().restored += 1;
                                return Ok(());
                            }

                            let figure_style = figures.borrow().last().cloned().unwrap_or_default();
                            let size = intended_size(
                                el.get_attribute("width").as_deref(),
                                el.get_attribute("height").as_deref(),
                                &figure_style,
                            );
                            debug!(
                                id = id.as_str(),
                                width = size.0,
                                height = size.1,
                                "Replacing image: {}",
                                reason
                            );
                            let mut cache = placeholders.borrow_mut();
                            let url = match cache.get(&size) {
                                Some(url) => url.clone(),
                                None => {
                                    let url = placeholder_data_url(size.0, size.1)
                                        .map_err(|e| e.to_string())?;
                                    cache.insert(size, url.clone());
                                    url
                                }
                            };
                            el.set_attribute("src", &url)?;
                            el.set_attribute("data-placeholder", "true")?;
                            report.borrow_mut().replaced += 1;
                        }
                    }
                    Ok(())
                }),
            ],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|e| RewriteError::Rewrite(e.to_string()))?;

    let mut report = report.into_inner();
    report.html = html;
    if report.replaced > 0 {
        warn!("Replaced {} broken image(s) with placeholders", report.replaced);
    }
    Ok(report)
}

fn classify(src: &str, public_dir: Option<&Path>) -> Source {
    let src = src.trim();
    if src.is_empty() {
        return Source::Replace("missing source");
    }
    if let Some(rest) = src.strip_prefix("data:") {
        return if data_url_decodes(rest) {
            Source::Keep
        } else {
            Source::Replace("undecodable data URL")
        };
    }
    let lower = src.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") || lower.starts_with("//") {
        return Source::Replace("remote source");
    }

    match public_dir.and_then(|dir| inline_local(dir, src)) {
        Some(data_url) => Source::Inline(data_url),
        None => Source::Replace("unresolvable local source"),
    }
}

/// `rest` is everything after `data:`
fn data_url_decodes(rest: &str) -> bool {
    let Some((meta, payload)) = rest.split_once(',') else {
        return false;
    };
    let is_base64 = meta.ends_with(";base64");
    let mime = meta.split(';').next().unwrap_or("").to_ascii_lowercase();

    if mime == "image/svg+xml" {
        return if is_base64 {
            base64::engine::general_purpose::STANDARD.decode(payload.trim()).is_ok()
        } else {
            !payload.trim().is_empty()
        };
    }
    if !is_base64 {
        return false;
    }
    match base64::engine::general_purpose::STANDARD.decode(payload.trim()) {
        Ok(bytes) => image::load_from_memory(&bytes).is_ok(),
        Err(_) => false,
    }
}

fn inline_local(public_dir: &Path, src: &str) -> Option<String> {
    let path = src.split(['?', '#']).next().unwrap_or("");
    let relative = Path::new(path.trim_start_matches('/'));
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    {
        return None;
    }

    let bytes = std::fs::read(public_dir.join(relative)).ok()?;
    let format = image::guess_format(&bytes).ok()?;
    image::load_from_memory_with_format(&bytes, format).ok()?;
    Some(format!(
        "data:{};base64,{}",
        format.to_mime_type(),
        base64::engine::general_purpose::STANDARD.encode(&bytes)
    ))
}

/// Attributes first, then the enclosing figure's style, then the default.
/// Each side is capped at `MAX_PLACEHOLDER_SIZE`.
fn intended_size(width: Option<&str>, height: Option<&str>, figure_style: &str) -> (u32, u32) {
    let pick = |attr: Option<&str>, property: &str| {
        attr.and_then(parse_px)
            .or_else(|| style_property(figure_style, property).and_then(parse_px))
            .filter(|v| *v >= 1.0)
            .map(|v| v.min(MAX_PLACEHOLDER_SIZE as f32).round() as u32)
            .unwrap_or(DEFAULT_PLACEHOLDER_SIZE)
    };
    (pick(width, "width"), pick(height, "height"))
}
