//! PDF data types
//!
//! Core types shared by the parser adapter, the image extractor and the
//! layout reconstructor.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// PDF parsing errors
#[derive(Error, Debug)]
pub enum PdfError {
    #[error("Failed to load PDF: {0}")]
    Load(String),
    #[error("PDF is password protected")]
    PasswordProtected,
    #[error("PDF has no pages")]
    NoPages,
    #[error("Failed to render page: {0}")]
    Render(String),
    #[error("Page {0} not found (document has {1} pages)")]
    PageNotFound(usize, usize),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image encoding error: {0}")]
    Image(String),
    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),
    #[error("Background task failed: {0}")]
    Join(String),
    #[error("MuPDF error: {0}")]
    MuPdf(String),
}

impl From<mupdf::Error> for PdfError {
    fn from(e: mupdf::Error) -> Self {
        PdfError::MuPdf(e.to_string())
    }
}

impl From<tokio::task::JoinError> for PdfError {
    fn from(e: tokio::task::JoinError) -> Self {
        PdfError::Join(e.to_string())
    }
}

impl PdfError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Self::Load(_) | Self::PasswordProtected | Self::NoPages => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::PageNotFound(_, _) => StatusCode::NOT_FOUND,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// A positioned run of text as laid down by the content stream.
///
/// `transform` is the text-space matrix `[a b c d e f]` in PDF user space
/// (origin bottom-left, units of points). Runs without a transform cannot be
/// placed and are dropped by the reconstructor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRun {
    pub text: String,
    pub transform: Option<[f32; 6]>,
    /// Advance width in points
    pub width: f32,
}

impl TextRun {
    pub fn new(text: impl Into<String>, transform: [f32; 6], width: f32) -> Self {
        Self {
            text: text.into(),
            transform: Some(transform),
            width,
        }
    }
}

/// Intrinsic page size in points
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageDimensions {
    pub width: f32,
    pub height: f32,
}

/// A page scaled into the fixed viewport envelope
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageViewport {
    pub width: f32,
    pub height: f32,
    pub scale: f32,
}

impl PageViewport {
    /// Scale a page so it fits inside `max_width` x `max_height`.
    pub fn fit(page: PageDimensions, max_width: f32, max_height: f32) -> Self {
        let width = page.width.max(1.0);
        let height = page.height.max(1.0);
        let scale = (max_width / width).min(max_height / height);
        Self {
            width: width * scale,
            height: height * scale,
            scale,
        }
    }
}

/// An extracted image and where it sits on the page.
///
/// Coordinates are page-space pixels with the origin at the top-left.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagePlacement {
    pub data_url: String,
    pub width: f32,
    pub height: f32,
    pub x: f32,
    pub y: f32,
}

/// Encoded image format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Png,
    Jpeg,
}

impl ImageFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
        }
    }
}
