//! PDF export
//!
//! Two ways out of HTML and back into PDF:
//! - `ExportRasterizer`: every session page is repaired, rasterized and
//!   embedded as a full-page JPEG, in order
//! - `PrintExporter`: one HTML document laid out on A4 pages, backing
//!   `POST /api/export`

mod pipeline;
mod placeholder;
mod print;
mod raster;
mod repair;
mod writer;

pub use pipeline::{ExportRasterizer, EXPORT_JPEG_QUALITY, RASTER_SCALE};
pub use placeholder::{
    placeholder_data_url, placeholder_image, DEFAULT_PLACEHOLDER_SIZE, MAX_PLACEHOLDER_SIZE,
};
pub use print::{print_document, PrintExporter, A4_HEIGHT, A4_WIDTH, PRINT_MARGIN};
pub use raster::{MupdfRasterizer, PageRasterizer};
pub use repair::{repair_images, ExtractedImages, RepairReport};
pub use writer::{encode_jpeg, PdfWriter};

use serde::Serialize;

use crate::html::RewriteError;

/// A committed page ready for export
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportPage {
    pub page_number: usize,
    pub html: String,
    /// Logical page size in CSS pixels
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("Nothing to export")]
    Empty,
    #[error("Failed to render page {page}: {reason}")]
    Render { page: usize, reason: String },
    #[error("Rasterization failed: {0}")]
    Raster(String),
    #[error("Failed to encode page image: {0}")]
    Encode(String),
    #[error("Failed to assemble PDF: {0}")]
    Assemble(String),
    #[error(transparent)]
    Rewrite(#[from] RewriteError),
    #[error("Export timed out after {0}s")]
    Timeout(u64),
    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl ExportError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Self::Empty => StatusCode::BAD_REQUEST,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<crate::pdf::PdfError> for ExportError {
    fn from(err: crate::pdf::PdfError) -> Self {
        ExportError::Raster(err.to_string())
    }
}
