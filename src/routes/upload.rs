//! Upload Routes
//!
//! POST /api/upload - Server enrichment of a PDF: text and OCR per page.
//! Stateless; the active editing session is not touched.

use std::io::Write;

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::enrich::{enrich_document, PageEnrichment};
use crate::error::{AppError, Result};
use crate::pdf::{PageSource, PdfError, PdfParser};
use crate::state::AppState;

const PDF_MIME: &str = "application/pdf";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    pub pages: Vec<PageEnrichment>,
    pub page_count: usize,
}

/// A PDF read from a multipart form
pub struct PdfUpload {
    pub file_name: Option<String>,
    pub bytes: Vec<u8>,
}

/// Read the `pdf` field. A declared non-PDF type is rejected before the
/// body is consumed.
pub async fn read_pdf_field(multipart: &mut Multipart) -> Result<PdfUpload> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("pdf") {
            tracing::debug!("Ignoring multipart field {:?}", field.name());
            continue;
        }

        if let Some(content_type) = field.content_type() {
            if !content_type.eq_ignore_ascii_case(PDF_MIME) {
                tracing::warn!("Rejected upload with content type {}", content_type);
                return Err(AppError::BadRequest("Only PDF files are allowed".to_string()));
            }
        }

        let file_name = field.file_name().map(str::to_string);
        let bytes = field.bytes().await?;
        tracing::debug!("Read {} bytes of PDF data", bytes.len());
        return Ok(PdfUpload {
            file_name,
            bytes: bytes.to_vec(),
        });
    }

    Err(AppError::BadRequest("No PDF file uploaded".to_string()))
}

/// POST /api/upload
pub async fn upload_pdf(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>> {
    let upload = read_pdf_field(&mut multipart).await?;
    let temp_dir = state.config().upload.temp_dir.clone();

    let processed = tokio::task::spawn_blocking(move || {
        std::fs::create_dir_all(&temp_dir)?;
        let mut file = NamedTempFile::new_in(&temp_dir)?;
        file.write_all(&upload.bytes)?;
        file.flush()?;
        tracing::debug!("Processing PDF: {}", file.path().display());
        let parser = PdfParser::from_path(file.path())?;
        Ok::<_, PdfError>((file, parser))
    })
    .await
    .map_err(PdfError::from)
    .and_then(|result| result);

    let (file, parser) = processed.map_err(|e| {
        AppError::failed(StatusCode::INTERNAL_SERVER_ERROR, "Failed to process PDF", e)
    })?;

    let page_count = parser.page_count();
    let pages = enrich_document(std::sync::Arc::new(parser), state.ocr(), None).await;
    drop(file);

    tracing::info!("Enriched uploaded PDF with {} pages", page_count);
    Ok(Json(UploadResponse {
        success: true,
        pages,
        page_count,
    }))
}
