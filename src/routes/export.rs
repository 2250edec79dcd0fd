//! Export routes
//!
//! - POST /api/export - Print an HTML fragment to an A4 PDF
//! - POST /api/session/export - Rasterize the active session's pages

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::export::ExportError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRequest {
    #[serde(default)]
    pub html_content: Option<String>,
}

fn pdf_attachment(bytes: Vec<u8>, file_name: &str) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        Body::from(bytes),
    )
        .into_response()
}

/// POST /api/export
pub async fn export_html(
    State(state): State<AppState>,
    Json(request): Json<ExportRequest>,
) -> Result<Response> {
    let html = match request.html_content {
        Some(html) if !html.trim().is_empty() => html,
        _ => return Err(AppError::BadRequest("No HTML content provided".to_string())),
    };

    let bytes = state.printer().export(&html).await.map_err(|e| match e {
        ExportError::Empty => AppError::BadRequest("No HTML content provided".to_string()),
        other => AppError::Failed {
            status: other.status_code(),
            message: format!("Failed to generate PDF: {}", other),
            details: None,
        },
    })?;

    Ok(pdf_attachment(bytes, "exported.pdf"))
}

/// POST /api/session/export
///
/// On failure the session is left as it was; nothing partial is returned.
pub async fn export_session(State(state): State<AppState>) -> Result<Response> {
    let (pages, extracted) = state
        .sessions()
        .with_session(|s| Ok((s.export_pages(), s.extracted_images())))
        .await?;
    let count = pages.len();

    let bytes = state.exporter().export(pages, &extracted).await?;
    tracing::info!("Exported {} pages ({} bytes)", count, bytes.len());

    Ok(pdf_attachment(bytes, "edited-document.pdf"))
}
