//! Error types for the Redraft server

use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::export::ExportError;
use crate::ocr::OcrError;
use crate::pdf::PdfError;
use crate::session::SessionError;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    /// A failure reported under a fixed message, with the cause as details
    #[error("{message}")]
    Failed {
        status: StatusCode,
        message: String,
        details: Option<String>,
    },

    #[error(transparent)]
    Pdf(#[from] PdfError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Ocr(#[from] OcrError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("Failed to read upload: {0}")]
    Multipart(#[from] MultipartError),
}

impl AppError {
    pub fn failed(status: StatusCode, message: impl Into<String>, details: impl ToString) -> Self {
        AppError::Failed {
            status,
            message: message.into(),
            details: Some(details.to_string()),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Failed { status, .. } => *status,
            AppError::Pdf(e) => e.status_code(),
            AppError::Session(e) => e.status_code(),
            AppError::Ocr(e) => e.status_code(),
            AppError::Export(e) => e.status_code(),
            AppError::Multipart(e) => e.status(),
        }
    }
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("{}", self);
        } else {
            tracing::debug!("Request rejected ({}): {}", status, self);
        }

        let body = match self {
            AppError::Failed { message, details, .. } => ErrorResponse { error: message, details },
            other => ErrorResponse {
                error: other.to_string(),
                details: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_details_are_omitted_when_absent() {
        let (status, body) =
            body_json(AppError::BadRequest("No PDF file uploaded".to_string())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, serde_json::json!({"error": "No PDF file uploaded"}));
    }

    #[tokio::test]
    async fn test_failed_carries_details() {
        let err = AppError::failed(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to process PDF",
            "bad xref",
        );
        let (status, body) = body_json(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Failed to process PDF");
        assert_eq!(body["details"], "bad xref");
    }

    #[tokio::test]
    async fn test_domain_status_is_kept() {
        let (status, body) = body_json(SessionError::NoSession.into()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "No document is loaded");
    }
}
