//! OCR Types

use std::fmt;

use serde::{Deserialize, Serialize};

/// Backend that produced a recognition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OcrProvider {
    #[default]
    Tesseract,
    Ollama,
}

impl fmt::Display for OcrProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OcrProvider::Tesseract => "tesseract",
            OcrProvider::Ollama => "ollama",
        })
    }
}

/// Text recognized in one page image
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recognition {
    /// Trimmed text, possibly empty
    pub text: String,
    pub provider: OcrProvider,
    /// 0-100, when the backend reports one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

impl Recognition {
    pub fn new(provider: OcrProvider, text: &str) -> Self {
        Self {
            text: text.trim().to_string(),
            provider,
            confidence: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OcrError {
    #[error("No OCR provider available: {0}")]
    Unavailable(String),

    #[error("Recognition failed: {0}")]
    Failed(String),

    #[error("OCR service error: {0}")]
    Remote(String),

    #[error("OCR timed out after {0} seconds")]
    Timeout(u64),

    #[error("OCR engine has been shut down")]
    ShutDown,
}

impl OcrError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Self::Unavailable(_) | Self::ShutDown => StatusCode::SERVICE_UNAVAILABLE,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Failed(_) | Self::Remote(_) => StatusCode::BAD_GATEWAY,
        }
    }
}
