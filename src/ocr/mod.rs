//! OCR (Optical Character Recognition) module
//!
//! Provides text recognition for rendered PDF pages using:
//! - Tesseract OCR (local, fast)
//! - Ollama vision models (local LLM)
//!
//! Recognition is best-effort: every failure path resolves to empty text.

pub mod engine;
pub mod provider;
pub mod service;
pub mod types;

pub use engine::{OcrEngine, OcrOptions, ProgressCallback};
pub use provider::{OcrProviderTrait, OllamaProvider};
#[cfg(feature = "ocr-tesseract")]
pub use provider::TesseractProvider;
pub use service::{OcrService, OCR_RENDER_SCALE};
pub use types::{OcrError, OcrProvider, Recognition};
