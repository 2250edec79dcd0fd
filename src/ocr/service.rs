//! Page-level OCR
//!
//! Renders a PDF page and runs it through the shared engine.

use std::sync::Arc;

use tracing::warn;

use crate::pdf::PdfParser;

use super::engine::{OcrEngine, ProgressCallback};

/// Render scale for OCR input (2x of 72 DPI)
pub const OCR_RENDER_SCALE: f32 = 2.0;

#[derive(Clone)]
pub struct OcrService {
    engine: Arc<OcrEngine>,
}

impl OcrService {
    pub fn new(engine: Arc<OcrEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<OcrEngine> {
        &self.engine
    }

    /// Recognize one rendered page (1-indexed). Failures yield "".
    pub async fn recognize_page(
        &self,
        parser: Arc<PdfParser>,
        page: usize,
        progress: Option<&ProgressCallback>,
    ) -> String {
        let rendered =
            tokio::task::spawn_blocking(move || parser.render_page_png(page, OCR_RENDER_SCALE))
                .await;

        match rendered {
            Ok(Ok(png)) => self.engine.recognize(&png, progress).await,
            Ok(Err(e)) => {
                warn!("Failed to render page {} for OCR: {}", page, e);
                String::new()
            }
            Err(e) => {
                warn!("OCR render task for page {} failed: {}", page, e);
                String::new()
            }
        }
    }
}
