//! Print export for `POST /api/export`
//!
//! The submitted HTML is wrapped in a print stylesheet and laid out on A4
//! pages with fixed margins. A failed attempt is retried once at a smaller
//! scale with a longer timeout.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use super::raster::PageRasterizer;
use super::repair::{repair_images, ExtractedImages};
use super::writer::{encode_jpeg, PdfWriter};
use super::{ExportError, EXPORT_JPEG_QUALITY, RASTER_SCALE};
use crate::config::ExportConfig;

/// A4 in points
pub const A4_WIDTH: f32 = 595.28;
pub const A4_HEIGHT: f32 = 841.89;
pub const PRINT_MARGIN: f32 = 20.0;

const RETRY_SCALE: f32 = 0.8;

const PRINT_CSS: &str = "\
body { font-family: Arial, sans-serif; margin: 0; padding: 0; background: white; }
img { max-width: 100%; height: auto; display: block; object-fit: contain; }
.pdf-page { page-break-after: always; position: relative; width: 100%; box-sizing: border-box; }
.pdf-page:last-child { page-break-after: auto; }
img[data-placeholder] { background-color: #f0f0f0; }
img:not([src]), img[src=\"\"] { min-height: 50px; background-color: #f0f0f0; color: #666; font-size: 14px; }
";

/// Full print document around submitted content
pub fn print_document(content: &str) -> String {
    format!(
        "<!DOCTYPE html><html><head><meta charset=\"UTF-8\"><style>{}</style></head><body>{}</body></html>",
        PRINT_CSS, content
    )
}

pub struct PrintExporter {
    rasterizer: Arc<dyn PageRasterizer>,
    timeout: Duration,
    retry_timeout: Duration,
}

impl PrintExporter {
    pub fn new(
        rasterizer: Arc<dyn PageRasterizer>,
        timeout: Duration,
        retry_timeout: Duration,
    ) -> Self {
        Self {
            rasterizer,
            timeout,
            retry_timeout,
        }
    }

    pub fn from_config(rasterizer: Arc<dyn PageRasterizer>, config: &ExportConfig) -> Self {
        Self::new(
            rasterizer,
            Duration::from_secs(config.timeout_secs),
            Duration::from_secs(config.retry_timeout_secs),
        )
    }

    pub async fn export(&self, html: &str) -> Result<Vec<u8>, ExportError> {
        if html.trim().is_empty() {
            return Err(ExportError::Empty);
        }

        // Images the layout engine cannot load are swapped for placeholders up front
        let repaired = repair_images(html, None, &ExtractedImages::default())?;
        let document = print_document(&repaired.html);

        match self.attempt(&document, 1.0, self.timeout).await {
            Ok(bytes) => Ok(bytes),
            Err(first) => {
                warn!("PDF generation failed, retrying at reduced scale: {}", first);
                self.attempt(&document, RETRY_SCALE, self.retry_timeout).await
            }
        }
    }

    async fn attempt(
        &self,
        document: &str,
        scale: f32,
        timeout: Duration,
    ) -> Result<Vec<u8>, ExportError> {
        let rasterizer = self.rasterizer.clone();
        let document = document.to_string();
        let task = tokio::task::spawn_blocking(move || {
            render_print(rasterizer.as_ref(), &document, scale)
        });

        let bytes = tokio::time::timeout(timeout, task)
            .await
            .map_err(|_| ExportError::Timeout(timeout.as_secs()))???;
        info!(scale, bytes = bytes.len(), "Print export finished");
        Ok(bytes)
    }
}

/// Lay the document out on the A4 content box and emit one PDF page per
/// laid-out page
fn render_print(
    rasterizer: &dyn PageRasterizer,
    document: &str,
    scale: f32,
) -> Result<Vec<u8>, ExportError> {
    let content_width = A4_WIDTH - 2.0 * PRINT_MARGIN;
    let content_height = A4_HEIGHT - 2.0 * PRINT_MARGIN;

    // A smaller scale lays out a larger box that is then shrunk onto the page
    let bitmaps = rasterizer.rasterize(
        document,
        content_width / scale,
        content_height / scale,
        RASTER_SCALE * scale,
    )?;
    if bitmaps.is_empty() {
        return Err(ExportError::Raster("layout produced no pages".to_string()));
    }

    let mut writer = PdfWriter::new();
    for bitmap in bitmaps {
        let pixels = bitmap.dimensions();
        let jpeg = encode_jpeg(&bitmap, EXPORT_JPEG_QUALITY)?;
        writer.add_jpeg_page(
            A4_WIDTH,
            A4_HEIGHT,
            jpeg,
            pixels,
            [PRINT_MARGIN, PRINT_MARGIN, content_width, content_height],
        );
    }
    writer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use parking_lot::Mutex;

    /// Fails until `failures` attempts have been made, paginating every
    /// 100 characters of input
    struct ScriptedRasterizer {
        failures: usize,
        scales: Mutex<Vec<f32>>,
    }

    impl ScriptedRasterizer {
        fn new(failures: usize) -> Self {
            Self {
                failures,
                scales: Mutex::new(Vec::new()),
            }
        }
    }

    impl PageRasterizer for ScriptedRasterizer {
        fn rasterize(
            &self,
            html: &str,
            width: f32,
            height: f32,
            scale: f32,
        ) -> Result<Vec<RgbImage>, ExportError> {
            let mut scales = self.scales.lock();
            scales.push(scale);
            if scales.len() <= self.failures {
                return Err(ExportError::Raster("layout failed".to_string()));
            }
            let pages = html.len() / 1000 + 1;
            Ok((0..pages)
                .map(|_| RgbImage::new((width * scale) as u32, (height * scale) as u32))
                .collect())
        }
    }

    fn exporter(rasterizer: Arc<ScriptedRasterizer>) -> PrintExporter {
        PrintExporter::new(rasterizer, Duration::from_secs(60), Duration::from_secs(120))
    }

    #[tokio::test]
    async fn test_print_export_uses_a4_pages() {
        let fake = Arc::new(ScriptedRasterizer::new(0));
        let bytes = exporter(fake.clone())
            .export("<div class=\"pdf-page\"><p>Hi</p></div>")
            .await
            .unwrap();

        let doc = lopdf::Document::load_mem(&bytes).unwrap();
        let pages = doc.get_pages();
        assert_eq!(pages.len(), 1);
        let page = doc.get_dictionary(*pages.values().next().unwrap()).unwrap();
        let media_box = page.get(b"MediaBox").unwrap().as_array().unwrap();
        assert!((media_box[2].as_float().unwrap() - A4_WIDTH).abs() < 0.01);
        assert_eq!(*fake.scales.lock(), vec![RASTER_SCALE]);
    }

    #[tokio::test]
    async fn test_failure_retries_once_at_reduced_scale() {
        let fake = Arc::new(ScriptedRasterizer::new(1));
        let result = exporter(fake.clone()).export("<p>retry me</p>").await;

        assert!(result.is_ok());
        let scales = fake.scales.lock().clone();
        assert_eq!(scales.len(), 2);
        assert!((scales[1] - RASTER_SCALE * RETRY_SCALE).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_second_failure_is_final() {
        let fake = Arc::new(ScriptedRasterizer::new(5));
        let result = exporter(fake.clone()).export("<p>never</p>").await;

        assert!(matches!(result, Err(ExportError::Raster(_))));
        assert_eq!(fake.scales.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_content_is_rejected() {
        let fake = Arc::new(ScriptedRasterizer::new(0));
        assert!(matches!(exporter(fake).export("   ").await, Err(ExportError::Empty)));
    }

    #[test]
    fn test_print_document_carries_print_css() {
        let doc = print_document("<p>x</p>");
        assert!(doc.starts_with("<!DOCTYPE html>"));
        assert!(doc.contains("page-break-after: always"));
        assert!(doc.contains("font-family: Arial, sans-serif"));
        assert!(doc.ends_with("<p>x</p></body></html>"));
    }
}
