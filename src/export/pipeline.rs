//! Session export
//!
//! Pages go through one scratch document, strictly in order: repair images,
//! rasterize at 2x, encode as JPEG and append as a full page. A failure on
//! any page aborts the export. Images extracted at load time are restored by
//! element id when their source was lost in editing.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::raster::PageRasterizer;
use super::repair::{repair_images, ExtractedImages};
use super::writer::{encode_jpeg, PdfWriter};
use super::{ExportError, ExportPage};

pub const RASTER_SCALE: f32 = 2.0;
pub const EXPORT_JPEG_QUALITY: u8 = 92;

pub struct ExportRasterizer {
    rasterizer: Arc<dyn PageRasterizer>,
    public_dir: Option<PathBuf>,
    /// Offscreen document; one export at a time
    scratch: Mutex<String>,
}

impl ExportRasterizer {
    pub fn new(rasterizer: Arc<dyn PageRasterizer>, public_dir: Option<PathBuf>) -> Self {
        Self {
            rasterizer,
            public_dir,
            scratch: Mutex::new(String::new()),
        }
    }

    pub async fn export(
        &self,
        pages: Vec<ExportPage>,
        extracted: &ExtractedImages,
    ) -> Result<Vec<u8>, ExportError> {
        if pages.is_empty() {
            return Err(ExportError::Empty);
        }

        let mut scratch = self.scratch.lock().await;
        let result = self.export_pages(&mut scratch, pages, extracted).await;
        scratch.clear();

        match &result {
            Ok(bytes) => info!(bytes = bytes.len(), "Export finished"),
            Err(e) => warn!("Export aborted: {}", e),
        }
        result
    }

    async fn export_pages(
        &self,
        scratch: &mut String,
        pages: Vec<ExportPage>,
        extracted: &ExtractedImages,
    ) -> Result<Vec<u8>, ExportError> {
        let mut writer = PdfWriter::new();

        for page in pages {
            let number = page.page_number;
            let (width, height) = (page.width.max(1.0), page.height.max(1.0));

            let repaired = repair_images(&page.html, self.public_dir.as_deref(), extracted)
                .map_err(|e| ExportError::Render {
                    page: number,
                    reason: e.to_string(),
                })?;
            debug!(
                page = number,
                kept = repaired.kept,
                inlined = repaired.inlined,
                restored = repaired.restored,
                replaced = repaired.replaced,
                "Images repaired"
            );

            *scratch = scratch_document(&repaired.html);
            let html = scratch.clone();
            let rasterizer = self.rasterizer.clone();
            let (jpeg, pixels) = tokio::task::spawn_blocking(move || {
                let bitmap = rasterizer
                    .rasterize(&html, width, height, RASTER_SCALE)?
                    .into_iter()
                    .next()
                    .ok_or_else(|| ExportError::Raster("layout produced no pages".to_string()))?;
                let pixels = bitmap.dimensions();
                Ok::<_, ExportError>((encode_jpeg(&bitmap, EXPORT_JPEG_QUALITY)?, pixels))
            })
            .await?
            .map_err(|e| ExportError::Render {
                page: number,
                reason: e.to_string(),
            })?;

            writer.add_full_page(width, height, jpeg, pixels);
        }

        let count = writer.page_count();
        let bytes = tokio::task::spawn_blocking(move || writer.finish()).await??;
        debug!(pages = count, "Export document assembled");
        Ok(bytes)
    }
}

/// The page alone on an unpadded canvas
fn scratch_document(page_html: &str) -> String {
    format!(
        "<!DOCTYPE html><html><head><meta charset=\"UTF-8\"><style>\
         html, body {{ margin: 0; padding: 0; background: white; }} \
         .pdf-page {{ margin: 0 !important; border: none !important; }}\
         </style></head><body>{}</body></html>",
        page_html
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use parking_lot::Mutex as SyncMutex;

    /// Records what it was asked to draw
    #[derive(Default)]
    struct FakeRasterizer {
        calls: SyncMutex<Vec<(String, f32, f32, f32)>>,
        fail_on: Option<&'static str>,
    }

    impl PageRasterizer for FakeRasterizer {
        fn rasterize(
            &self,
            html: &str,
            width: f32,
            height: f32,
            scale: f32,
        ) -> Result<Vec<RgbImage>, ExportError> {
            self.calls.lock().push((html.to_string(), width, height, scale));
            if let Some(marker) = self.fail_on {
                if html.contains(marker) {
                    return Err(ExportError::Raster("boom".to_string()));
                }
            }
            Ok(vec![RgbImage::from_pixel(
                (width * scale) as u32,
                (height * scale) as u32,
                image::Rgb([255, 255, 255]),
            )])
        }
    }

    fn none() -> ExtractedImages {
        ExtractedImages::default()
    }

    fn page(number: usize, html: &str) -> ExportPage {
        ExportPage {
            page_number: number,
            html: html.to_string(),
            width: 100.0,
            height: 140.0,
        }
    }

    #[tokio::test]
    async fn test_exports_pages_in_order() {
        let fake = Arc::new(FakeRasterizer::default());
        let exporter = ExportRasterizer::new(fake.clone(), None);

        let bytes = exporter
            .export(vec![page(1, "<p>first</p>"), page(2, "<p>second</p>")], &none())
            .await
            .unwrap();

        let doc = lopdf::Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 2);

        let calls = fake.calls.lock();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].0.contains("first"));
        assert!(calls[1].0.contains("second"));
        assert_eq!((calls[0].1, calls[0].2, calls[0].3), (100.0, 140.0, RASTER_SCALE));
        assert!(exporter.scratch.try_lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_broken_image_does_not_abort() {
        let fake = Arc::new(FakeRasterizer::default());
        let exporter = ExportRasterizer::new(fake.clone(), None);

        let bytes = exporter
            .export(
                vec![page(
                    1,
                    r#"<img src="https://invalid.example/x.png" width="40" height="30">"#,
                )],
                &none(),
            )
            .await
            .unwrap();

        assert_eq!(lopdf::Document::load_mem(&bytes).unwrap().get_pages().len(), 1);
        let calls = fake.calls.lock();
        assert!(calls[0].0.contains("data-placeholder=\"true\""));
        assert!(!calls[0].0.contains("invalid.example"));
    }

    #[tokio::test]
    async fn test_extracted_image_is_restored_before_raster() {
        let mut png = Vec::new();
        RgbImage::from_pixel(2, 2, image::Rgb([1, 2, 3]))
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        let original = format!(
            "data:image/png;base64,{}",
            base64::Engine::encode(&base64::engine::general_purpose::STANDARD, &png)
        );
        let placement = crate::pdf::ImagePlacement {
            data_url: original.clone(),
            width: 2.0,
            height: 2.0,
            x: 0.0,
            y: 0.0,
        };
        let extracted = ExtractedImages::from_pages([std::slice::from_ref(&placement)]);

        let fake = Arc::new(FakeRasterizer::default());
        let exporter = ExportRasterizer::new(fake.clone(), None);
        exporter
            .export(vec![page(1, r#"<img id="pdf-img-1-0" src="">"#)], &extracted)
            .await
            .unwrap();

        let calls = fake.calls.lock();
        assert!(calls[0].0.contains(&original));
        assert!(!calls[0].0.contains("data-placeholder"));
    }

    #[tokio::test]
    async fn test_page_failure_aborts_export() {
        let fake = Arc::new(FakeRasterizer {
            fail_on: Some("bad"),
            ..FakeRasterizer::default()
        });
        let exporter = ExportRasterizer::new(fake.clone(), None);

        let result = exporter
            .export(
                vec![page(1, "<p>ok</p>"), page(2, "<p>bad</p>"), page(3, "<p>never</p>")],
                &none(),
            )
            .await;

        assert!(matches!(result, Err(ExportError::Render { page: 2, .. })));
        assert_eq!(fake.calls.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_export_is_rejected() {
        let exporter = ExportRasterizer::new(Arc::new(FakeRasterizer::default()), None);
        assert!(matches!(exporter.export(Vec::new(), &none()).await, Err(ExportError::Empty)));
    }
}
