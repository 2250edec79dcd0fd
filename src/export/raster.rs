//! HTML rasterization

use image::RgbImage;
use mupdf::{Colorspace, Document, Matrix};
use tracing::debug;

use super::ExportError;
use crate::pdf::pixmap_to_rgba;

/// Turns an HTML document into page bitmaps.
///
/// `width` and `height` are the layout box in CSS pixels; bitmaps come back
/// at `scale` times that size, one per laid-out page.
pub trait PageRasterizer: Send + Sync {
    fn rasterize(
        &self,
        html: &str,
        width: f32,
        height: f32,
        scale: f32,
    ) -> Result<Vec<RgbImage>, ExportError>;
}

/// MuPDF's HTML engine (the same one it uses for EPUB)
#[derive(Debug, Clone)]
pub struct MupdfRasterizer {
    /// Base font size in points
    pub em: f32,
}

impl Default for MupdfRasterizer {
    fn default() -> Self {
        Self { em: 12.0 }
    }
}

impl PageRasterizer for MupdfRasterizer {
    fn rasterize(
        &self,
        html: &str,
        width: f32,
        height: f32,
        scale: f32,
    ) -> Result<Vec<RgbImage>, ExportError> {
        let mut doc = Document::from_bytes(html.as_bytes(), "text/html")
            .map_err(|e| ExportError::Raster(e.to_string()))?;
        doc.layout(width, height, self.em)
            .map_err(|e| ExportError::Raster(e.to_string()))?;

        let count = doc.page_count().map_err(|e| ExportError::Raster(e.to_string()))?;
        debug!(pages = count, width, height, scale, "HTML laid out");

        let matrix = Matrix::new_scale(scale, scale);
        let mut bitmaps = Vec::with_capacity(count.max(0) as usize);
        for index in 0..count {
            let page = doc.load_page(index).map_err(|e| ExportError::Raster(e.to_string()))?;
            let pixmap = page
                .to_pixmap(&matrix, &Colorspace::device_rgb(), false, true)
                .map_err(|e| ExportError::Raster(e.to_string()))?;
            let rgba = pixmap_to_rgba(&pixmap)?;
            bitmaps.push(image::DynamicImage::ImageRgba8(rgba).to_rgb8());
        }

        Ok(bitmaps)
    }
}
