//! PDF parsing using MuPDF
//!
//! Provides page geometry, positioned text runs, plain text and page
//! rendering. MuPDF's fz_context is not thread-safe, so every operation opens
//! a fresh document from the retained bytes and callers run it on the
//! blocking pool.

use std::path::{Path, PathBuf};

use mupdf::{Colorspace, Document, Matrix, Pixmap, TextPageOptions};

use super::types::{ImageFormat, PageDimensions, PdfError, TextRun};

/// Horizontal gap, in multiples of the glyph size, that ends a text run
const RUN_BREAK_GAP: f32 = 0.5;

/// Read access to page geometry and text, independent of the parsing backend
pub trait PageSource: Send + Sync {
    /// Number of pages in the document
    fn page_count(&self) -> usize;

    /// Intrinsic size of a page in points (1-indexed)
    fn page_size(&self, page: usize) -> Result<PageDimensions, PdfError>;

    /// Positioned text runs for a page (1-indexed)
    fn text_runs(&self, page: usize) -> Result<Vec<TextRun>, PdfError>;
}

/// MuPDF-backed parser
pub struct PdfParser {
    data: PdfData,
    page_count: usize,
}

/// Holds the source PDF so a document can be reopened per operation
enum PdfData {
    Bytes(Vec<u8>),
    Path(PathBuf),
}

impl PdfParser {
    /// Create parser from bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self, PdfError> {
        let owned = data.to_vec();
        let doc = Document::from_bytes(&owned, "application/pdf")
            .map_err(|e| PdfError::Load(e.to_string()))?;
        let page_count = Self::validate(&doc)?;

        Ok(Self {
            data: PdfData::Bytes(owned),
            page_count,
        })
    }

    /// Create parser from file path
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, PdfError> {
        let path_buf = path.as_ref().to_path_buf();
        let doc = Document::open(&*path_buf.to_string_lossy())
            .map_err(|e| PdfError::Load(e.to_string()))?;
        let page_count = Self::validate(&doc)?;

        Ok(Self {
            data: PdfData::Path(path_buf),
            page_count,
        })
    }

    fn validate(doc: &Document) -> Result<usize, PdfError> {
        if doc.needs_password()? {
            return Err(PdfError::PasswordProtected);
        }
        Ok(doc.page_count()?.max(0) as usize)
    }

    fn open_document(&self) -> Result<Document, PdfError> {
        match &self.data {
            PdfData::Bytes(data) => {
                Document::from_bytes(data, "application/pdf").map_err(Into::into)
            }
            PdfData::Path(path) => Document::open(&*path.to_string_lossy()).map_err(Into::into),
        }
    }

    fn validate_page_num(&self, page: usize) -> Result<(), PdfError> {
        if page == 0 || page > self.page_count {
            return Err(PdfError::PageNotFound(page, self.page_count));
        }
        Ok(())
    }

    /// Plain text of a page, in reading order
    pub fn page_text(&self, page: usize) -> Result<String, PdfError> {
        self.validate_page_num(page)?;

        let doc = self.open_document()?;
        let page = doc.load_page((page - 1) as i32)?;
        Ok(page.to_text()?)
    }

    /// Render a page to PNG at the given scale (1.0 = 72 DPI)
    pub fn render_page_png(&self, page: usize, scale: f32) -> Result<Vec<u8>, PdfError> {
        self.validate_page_num(page)?;

        let doc = self.open_document()?;
        let page = doc.load_page((page - 1) as i32)?;

        let scale = scale.clamp(0.1, 4.0);
        let matrix = Matrix::new_scale(scale, scale);
        let pixmap = page.to_pixmap(&matrix, &Colorspace::device_rgb(), false, true)?;

        encode_pixmap(&pixmap, ImageFormat::Png)
    }
}

impl PageSource for PdfParser {
    fn page_count(&self) -> usize {
        self.page_count
    }

    fn page_size(&self, page: usize) -> Result<PageDimensions, PdfError> {
        self.validate_page_num(page)?;

        let doc = self.open_document()?;
        let bounds = doc.load_page((page - 1) as i32)?.bounds()?;
        Ok(PageDimensions {
            width: bounds.x1 - bounds.x0,
            height: bounds.y1 - bounds.y0,
        })
    }

    fn text_runs(&self, page: usize) -> Result<Vec<TextRun>, PdfError> {
        self.validate_page_num(page)?;

        let doc = self.open_document()?;
        let page = doc.load_page((page - 1) as i32)?;
        let bounds = page.bounds()?;
        let page_height = bounds.y1 - bounds.y0;

        let text_page = page.to_text_page(TextPageOptions::PRESERVE_WHITESPACE)?;
        let mut runs = Vec::new();

        for block in text_page.blocks() {
            for line in block.lines() {
                let mut builder: Option<RunBuilder> = None;

                for ch in line.chars() {
                    let Some(c) = ch.char() else { continue };
                    let quad = ch.quad();
                    let x0 = quad.ul.x.min(quad.ll.x) - bounds.x0;
                    let x1 = quad.ur.x.max(quad.lr.x) - bounds.x0;
                    // MuPDF device space grows downward; runs are stored bottom-up
                    let baseline = page_height - (quad.ll.y.max(quad.lr.y) - bounds.y0);
                    let size = ch.size();

                    match builder.as_mut() {
                        Some(run) if x0 - run.x1 <= size * RUN_BREAK_GAP => run.push(c, x1),
                        _ => {
                            if let Some(done) = builder.take() {
                                runs.extend(done.finish());
                            }
                            builder = Some(RunBuilder::start(c, x0, x1, baseline, size));
                        }
                    }
                }

                if let Some(done) = builder {
                    runs.extend(done.finish());
                }
            }
        }

        Ok(runs)
    }
}

struct RunBuilder {
    text: String,
    x0: f32,
    x1: f32,
    baseline: f32,
    size: f32,
}

impl RunBuilder {
    fn start(c: char, x0: f32, x1: f32, baseline: f32, size: f32) -> Self {
        Self {
            text: c.to_string(),
            x0,
            x1,
            baseline,
            size,
        }
    }

    fn push(&mut self, c: char, x1: f32) {
        self.text.push(c);
        self.x1 = self.x1.max(x1);
    }

    fn finish(self) -> Option<TextRun> {
        if self.text.trim().is_empty() {
            return None;
        }
        Some(TextRun::new(
            self.text,
            [self.size, 0.0, 0.0, self.size, self.x0, self.baseline],
            self.x1 - self.x0,
        ))
    }
}

/// Copy a pixmap's samples into an RGBA buffer regardless of component count
pub(crate) fn pixmap_to_rgba(pixmap: &Pixmap) -> Result<image::RgbaImage, PdfError> {
    let width = pixmap.width() as u32;
    let height = pixmap.height() as u32;
    let samples = pixmap.samples();
    let n = pixmap.n() as usize;

    let mut rgba = Vec::with_capacity((width * height * 4) as usize);
    for i in 0..(width as usize * height as usize) {
        let offset = i * n;
        let (r, g, b) = if n >= 3 {
            (
                samples.get(offset).copied().unwrap_or(0),
                samples.get(offset + 1).copied().unwrap_or(0),
                samples.get(offset + 2).copied().unwrap_or(0),
            )
        } else {
            let v = samples.get(offset).copied().unwrap_or(0);
            (v, v, v)
        };
        let a = if n == 4 || n == 2 {
            samples.get(offset + n - 1).copied().unwrap_or(255)
        } else {
            255
        };
        rgba.extend_from_slice(&[r, g, b, a]);
    }

    image::RgbaImage::from_raw(width, height, rgba)
        .ok_or_else(|| PdfError::Image("Failed to create image buffer".to_string()))
}

fn encode_pixmap(pixmap: &Pixmap, format: ImageFormat) -> Result<Vec<u8>, PdfError> {
    use std::io::Cursor;

    let img = image::DynamicImage::ImageRgba8(pixmap_to_rgba(pixmap)?);
    let mut output = Vec::new();
    match format {
        ImageFormat::Png => img.write_to(&mut Cursor::new(&mut output), image::ImageFormat::Png),
        ImageFormat::Jpeg => image::DynamicImage::ImageRgb8(img.to_rgb8())
            .write_to(&mut Cursor::new(&mut output), image::ImageFormat::Jpeg),
    }
    .map_err(|e| PdfError::Image(e.to_string()))?;

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{text_pdf, PdfFixture};

    #[test]
    fn test_rejects_garbage() {
        let result = PdfParser::from_bytes(b"definitely not a pdf");
        assert!(matches!(result, Err(PdfError::Load(_))));
    }

    #[test]
    fn test_page_count_and_size() {
        let bytes = PdfFixture::new().page(&["Hello"]).page(&["World"]).build();
        let parser = PdfParser::from_bytes(&bytes).unwrap();

        assert_eq!(parser.page_count(), 2);
        let size = parser.page_size(1).unwrap();
        assert!((size.width - 612.0).abs() < 0.5);
        assert!((size.height - 792.0).abs() < 0.5);
        assert!(matches!(parser.page_size(3), Err(PdfError::PageNotFound(3, 2))));
    }

    #[test]
    fn test_text_runs_are_bottom_up() {
        let bytes = text_pdf(&["Top line", "Second line"]);
        let parser = PdfParser::from_bytes(&bytes).unwrap();
        let runs = parser.text_runs(1).unwrap();

        let joined: String = runs.iter().map(|r| r.text.as_str()).collect::<Vec<_>>().join(" ");
        assert!(joined.contains("Top"));
        assert!(joined.contains("Second"));

        let top = runs.iter().find(|r| r.text.contains("Top")).unwrap();
        let second = runs.iter().find(|r| r.text.contains("Second")).unwrap();
        // Higher on the page means a larger baseline in user space
        assert!(top.transform.unwrap()[5] > second.transform.unwrap()[5]);
        assert!(top.width > 0.0);
    }

    #[test]
    fn test_render_page_png() {
        let bytes = text_pdf(&["Render me"]);
        let parser = PdfParser::from_bytes(&bytes).unwrap();
        let png = parser.render_page_png(1, 0.5).unwrap();
        assert_eq!(&png[1..4], b"PNG");
    }
}
