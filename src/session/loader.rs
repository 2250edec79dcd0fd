//! Document loading
//!
//! Turns a parsed PDF into reconstructed pages, one page at a time in source
//! order. A page that cannot be reconstructed becomes an error page so the
//! numbering stays intact; only a document with no usable page fails.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::LayoutConfig;
use crate::html::{error_page, reconstruct_page};
use crate::pdf::{ImageExtractor, PageDimensions, PageSource, PageViewport, PdfError, RetryPolicy};

use super::page::Page;
use super::SessionError;

/// Size assumed for pages whose geometry cannot be read (A4 in points)
const FALLBACK_PAGE: PageDimensions = PageDimensions {
    width: 595.28,
    height: 841.89,
};

/// Receives load progress as a 0-100 percentage
pub type LoadProgress<'a> = &'a (dyn Fn(u8) + Send + Sync);

struct PageFailure {
    viewport: PageViewport,
    reason: String,
}

#[derive(Debug, Clone, Copy)]
pub struct DocumentLoader {
    max_width: f32,
    max_height: f32,
    policy: RetryPolicy,
}

impl DocumentLoader {
    pub fn new(max_width: f32, max_height: f32, policy: RetryPolicy) -> Self {
        Self {
            max_width,
            max_height,
            policy,
        }
    }

    pub fn from_config(config: &LayoutConfig) -> Self {
        Self::new(
            config.viewport_width,
            config.viewport_height,
            RetryPolicy::new(config.image_resolve_attempts, config.resolve_delay()),
        )
    }

    /// Retry budget for image object resolution
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    fn fit(&self, size: PageDimensions) -> PageViewport {
        PageViewport::fit(size, self.max_width, self.max_height)
    }

    /// Reconstruct every page of `source`, sequentially
    pub async fn load(
        &self,
        source: Arc<dyn PageSource>,
        images: &ImageExtractor,
        progress: LoadProgress<'_>,
    ) -> Result<Vec<Page>, SessionError> {
        let count = source.page_count();
        if count == 0 {
            return Err(SessionError::NoPages);
        }

        let mut pages = Vec::with_capacity(count);
        let mut failed = 0;

        for number in 1..=count {
            match self.build_page(&source, images, number).await {
                Ok(page) => pages.push(page),
                Err(failure) => {
                    warn!("Page {} could not be reconstructed: {}", number, failure.reason);
                    failed += 1;
                    let html = error_page(failure.viewport);
                    pages.push(Page::new(html, failure.viewport, Vec::new()));
                }
            }
            progress((number * 100 / count) as u8);
        }

        if failed == count {
            return Err(SessionError::AllPagesFailed(count));
        }

        info!("Reconstructed {} pages ({} failed)", count, failed);
        Ok(pages)
    }

    async fn build_page(
        &self,
        source: &Arc<dyn PageSource>,
        images: &ImageExtractor,
        number: usize,
    ) -> Result<Page, PageFailure> {
        let src = source.clone();
        let viewport = match blocking(move || src.page_size(number)).await {
            Ok(size) => self.fit(size),
            Err(e) => {
                return Err(PageFailure {
                    viewport: self.fit(FALLBACK_PAGE),
                    reason: e.to_string(),
                })
            }
        };
        let fail = |e: PdfError| PageFailure {
            viewport,
            reason: e.to_string(),
        };

        let src = source.clone();
        let runs = blocking(move || src.text_runs(number)).await.map_err(fail)?;

        let report = images.extract(number, viewport).await;
        debug!(
            page = number,
            runs = runs.len(),
            images = report.placements.len(),
            "Page content gathered"
        );

        let placements = report.placements;
        let (html, placements) = blocking(move || {
            let html = reconstruct_page(number, viewport, &runs, &placements);
            Ok((html, placements))
        })
        .await
        .map_err(fail)?;

        Ok(Page::new(html, viewport, placements))
    }
}

/// Run parser work on the blocking pool; a panic counts as a page failure
async fn blocking<T, F>(work: F) -> Result<T, PdfError>
where
    F: FnOnce() -> Result<T, PdfError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::html::reconstruct::ERROR_MESSAGE;
    use crate::pdf::{ObjectStore, PdfParser, TextRun};
    use crate::test_support::{pages_pdf, FixtureImage, PdfFixture};
    use std::time::Duration;

    /// Source whose listed pages fail to yield text
    struct FakeSource {
        pages: usize,
        broken: Vec<usize>,
        r#unsized: Vec<usize>,
    }

    impl PageSource for FakeSource {
        fn page_count(&self) -> usize {
            self.pages
        }

        fn page_size(&self, page: usize) -> Result<PageDimensions, PdfError> {
            if self.r#unsized.contains(&page) {
                return Err(PdfError::Render("no mediabox".to_string()));
            }
            Ok(PageDimensions {
                width: 400.0,
                height: 550.0,
            })
        }

        fn text_runs(&self, page: usize) -> Result<Vec<TextRun>, PdfError> {
            if self.broken.contains(&page) {
                return Err(PdfError::MuPdf("bad content stream".to_string()));
            }
            Ok(vec![TextRun::new(
                format!("text of page {}", page),
                [12.0, 0.0, 0.0, 12.0, 50.0, 500.0],
                80.0,
            )])
        }
    }

    fn loader() -> DocumentLoader {
        DocumentLoader::new(800.0, 1100.0, RetryPolicy::new(2, Duration::from_millis(5)))
    }

    fn no_images() -> ImageExtractor {
        ImageExtractor::new(
            ObjectStore::ready(lopdf::Document::with_version("1.5")),
            RetryPolicy::new(1, Duration::from_millis(1)),
        )
    }

    fn ignore(_: u8) {}

    #[tokio::test]
    async fn test_broken_page_is_isolated() {
        let source = Arc::new(FakeSource {
            pages: 3,
            broken: vec![2],
            r#unsized: Vec::new(),
        });
        let seen = parking_lot::Mutex::new(Vec::new());
        let progress = |p: u8| seen.lock().push(p);

        let pages = loader().load(source, &no_images(), &progress).await.unwrap();

        assert_eq!(pages.len(), 3);
        assert!(pages[0].content.contains("text of page 1"));
        assert!(pages[1].content.contains(ERROR_MESSAGE));
        assert!(pages[2].content.contains("text of page 3"));
        // 400x550 fitted into 800x1100 doubles the page
        assert_eq!((pages[1].width, pages[1].height, pages[1].scale), (800.0, 1100.0, 2.0));
        assert_eq!(*seen.lock(), vec![33, 66, 100]);
    }

    #[tokio::test]
    async fn test_unsized_page_uses_fallback_viewport() {
        let source = Arc::new(FakeSource {
            pages: 2,
            broken: Vec::new(),
            r#unsized: vec![1],
        });
        let pages = loader().load(source, &no_images(), &ignore).await.unwrap();

        assert!(pages[0].content.contains(ERROR_MESSAGE));
        assert!(pages[0].width >= 1.0 && pages[0].height >= 1.0);
        assert!(pages[1].content.contains("text of page 2"));
    }

    #[tokio::test]
    async fn test_all_pages_failing_is_unrecoverable() {
        let source = Arc::new(FakeSource {
            pages: 2,
            broken: vec![1, 2],
            r#unsized: Vec::new(),
        });
        let result = loader().load(source, &no_images(), &ignore).await;
        assert!(matches!(result, Err(SessionError::AllPagesFailed(2))));
    }

    #[tokio::test]
    async fn test_empty_document_is_unrecoverable() {
        let source = Arc::new(FakeSource {
            pages: 0,
            broken: Vec::new(),
            r#unsized: Vec::new(),
        });
        let result = loader().load(source, &no_images(), &ignore).await;
        assert!(matches!(result, Err(SessionError::NoPages)));
    }

    #[tokio::test]
    async fn test_real_document_in_source_order() {
        let bytes = pages_pdf(3);
        let parser = Arc::new(PdfParser::from_bytes(&bytes).unwrap());
        let extractor = ImageExtractor::new(ObjectStore::spawn(Arc::new(bytes)), loader().policy());

        let pages = loader().load(parser, &extractor, &ignore).await.unwrap();

        assert_eq!(pages.len(), 3);
        for (i, page) in pages.iter().enumerate() {
            assert!(page.content.contains(&format!("Page {} body", i + 1)));
            assert!(page.width >= 1.0 && page.height >= 1.0);
        }
    }

    #[tokio::test]
    async fn test_images_are_placed_on_their_page() {
        let image = FixtureImage::solid(4, 4, [0, 0, 200]).drawn_at(72.0, 400.0, 100.0, 80.0);
        let bytes = PdfFixture::new()
            .page_with_images(&["Figure 1"], vec![image])
            .build();
        let parser = Arc::new(PdfParser::from_bytes(&bytes).unwrap());
        let extractor = ImageExtractor::new(ObjectStore::spawn(Arc::new(bytes)), loader().policy());

        let pages = loader().load(parser, &extractor, &ignore).await.unwrap();

        assert_eq!(pages[0].images.len(), 1);
        assert!(pages[0].content.contains("id=\"pdf-img-1-0\""));
        assert!(pages[0].content.contains("Figure 1"));
    }
}
