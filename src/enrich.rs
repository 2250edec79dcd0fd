//! Server enrichment
//!
//! A second, independent pass over an uploaded PDF: plain text per page plus
//! OCR of the rendered page. The result is advisory and is merged into the
//! reconstructed pages as hidden markup.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::ocr::{OcrService, ProgressCallback};
use crate::pdf::{PageDimensions, PageSource, PdfError, PdfParser};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageEnrichment {
    pub page_number: usize,
    /// Points
    pub width: f32,
    pub height: f32,
    pub text_content: String,
    pub ocr_content: String,
    pub enhanced_text: String,
}

/// Enrich every page concurrently. Page failures degrade to empty text.
pub async fn enrich_document(
    parser: Arc<PdfParser>,
    ocr: &OcrService,
    progress: Option<ProgressCallback>,
) -> Vec<PageEnrichment> {
    let count = parser.page_count();
    let done = AtomicUsize::new(0);

    let pages = (1..=count).map(|page| {
        let parser = parser.clone();
        let done = &done;
        let progress = progress.as_ref();
        async move {
            let enrichment = enrich_page(parser, ocr, page).await;
            let finished = done.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(progress) = progress {
                progress((finished * 100 / count) as u8);
            }
            enrichment
        }
    });

    let pages = join_all(pages).await;
    debug!("Enriched {} pages", pages.len());
    pages
}

pub async fn enrich_page(parser: Arc<PdfParser>, ocr: &OcrService, page: usize) -> PageEnrichment {
    let text_parser = parser.clone();
    let gathered = tokio::task::spawn_blocking(move || {
        let size = text_parser.page_size(page)?;
        let text = text_parser.page_text(page)?;
        Ok::<_, PdfError>((size, text))
    })
    .await;

    let (size, text) = match gathered {
        Ok(Ok(gathered)) => gathered,
        Ok(Err(e)) => {
            warn!("Page {}: text extraction failed: {}", page, e);
            (PageDimensions { width: 0.0, height: 0.0 }, String::new())
        }
        Err(e) => {
            warn!("Page {}: text extraction task failed: {}", page, e);
            (PageDimensions { width: 0.0, height: 0.0 }, String::new())
        }
    };

    let text_content = collapse_whitespace(&text);
    let ocr_content = ocr.recognize_page(parser, page, None).await.trim().to_string();
    let enhanced_text = enhanced_html(&text_content, &ocr_content);

    PageEnrichment {
        page_number: page,
        width: size.width,
        height: size.height,
        text_content,
        ocr_content,
        enhanced_text,
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Markup merged into pages; the OCR block is left out when OCR found nothing
pub fn enhanced_html(text: &str, ocr: &str) -> String {
    let mut html = format!(
        "<div class=\"extracted-text\"><div class=\"pdf-text\">{}</div>",
        html_escape::encode_text(text)
    );
    if !ocr.is_empty() {
        html.push_str(&format!(
            "<div class=\"ocr-text\">{}</div>",
            html_escape::encode_text(ocr)
        ));
    }
    html.push_str("</div>");
    html
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::provider::{MockProvider, OcrProviderTrait};
    use crate::ocr::{OcrEngine, OcrOptions};
    use crate::test_support::pages_pdf;

    fn ocr(provider: MockProvider) -> OcrService {
        let provider: Arc<dyn OcrProviderTrait> = Arc::new(provider);
        OcrService::new(Arc::new(OcrEngine::new(vec![provider], OcrOptions::default())))
    }

    #[tokio::test]
    async fn test_enriches_every_page_in_order() {
        let parser = Arc::new(PdfParser::from_bytes(&pages_pdf(2)).unwrap());
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let progress: ProgressCallback = Arc::new(move |p| sink.lock().push(p));

        let service = ocr(MockProvider::new(" ocr words\n"));
        let pages = enrich_document(parser, &service, Some(progress)).await;

        assert_eq!(pages.len(), 2);
        for (i, page) in pages.iter().enumerate() {
            assert_eq!(page.page_number, i + 1);
            assert_eq!((page.width, page.height), (612.0, 792.0));
            assert!(page.text_content.contains("body"));
            assert_eq!(page.ocr_content, "ocr words");
            assert!(page.enhanced_text.contains("<div class=\"ocr-text\">ocr words</div>"));
        }
        assert_eq!(seen.lock().last(), Some(&100));
    }

    #[tokio::test]
    async fn test_missing_ocr_leaves_text_only() {
        let parser = Arc::new(PdfParser::from_bytes(&pages_pdf(1)).unwrap());
        let mut offline = MockProvider::new("unused");
        offline.available = false;

        let pages = enrich_document(parser, &ocr(offline), None).await;

        assert_eq!(pages[0].ocr_content, "");
        assert!(!pages[0].enhanced_text.contains("ocr-text"));
        assert!(pages[0].enhanced_text.contains("pdf-text"));
    }

    #[test]
    fn test_enhanced_html_escapes_content() {
        assert_eq!(
            enhanced_html("a < b & c", "x>y"),
            "<div class=\"extracted-text\"><div class=\"pdf-text\">a &lt; b &amp; c</div>\
             <div class=\"ocr-text\">x&gt;y</div></div>"
        );
        assert_eq!(collapse_whitespace("  one\n\ttwo   three "), "one two three");
    }
}
