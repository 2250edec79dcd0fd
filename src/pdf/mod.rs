//! PDF processing module
//!
//! Two backends cooperate here:
//! - MuPDF (`parser`) for page geometry, positioned text and rendering
//! - lopdf (`objects`, `images`) for XObject images and content-stream
//!   operators

mod decode;
pub mod images;
pub mod objects;
mod parser;
pub mod retry;
mod types;

pub(crate) use parser::pixmap_to_rgba;
pub use images::{
    encode_image, EncodedImage, ExtractionReport, ImageCache, ImageError, ImageExtractor,
};
pub use objects::ObjectStore;
pub use parser::{PageSource, PdfParser};
pub use retry::{poll_with_retry, Probe, RetryError, RetryPolicy};
pub use types::{ImageFormat, ImagePlacement, PageDimensions, PageViewport, PdfError, TextRun};
