//! Rich text editing surface
//!
//! The surface holds one page's HTML at a time. Around it sit the pieces
//! that give it editor behavior:
//! - [`SurfaceConfig`]: declarative options
//! - [`Repaginator`]: splits overflowing page blocks
//! - [`ContentObserver`]: debounces edit events before repagination
//! - [`normalize_inserted_image`]: prepares user-inserted images

pub mod config;
pub mod images;
pub mod observer;
pub mod paginate;
pub mod surface;

pub use config::SurfaceConfig;
pub use images::{normalize_inserted_image, placeholder_data_url};
pub use observer::{ContentEvent, ContentObserver};
pub use paginate::{BlockMeasurer, EstimatingMeasurer, Repaginator};
pub use surface::{BufferSurface, EditingSurface, SelectionBookmark};
