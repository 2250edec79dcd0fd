//! Page and session state
//!
//! A session is the single active document: its reconstructed pages, the
//! page being edited and the edits made so far. Nothing is persisted.

pub mod loader;
pub mod page;
pub mod state;
pub mod store;

pub use loader::DocumentLoader;
pub use page::{LoadStatus, Page, PageSummary};
pub use state::{Navigation, Session, SessionSnapshot};
pub use store::SessionStore;

use crate::html::RewriteError;
use crate::pdf::PdfError;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("No document is loaded")]
    NoSession,
    #[error("Document has no pages")]
    NoPages,
    #[error("Page {0} not found")]
    PageNotFound(usize),
    #[error("None of the {0} pages could be processed")]
    AllPagesFailed(usize),
    #[error("Load was superseded by a newer upload")]
    Superseded,
    #[error(transparent)]
    Pdf(#[from] PdfError),
    #[error("Invalid page content: {0}")]
    Rewrite(#[from] RewriteError),
}

impl SessionError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Self::NoSession | Self::PageNotFound(_) => StatusCode::NOT_FOUND,
            Self::NoPages | Self::AllPagesFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Superseded => StatusCode::CONFLICT,
            Self::Pdf(e) => e.status_code(),
            Self::Rewrite(_) => StatusCode::BAD_REQUEST,
        }
    }
}
