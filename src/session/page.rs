//! Reconstructed page and load status

use serde::{Deserialize, Serialize};

use crate::pdf::{ImagePlacement, PageViewport};

/// One reconstructed page of the active document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    /// HTML as reconstructed from the source page
    pub content: String,
    /// HTML as last committed from the editor
    pub edited_content: Option<String>,
    pub width: f32,
    pub height: f32,
    pub scale: f32,
    pub images: Vec<ImagePlacement>,
}

impl Page {
    pub fn new(content: String, viewport: PageViewport, images: Vec<ImagePlacement>) -> Self {
        Self {
            content,
            edited_content: None,
            width: viewport.width,
            height: viewport.height,
            scale: viewport.scale,
            images,
        }
    }

    /// HTML shown in the editor and used for export
    pub fn display_html(&self) -> &str {
        self.edited_content.as_deref().unwrap_or(&self.content)
    }

    pub fn is_edited(&self) -> bool {
        self.edited_content.is_some()
    }

    pub fn viewport(&self) -> PageViewport {
        PageViewport {
            width: self.width,
            height: self.height,
            scale: self.scale,
        }
    }
}

/// Progress of the document load, polled by the client
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadStatus {
    pub is_loading: bool,
    /// 0-100
    pub progress: u8,
    /// 0-100
    pub ocr_progress: u8,
    pub error: Option<String>,
}

/// Per-page summary included in session snapshots
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSummary {
    pub page_number: usize,
    pub width: f32,
    pub height: f32,
    pub scale: f32,
    pub edited: bool,
    pub image_count: usize,
}
