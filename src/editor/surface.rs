//! Editing surface abstraction

use serde::{Deserialize, Serialize};

use super::config::SurfaceConfig;

/// Caret/selection as character offsets into the surface content
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionBookmark {
    pub anchor: usize,
    pub focus: usize,
}

impl SelectionBookmark {
    pub fn caret(offset: usize) -> Self {
        Self {
            anchor: offset,
            focus: offset,
        }
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }

    fn clamped(self, len: usize) -> Self {
        Self {
            anchor: self.anchor.min(len),
            focus: self.focus.min(len),
        }
    }
}

/// Holds the HTML of the page being edited plus the user's selection
pub trait EditingSurface: Send + Sync {
    fn config(&self) -> &SurfaceConfig;

    /// Replace the content. The selection is left as is.
    fn set_content(&mut self, html: &str);

    fn content(&self) -> &str;

    /// Capture the current selection
    fn bookmark(&self) -> SelectionBookmark;

    /// Reapply a captured selection, clamped to the current content
    fn restore(&mut self, bookmark: SelectionBookmark);
}

/// In-process surface backed by a string buffer
#[derive(Debug, Clone, Default)]
pub struct BufferSurface {
    config: SurfaceConfig,
    html: String,
    selection: SelectionBookmark,
}

impl BufferSurface {
    pub fn new(config: SurfaceConfig) -> Self {
        Self {
            config,
            html: String::new(),
            selection: SelectionBookmark::default(),
        }
    }
}

impl EditingSurface for BufferSurface {
    fn config(&self) -> &SurfaceConfig {
        &self.config
    }

    fn set_content(&mut self, html: &str) {
        self.html.clear();
        self.html.push_str(html);
    }

    fn content(&self) -> &str {
        &self.html
    }

    fn bookmark(&self) -> SelectionBookmark {
        self.selection
    }

    fn restore(&mut self, bookmark: SelectionBookmark) {
        self.selection = bookmark.clamped(self.html.chars().count());
    }
}
