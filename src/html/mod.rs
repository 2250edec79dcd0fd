//! HTML processing module
//!
//! Provides page HTML generation and manipulation:
//! - Layout reconstruction from text runs and image placements
//! - Page block parsing for repagination
//! - Sanitization, enrichment merging and paragraph spacing
//!
//! Uses lol_html for efficient streaming HTML processing.

pub mod blocks;
pub mod reconstruct;
pub mod rewrite;

pub use blocks::{ensure_page_block, parse_pages, Block, BlockInfo, PageBlock, PageLayout};
pub use reconstruct::{
    error_page, flow_page_open_tag, group_lines, image_element_id, page_open_tag, reconstruct_page,
    Line, PlacedRun,
};
pub use rewrite::{
    merge_enrichment, parse_px, sanitize_html, set_paragraph_spacing, set_style_properties,
    style_property, ParagraphSpacing,
};

/// Errors during HTML rewriting
#[derive(Debug, thiserror::Error)]
pub enum RewriteError {
    #[error("HTML rewrite failed: {0}")]
    Rewrite(String),
    #[error("Unexpected page structure: {0}")]
    Structure(String),
}
