//! Overflow repagination
//!
//! When the last page block is taller than the page budget, its trailing
//! blocks move into a new page block appended after it. Heights come from a
//! [`BlockMeasurer`]; the default one estimates them from inline styles and
//! text length, since there is no layout engine in the loop.

use tracing::debug;

use crate::html::{
    flow_page_open_tag, parse_pages, parse_px, style_property, Block, PageBlock, PageLayout,
    RewriteError,
};

use super::config::SurfaceConfig;

/// Upper bound on splits performed by one pass
const MAX_SPLITS: usize = 256;

/// Measures the rendered height of a block, margins included
pub trait BlockMeasurer: Send + Sync {
    fn block_height(&self, block: &Block, content_width: f32) -> f32;
}

/// Average glyph advance as a fraction of the font size
const AVG_CHAR_WIDTH: f32 = 0.5;
const DEFAULT_LINE_HEIGHT: f32 = 1.2;
const DEFAULT_FONT_SIZE: f32 = 16.0;
const DEFAULT_IMAGE_HEIGHT: f32 = 150.0;

/// Height estimates from inline styles, tag defaults and text length
#[derive(Debug, Clone, Copy, Default)]
pub struct EstimatingMeasurer;

impl EstimatingMeasurer {
    fn font_size(tag: &str, style: &str) -> f32 {
        if let Some(size) = style_property(style, "font-size").and_then(parse_px) {
            return size;
        }
        match tag {
            "h1" => 32.0,
            "h2" => 24.0,
            "h3" => 18.72,
            "h5" => 13.28,
            "h6" => 10.72,
            _ => DEFAULT_FONT_SIZE,
        }
    }

    fn line_height(style: &str, font_size: f32) -> f32 {
        let Some(value) = style_property(style, "line-height") else {
            return font_size * DEFAULT_LINE_HEIGHT;
        };
        if let Some(px) = value.strip_suffix("px").and_then(|v| v.trim().parse::<f32>().ok()) {
            return px;
        }
        match value.parse::<f32>() {
            Ok(factor) => factor * font_size,
            Err(_) => font_size * DEFAULT_LINE_HEIGHT,
        }
    }

    /// Default vertical margins in em
    fn default_margins(tag: &str) -> f32 {
        match tag {
            "p" | "h3" | "h4" | "ul" | "ol" | "blockquote" | "figure" => 1.0,
            "h1" => 0.67,
            "h2" => 0.83,
            "h5" => 1.67,
            "h6" => 2.33,
            _ => 0.0,
        }
    }

    /// Top plus bottom margin
    fn vertical_margins(tag: &str, style: &str, font_size: f32) -> f32 {
        let default = Self::default_margins(tag) * font_size;
        let (mut top, mut bottom) = (default, default);

        if let Some(shorthand) = style_property(style, "margin") {
            let parts: Vec<f32> = shorthand
                .split_whitespace()
                .map(|part| css_length(part, font_size))
                .collect();
            match parts.as_slice() {
                [all] => (top, bottom) = (*all, *all),
                [vertical, _] => (top, bottom) = (*vertical, *vertical),
                [t, _, b] | [t, _, b, _] => (top, bottom) = (*t, *b),
                _ => {}
            }
        }
        if let Some(value) = style_property(style, "margin-top") {
            top = css_length(value, font_size);
        }
        if let Some(value) = style_property(style, "margin-bottom") {
            bottom = css_length(value, font_size);
        }

        top + bottom
    }
}

/// px, em or unitless; anything else counts as zero
fn css_length(value: &str, font_size: f32) -> f32 {
    let value = value.trim();
    if let Some(em) = value.strip_suffix("em") {
        return em.trim().parse::<f32>().map(|v| v * font_size).unwrap_or(0.0);
    }
    parse_px(value).unwrap_or(0.0)
}

impl BlockMeasurer for EstimatingMeasurer {
    fn block_height(&self, block: &Block, content_width: f32) -> f32 {
        let tag = block.info.tag.as_str();
        let style = block.info.style.as_deref().unwrap_or("");

        let out_of_flow = style_property(style, "position")
            .is_some_and(|p| p.eq_ignore_ascii_case("absolute") || p.eq_ignore_ascii_case("fixed"));
        let hidden =
            style_property(style, "display").is_some_and(|d| d.eq_ignore_ascii_case("none"));
        if out_of_flow || hidden {
            return 0.0;
        }

        let font_size = Self::font_size(tag, style);
        let margins = Self::vertical_margins(tag, style, font_size);

        let body = if let Some(height) = style_property(style, "height").and_then(parse_px) {
            height
        } else if tag == "img" {
            block.info.height_attr.unwrap_or(DEFAULT_IMAGE_HEIGHT)
        } else {
            let line_height = Self::line_height(style, font_size);
            let per_line = (content_width / (font_size * AVG_CHAR_WIDTH)).max(1.0);
            let lines = (block.text_len() as f32 / per_line).ceil().max(1.0);
            lines * line_height
        };

        body + margins
    }
}

pub struct Repaginator<M = EstimatingMeasurer> {
    config: SurfaceConfig,
    measurer: M,
}

impl Repaginator<EstimatingMeasurer> {
    pub fn new(config: SurfaceConfig) -> Self {
        Self::with_measurer(config, EstimatingMeasurer)
    }
}

impl<M: BlockMeasurer> Repaginator<M> {
    pub fn with_measurer(config: SurfaceConfig, measurer: M) -> Self {
        Self { config, measurer }
    }

    pub fn config(&self) -> &SurfaceConfig {
        &self.config
    }

    fn content_width(&self, page: &PageBlock) -> f32 {
        let width = page
            .style()
            .and_then(|s| style_property(s, "width"))
            .and_then(parse_px)
            .unwrap_or(self.config.page_width);
        (width - 2.0 * self.config.padding).max(1.0)
    }

    /// Rendered height of a page block.
    ///
    /// A fixed `height` wins; otherwise padding plus block heights, raised to
    /// any `min-height`.
    pub fn page_height(&self, page: &PageBlock) -> f32 {
        let style = page.style().unwrap_or("");
        if let Some(fixed) = style_property(style, "height").and_then(parse_px) {
            return fixed;
        }

        let width = self.content_width(page);
        let content: f32 = page
            .blocks
            .iter()
            .map(|block| self.measurer.block_height(block, width))
            .sum();
        let natural = content + 2.0 * self.config.padding;

        match style_property(style, "min-height").and_then(parse_px) {
            Some(min) => natural.max(min),
            None => natural,
        }
    }

    /// Index of the first block that does not fit, never 0
    fn split_index(&self, page: &PageBlock) -> Option<usize> {
        if page.blocks.len() < 2 {
            return None;
        }
        let width = self.content_width(page);
        let available = self.config.content_height();

        let mut used = 0.0;
        for (index, block) in page.blocks.iter().enumerate() {
            used += self.measurer.block_height(block, width);
            if used > available {
                return Some(index.max(1));
            }
        }
        None
    }

    fn new_page_tag(&self, page: &PageBlock) -> String {
        let width = page
            .style()
            .and_then(|s| style_property(s, "width"))
            .and_then(parse_px)
            .unwrap_or(self.config.page_width);
        flow_page_open_tag(width, self.config.page_height_budget)
    }

    /// Split the last page block until it fits the budget.
    ///
    /// Returns the layout only when at least one split happened.
    pub fn split_layout(&self, mut layout: PageLayout) -> Option<PageLayout> {
        let mut splits = 0;

        while splits < MAX_SPLITS {
            let Some(last) = layout.pages.last_mut() else {
                break;
            };
            if self.page_height(last) <= self.config.page_height_budget {
                break;
            }
            let Some(index) = self.split_index(last) else {
                break;
            };

            let moved = last.blocks.split_off(index);
            let mut page = PageBlock::new(self.new_page_tag(last), moved);
            page.trailing = std::mem::take(&mut last.trailing);
            debug!(
                kept = last.blocks.len(),
                moved = page.blocks.len(),
                "Page overflow, moving blocks to a new page"
            );
            layout.pages.push(page);
            splits += 1;
        }

        (splits > 0).then_some(layout)
    }

    /// Parse and split editor HTML
    pub fn repaginate(&self, html: &str) -> Result<Option<PageLayout>, RewriteError> {
        Ok(self.split_layout(parse_pages(html)?))
    }
}
