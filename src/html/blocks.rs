//! Page block structure
//!
//! Splits editor HTML into `.pdf-page` blocks and their direct children
//! without a DOM. lol_html drops uniquely tagged comment markers around
//! every page and before every child; the marked string is then cut at the
//! markers, so the original bytes of each child are preserved exactly.

use std::collections::HashMap;

use lol_html::html_content::ContentType;
use lol_html::{element, rewrite_str, RewriteStrSettings};

use super::RewriteError;

/// Attributes of a direct page child that matter for height estimation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockInfo {
    pub tag: String,
    pub style: Option<String>,
    pub height_attr: Option<f32>,
}

/// One direct child of a page block, with any text up to the next sibling
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub html: String,
    pub info: BlockInfo,
}

impl Block {
    /// Visible character count, tags stripped and entities decoded
    pub fn text_len(&self) -> usize {
        let mut text = String::new();
        let mut in_tag = false;
        for c in self.html.chars() {
            match c {
                '<' => in_tag = true,
                '>' => in_tag = false,
                _ if !in_tag => text.push(c),
                _ => {}
            }
        }
        html_escape::decode_html_entities(&text).trim().chars().count()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageBlock {
    /// The `<div class="pdf-page" ...>` start tag as written
    pub open_tag: String,
    /// Content before the first child element
    pub leading: String,
    pub blocks: Vec<Block>,
    pub close_tag: String,
    /// Content between this page and the next one
    pub trailing: String,
}

impl PageBlock {
    pub fn new(open_tag: impl Into<String>, blocks: Vec<Block>) -> Self {
        Self {
            open_tag: open_tag.into(),
            leading: String::new(),
            blocks,
            close_tag: "</div>".to_string(),
            trailing: String::new(),
        }
    }

    pub fn to_html(&self) -> String {
        let mut html = String::with_capacity(self.open_tag.len() + self.leading.len());
        html.push_str(&self.open_tag);
        html.push_str(&self.leading);
        for block in &self.blocks {
            html.push_str(&block.html);
        }
        html.push_str(&self.close_tag);
        html
    }

    /// Style attribute of the page's start tag
    pub fn style(&self) -> Option<&str> {
        let start = self.open_tag.find("style=\"")? + "style=\"".len();
        let end = self.open_tag[start..].find('"')? + start;
        Some(&self.open_tag[start..end])
    }
}

/// Editor content as a sequence of page blocks
#[derive(Debug, Clone, PartialEq)]
pub struct PageLayout {
    /// Content before the first page block
    pub before: String,
    pub pages: Vec<PageBlock>,
}

impl PageLayout {
    pub fn to_html(&self) -> String {
        let mut html = self.before.clone();
        for page in &self.pages {
            html.push_str(&page.to_html());
            html.push_str(&page.trailing);
        }
        html
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Marker {
    Page(usize),
    Inner(usize),
    Block(usize),
    End(usize),
    Close(usize),
}

/// Parse editor HTML into page blocks
pub fn parse_pages(html: &str) -> Result<PageLayout, RewriteError> {
    let nonce = uuid::Uuid::new_v4().simple().to_string();
    let prefix = format!("<!--redraft-{}:", nonce);

    let mut infos: HashMap<usize, BlockInfo> = HashMap::new();
    let mut page_count = 0usize;
    let mut block_count = 0usize;

    let marked = {
        let mark = |kind: &str, n: usize| format!("{}{}:{}-->", prefix, kind, n);
        let marked = rewrite_str(
            html,
            RewriteStrSettings {
                element_content_handlers: vec![
                    element!("div.pdf-page", |el| {
                        let n = page_count;
                        page_count += 1;
                        el.before(&mark("page", n), ContentType::Html);
                        el.prepend(&mark("inner", n), ContentType::Html);
                        el.append(&mark("end", n), ContentType::Html);
                        el.after(&mark("close", n), ContentType::Html);
                        Ok(())
                    }),
                    element!("div.pdf-page > *", |el| {
                        let n = block_count;
                        block_count += 1;
                        infos.insert(
                            n,
                            BlockInfo {
                                tag: el.tag_name().to_lowercase(),
                                style: el.get_attribute("style"),
                                height_attr: el
                                    .get_attribute("height")
                                    .and_then(|h| h.trim().parse().ok()),
                            },
                        );
                        el.before(&mark("block", n), ContentType::Html);
                        Ok(())
                    }),
                ],
                ..RewriteStrSettings::default()
            },
        )
        .map_err(|e| RewriteError::Rewrite(e.to_string()))?;
        marked
    };

    let events = split_markers(&marked, &prefix)?;
    assemble(events, &mut infos)
}

/// Cut the marked string into `(marker, text following it)` pairs
fn split_markers(
    marked: &str,
    prefix: &str,
) -> Result<(String, Vec<(Marker, String)>), RewriteError> {
    let mut pieces = marked.split(prefix);
    let head = pieces.next().unwrap_or_default().to_string();
    let mut events = Vec::new();

    for piece in pieces {
        let end = piece
            .find("-->")
            .ok_or_else(|| RewriteError::Structure("unterminated marker".to_string()))?;
        let (kind, n) = piece[..end]
            .split_once(':')
            .ok_or_else(|| RewriteError::Structure("malformed marker".to_string()))?;
        let n: usize = n
            .parse()
            .map_err(|_| RewriteError::Structure("malformed marker index".to_string()))?;
        let marker = match kind {
            "page" => Marker::Page(n),
            "inner" => Marker::Inner(n),
            "block" => Marker::Block(n),
            "end" => Marker::End(n),
            "close" => Marker::Close(n),
            other => return Err(RewriteError::Structure(format!("unknown marker {}", other))),
        };
        events.push((marker, piece[end + 3..].to_string()));
    }

    Ok((head, events))
}

fn assemble(
    (before, events): (String, Vec<(Marker, String)>),
    infos: &mut HashMap<usize, BlockInfo>,
) -> Result<PageLayout, RewriteError> {
    let nested = || RewriteError::Structure("nested or unbalanced page blocks".to_string());
    let mut layout = PageLayout {
        before,
        pages: Vec::new(),
    };
    let mut open: Option<(usize, PageBlock)> = None;

    for (marker, text) in events {
        match marker {
            Marker::Page(n) => {
                if open.is_some() {
                    return Err(nested());
                }
                open = Some((n, PageBlock::new(text, Vec::new())));
            }
            Marker::Inner(n) => match open.as_mut() {
                Some((current, page)) if *current == n => page.leading = text,
                _ => return Err(nested()),
            },
            Marker::Block(n) => match open.as_mut() {
                Some((_, page)) => page.blocks.push(Block {
                    html: text,
                    info: infos.remove(&n).unwrap_or_default(),
                }),
                None => return Err(nested()),
            },
            Marker::End(n) => match open.as_mut() {
                Some((current, page)) if *current == n => page.close_tag = text,
                _ => return Err(nested()),
            },
            Marker::Close(n) => match open.take() {
                Some((current, mut page)) if current == n => {
                    page.trailing = text;
                    layout.pages.push(page);
                }
                _ => return Err(nested()),
            },
        }
    }

    if open.is_some() {
        return Err(nested());
    }
    Ok(layout)
}

/// Wrap content in a bare page block when it has none
pub fn ensure_page_block(html: &str) -> Result<String, RewriteError> {
    if parse_pages(html)?.pages.is_empty() {
        return Ok(format!("<div class=\"pdf-page\">{}</div>", html));
    }
    Ok(html.to_string())
}
