//! Editing session state
//!
//! Owns the ordered pages of the active document, the current page and the
//! editing surface bound to it. Every operation that leaves a page commits
//! the surface into that page first.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::editor::{BufferSurface, EditingSurface, Repaginator, SelectionBookmark, SurfaceConfig};
use crate::enrich::PageEnrichment;
use crate::export::{ExportPage, ExtractedImages};
use crate::html::{
    ensure_page_block, merge_enrichment, sanitize_html, set_paragraph_spacing, ParagraphSpacing,
};

use super::page::{Page, PageSummary};
use super::SessionError;

/// Navigation requests accepted by [`Session::navigate`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Next,
    Previous,
    To(usize),
}

impl Navigation {
    /// Arrow keys move between pages
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "ArrowRight" | "ArrowDown" => Some(Self::Next),
            "ArrowLeft" | "ArrowUp" => Some(Self::Previous),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub file_name: Option<String>,
    pub current_page: usize,
    pub total_pages: usize,
    pub spacing: ParagraphSpacing,
    pub enriched: bool,
    pub selection: SelectionBookmark,
    pub pages: Vec<PageSummary>,
}

pub struct Session {
    id: Uuid,
    file_name: Option<String>,
    pages: Vec<Page>,
    /// 1-based
    current_page: usize,
    /// Page number to edited HTML, mirrors `Page::edited_content`
    edited_contents: BTreeMap<usize, String>,
    surface: Box<dyn EditingSurface>,
    repaginator: Repaginator,
    spacing: ParagraphSpacing,
    enriched: bool,
    /// Images as extracted at load, for export repair
    extracted: Arc<ExtractedImages>,
}

impl Session {
    /// `pages` arrive in source order. Page content without a `pdf-page`
    /// block is wrapped in one.
    pub fn new(
        id: Uuid,
        file_name: Option<String>,
        mut pages: Vec<Page>,
        config: SurfaceConfig,
    ) -> Result<Self, SessionError> {
        if pages.is_empty() {
            return Err(SessionError::NoPages);
        }
        for page in &mut pages {
            page.content = ensure_page_block(&page.content)?;
            if let Some(edited) = page.edited_content.take() {
                page.edited_content = Some(ensure_page_block(&edited)?);
            }
        }

        let extracted =
            ExtractedImages::from_pages(pages.iter().map(|page| page.images.as_slice()));
        let mut surface = BufferSurface::new(config.clone());
        surface.set_content(pages[0].display_html());

        let mut session = Self {
            id,
            file_name,
            pages,
            current_page: 1,
            edited_contents: BTreeMap::new(),
            spacing: config.spacing,
            repaginator: Repaginator::new(config),
            surface: Box::new(surface),
            enriched: false,
            extracted: Arc::new(extracted),
        };
        session.reindex();
        Ok(session)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn total_pages(&self) -> usize {
        self.pages.len()
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    /// Page by 1-based number
    pub fn page(&self, number: usize) -> Result<&Page, SessionError> {
        number
            .checked_sub(1)
            .and_then(|i| self.pages.get(i))
            .ok_or(SessionError::PageNotFound(number))
    }

    pub fn edited_contents(&self) -> &BTreeMap<usize, String> {
        &self.edited_contents
    }

    /// Current editor content, including uncommitted changes
    pub fn surface_content(&self) -> &str {
        self.surface.content()
    }

    pub fn extracted_images(&self) -> Arc<ExtractedImages> {
        self.extracted.clone()
    }

    pub fn spacing(&self) -> ParagraphSpacing {
        self.spacing
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            file_name: self.file_name.clone(),
            current_page: self.current_page,
            total_pages: self.total_pages(),
            spacing: self.spacing,
            enriched: self.enriched,
            selection: self.surface.bookmark(),
            pages: self
                .pages
                .iter()
                .enumerate()
                .map(|(i, page)| PageSummary {
                    page_number: i + 1,
                    width: page.width,
                    height: page.height,
                    scale: page.scale,
                    edited: page.is_edited(),
                    image_count: page.images.len(),
                })
                .collect(),
        }
    }

    fn reindex(&mut self) {
        self.edited_contents = self
            .pages
            .iter()
            .enumerate()
            .filter_map(|(i, page)| page.edited_content.clone().map(|html| (i + 1, html)))
            .collect();
    }

    fn current_index(&self) -> usize {
        self.current_page - 1
    }

    /// Write the surface content into the current page
    pub fn commit(&mut self) {
        let index = self.current_index();
        let html = self.surface.content();
        let page = &mut self.pages[index];
        if html == page.display_html() {
            return;
        }

        page.edited_content = Some(html.to_string());
        self.edited_contents.insert(self.current_page, html.to_string());
        debug!(page = self.current_page, "Committed editor content");
    }

    /// Replace the editor content with a user edit and commit it.
    ///
    /// The selection reported with the edit (or the current one) is
    /// captured before the update and restored after it. Bare content is
    /// wrapped in a page block so it can be repaginated and enriched.
    pub fn apply_edit(
        &mut self,
        html: &str,
        selection: Option<SelectionBookmark>,
    ) -> Result<(), SessionError> {
        if let Some(selection) = selection {
            self.surface.restore(selection);
        }
        let bookmark = self.surface.bookmark();

        let html = if self.surface.config().sanitize {
            sanitize_html(html)?
        } else {
            html.to_string()
        };
        let html = ensure_page_block(&html)?;
        self.surface.set_content(&html);
        self.commit();

        self.surface.restore(bookmark);
        Ok(())
    }

    /// Commit, move, then load the new page. Clamped; returns whether the
    /// current page changed.
    pub fn navigate(&mut self, navigation: Navigation) -> bool {
        let total = self.total_pages();
        let target = match navigation {
            Navigation::Next => self.current_page.saturating_add(1),
            Navigation::Previous => self.current_page.saturating_sub(1),
            Navigation::To(page) => page,
        }
        .clamp(1, total);

        if target == self.current_page {
            return false;
        }

        self.commit();
        self.current_page = target;
        let html = self.pages[self.current_index()].display_html().to_string();
        self.surface.set_content(&html);
        self.surface.restore(SelectionBookmark::default());
        debug!(page = target, "Navigated");
        true
    }

    pub fn next(&mut self) -> bool {
        self.navigate(Navigation::Next)
    }

    pub fn previous(&mut self) -> bool {
        self.navigate(Navigation::Previous)
    }

    pub fn handle_key(&mut self, key: &str) -> bool {
        Navigation::from_key(key).is_some_and(|navigation| self.navigate(navigation))
    }

    /// Split overflowing content into new pages after the current one.
    ///
    /// Returns how many pages were added.
    pub fn repaginate(&mut self) -> Result<usize, SessionError> {
        let Some(layout) = self.repaginator.repaginate(self.surface.content())? else {
            return Ok(0);
        };

        let mut blocks = layout.pages.into_iter();
        let Some(first) = blocks.next() else {
            return Ok(0);
        };
        let kept = format!("{}{}{}", layout.before, first.to_html(), first.trailing);

        let template = self.pages[self.current_index()].viewport();
        let added: Vec<Page> = blocks
            .map(|block| {
                let mut html = block.to_html();
                html.push_str(&block.trailing);
                Page::new(html, template, Vec::new())
            })
            .collect();
        let count = added.len();

        let bookmark = self.surface.bookmark();
        self.surface.set_content(&kept);
        self.commit();
        self.surface.restore(bookmark);

        let at = self.current_page;
        self.pages.splice(at..at, added);
        self.reindex();

        info!(
            page = self.current_page,
            added = count,
            total = self.total_pages(),
            "Repaginated overflowing page"
        );
        Ok(count)
    }

    /// Apply a paragraph spacing preset to the current page
    pub fn set_spacing(&mut self, spacing: ParagraphSpacing) -> Result<(), SessionError> {
        let html = set_paragraph_spacing(self.surface.content(), spacing)?;
        let bookmark = self.surface.bookmark();
        self.surface.set_content(&html);
        self.commit();
        self.surface.restore(bookmark);
        self.spacing = spacing;
        Ok(())
    }

    pub fn toggle_spacing(&mut self) -> Result<ParagraphSpacing, SessionError> {
        let spacing = self.spacing.toggled();
        self.set_spacing(spacing)?;
        Ok(spacing)
    }

    /// Merge server enrichment into pages by index.
    ///
    /// A page count mismatch is logged, not corrected. Returns how many
    /// pages were updated.
    pub fn apply_enrichment(&mut self, enrichment: &[PageEnrichment]) -> usize {
        if enrichment.len() != self.pages.len() {
            warn!(
                enriched = enrichment.len(),
                pages = self.pages.len(),
                "Enrichment page count differs from the session, merging by index"
            );
        }

        let current = self.current_index();
        let mut merged = 0;
        for (index, (page, extra)) in self.pages.iter_mut().zip(enrichment).enumerate() {
            let result = (|| {
                let content = merge_enrichment(&page.content, &extra.enhanced_text)?;
                let edited = page
                    .edited_content
                    .as_deref()
                    .map(|html| merge_enrichment(html, &extra.enhanced_text))
                    .transpose()?;
                Ok::<_, crate::html::RewriteError>((content, edited))
            })();

            match result {
                Ok((content, edited)) => {
                    page.content = content;
                    page.edited_content = edited;
                    merged += 1;
                    if index == current {
                        let bookmark = self.surface.bookmark();
                        self.surface.set_content(page.display_html());
                        self.surface.restore(bookmark);
                    }
                }
                Err(e) => warn!(page = index + 1, "Failed to merge enrichment: {}", e),
            }
        }

        self.reindex();
        self.enriched = true;
        merged
    }

    /// Commit, then collect every page for export in order
    pub fn export_pages(&mut self) -> Vec<ExportPage> {
        self.commit();
        self.pages
            .iter()
            .enumerate()
            .map(|(i, page)| ExportPage {
                page_number: i + 1,
                html: page.display_html().to_string(),
                width: page.width,
                height: page.height,
            })
            .collect()
    }
}
