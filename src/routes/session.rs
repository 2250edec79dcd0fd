//! Session Routes
//!
//! HTTP surface of the in-process editor. The browser only displays the
//! current page and reports edits; all state lives in the session store.
//!
//! Endpoints:
//! - POST /api/session - Upload a PDF and make it the active session
//! - GET /api/session - Snapshot plus the current page's HTML
//! - GET /api/session/status - Load and OCR progress
//! - GET /api/session/pages/:number - One page's display HTML
//! - PUT /api/session/content - Commit an edit
//! - POST /api/session/navigate - Commit, then move
//! - POST /api/session/spacing - Set or toggle paragraph spacing
//! - POST /api/session/images - Normalize an inserted image

use axum::{
    extract::{Multipart, Path, State},
    Json,
};
use serde::{Deserialize, Serialize};

use super::upload::read_pdf_field;
use crate::editor::{normalize_inserted_image, ContentEvent, SelectionBookmark};
use crate::error::{AppError, Result};
use crate::html::ParagraphSpacing;
use crate::session::{LoadStatus, Navigation, SessionSnapshot};
use crate::state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub session: SessionSnapshot,
    /// Editor content for the current page
    pub html: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageView {
    pub page_number: usize,
    pub html: String,
    pub width: f32,
    pub height: f32,
    pub edited: bool,
}

#[derive(Debug, Deserialize)]
pub struct ContentUpdate {
    pub html: String,
    #[serde(default)]
    pub selection: Option<SelectionBookmark>,
    #[serde(default)]
    pub event: Option<ContentEvent>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Next,
    Previous,
}

#[derive(Debug, Default, Deserialize)]
pub struct NavigateRequest {
    #[serde(default)]
    pub direction: Option<Direction>,
    /// Keyboard key name, e.g. `ArrowRight`
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub page: Option<usize>,
    /// Unsaved editor content, committed before moving
    #[serde(default)]
    pub html: Option<String>,
}

impl NavigateRequest {
    fn navigation(&self) -> Option<Navigation> {
        if let Some(page) = self.page {
            return Some(Navigation::To(page));
        }
        if let Some(direction) = self.direction {
            return Some(match direction {
                Direction::Next => Navigation::Next,
                Direction::Previous => Navigation::Previous,
            });
        }
        self.key.as_deref().and_then(Navigation::from_key)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigateResponse {
    pub moved: bool,
    #[serde(flatten)]
    pub view: SessionView,
}

#[derive(Debug, Default, Deserialize)]
pub struct SpacingRequest {
    /// Absent toggles the current spacing
    #[serde(default)]
    pub spacing: Option<ParagraphSpacing>,
}

#[derive(Serialize)]
pub struct SpacingResponse {
    pub spacing: ParagraphSpacing,
}

#[derive(Serialize)]
pub struct ImageResponse {
    pub location: String,
}

/// POST /api/session
pub async fn create_session(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<SessionView>> {
    let upload = read_pdf_field(&mut multipart).await?;
    tracing::info!(
        "Loading {} ({} bytes) into a new session",
        upload.file_name.as_deref().unwrap_or("unnamed PDF"),
        upload.bytes.len()
    );

    state
        .sessions()
        .load_document(upload.bytes, upload.file_name, state.loader(), state.ocr().clone())
        .await?;
    current_view(&state).await.map(Json)
}

/// GET /api/session
pub async fn get_session(State(state): State<AppState>) -> Result<Json<SessionView>> {
    current_view(&state).await.map(Json)
}

/// GET /api/session/status
pub async fn get_status(State(state): State<AppState>) -> Json<LoadStatus> {
    Json(state.sessions().status())
}

/// GET /api/session/pages/:number
pub async fn get_page(
    State(state): State<AppState>,
    Path(number): Path<usize>,
) -> Result<Json<PageView>> {
    let view = state
        .sessions()
        .with_session(|s| {
            let page = s.page(number)?;
            Ok(PageView {
                page_number: number,
                html: page.display_html().to_string(),
                width: page.width,
                height: page.height,
                edited: page.is_edited(),
            })
        })
        .await?;
    Ok(Json(view))
}

/// PUT /api/session/content
pub async fn update_content(
    State(state): State<AppState>,
    Json(update): Json<ContentUpdate>,
) -> Result<Json<SessionSnapshot>> {
    let snapshot = state
        .sessions()
        .with_session(|s| {
            s.apply_edit(&update.html, update.selection)?;
            Ok(s.snapshot())
        })
        .await?;

    state.content_changed(update.event.unwrap_or(ContentEvent::Change));
    Ok(Json(snapshot))
}

/// POST /api/session/navigate
pub async fn navigate(
    State(state): State<AppState>,
    Json(request): Json<NavigateRequest>,
) -> Result<Json<NavigateResponse>> {
    let navigation = request
        .navigation()
        .ok_or_else(|| AppError::BadRequest("Expected a direction, key or page".to_string()))?;

    let moved = state
        .sessions()
        .with_session(|s| {
            if let Some(html) = &request.html {
                s.apply_edit(html, None)?;
            }
            Ok(s.navigate(navigation))
        })
        .await?;

    let view = current_view(&state).await?;
    Ok(Json(NavigateResponse { moved, view }))
}

/// POST /api/session/spacing
pub async fn set_spacing(
    State(state): State<AppState>,
    Json(request): Json<SpacingRequest>,
) -> Result<Json<SpacingResponse>> {
    let spacing = state
        .sessions()
        .with_session(|s| match request.spacing {
            Some(spacing) => s.set_spacing(spacing).map(|_| spacing),
            None => s.toggle_spacing(),
        })
        .await?;
    Ok(Json(SpacingResponse { spacing }))
}

/// POST /api/session/images
pub async fn insert_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ImageResponse>> {
    let max_width = state.sessions().surface_config().max_image_width;

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("image") {
            continue;
        }
        let bytes = field.bytes().await?;
        let location =
            tokio::task::spawn_blocking(move || normalize_inserted_image(&bytes, max_width))
                .await
                .map_err(crate::pdf::PdfError::from)?;
        return Ok(Json(ImageResponse { location }));
    }

    Err(AppError::BadRequest("No image uploaded".to_string()))
}

async fn current_view(state: &AppState) -> Result<SessionView> {
    let view = state
        .sessions()
        .with_session(|s| {
            Ok(SessionView {
                session: s.snapshot(),
                html: s.surface_content().to_string(),
            })
        })
        .await?;
    Ok(view)
}
