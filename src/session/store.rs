//! Active session store
//!
//! Holds at most one session. A new upload replaces it; enrichment computed
//! for a replaced upload is discarded.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::editor::SurfaceConfig;
use crate::enrich::{enrich_document, PageEnrichment};
use crate::ocr::{OcrService, ProgressCallback};
use crate::pdf::{ImageExtractor, ObjectStore, PageSource, PdfError, PdfParser};

use super::loader::DocumentLoader;
use super::page::{LoadStatus, Page};
use super::state::{Session, SessionSnapshot};
use super::SessionError;

#[derive(Default)]
struct StoreInner {
    active: Option<Session>,
    /// Upload currently being reconstructed
    loading: Option<Uuid>,
    /// Enrichment that finished before its session was installed
    pending_enrichment: Option<(Uuid, Vec<PageEnrichment>)>,
}

pub struct SessionStore {
    inner: Mutex<StoreInner>,
    status: RwLock<LoadStatus>,
    surface: SurfaceConfig,
}

impl SessionStore {
    pub fn new(surface: SurfaceConfig) -> Self {
        Self {
            inner: Mutex::new(StoreInner::default()),
            status: RwLock::new(LoadStatus::default()),
            surface,
        }
    }

    pub fn surface_config(&self) -> &SurfaceConfig {
        &self.surface
    }

    pub fn status(&self) -> LoadStatus {
        self.status.read().clone()
    }

    pub fn set_progress(&self, progress: u8) {
        self.status.write().progress = progress.min(100);
    }

    pub fn set_ocr_progress(&self, progress: u8) {
        self.status.write().ocr_progress = progress.min(100);
    }

    /// Drop the active session and start tracking a new upload
    pub async fn begin_load(&self) -> Uuid {
        let id = Uuid::new_v4();
        let mut inner = self.inner.lock().await;
        *inner = StoreInner {
            active: None,
            loading: Some(id),
            pending_enrichment: None,
        };
        *self.status.write() = LoadStatus {
            is_loading: true,
            ..LoadStatus::default()
        };
        id
    }

    /// Make reconstructed pages the active session
    pub async fn install(
        &self,
        id: Uuid,
        file_name: Option<String>,
        pages: Vec<Page>,
    ) -> Result<SessionSnapshot, SessionError> {
        let mut inner = self.inner.lock().await;
        if inner.loading != Some(id) {
            return Err(SessionError::Superseded);
        }

        let mut session = Session::new(id, file_name, pages, self.surface.clone())?;
        if let Some((pending_id, enrichment)) = inner.pending_enrichment.take() {
            if pending_id == id {
                session.apply_enrichment(&enrichment);
            }
        }

        let snapshot = session.snapshot();
        inner.active = Some(session);
        inner.loading = None;
        {
            let mut status = self.status.write();
            status.is_loading = false;
            status.progress = 100;
            status.error = None;
        }
        info!(session = %id, pages = snapshot.total_pages, "Session ready");
        Ok(snapshot)
    }

    /// Record an unrecoverable load error and reset to empty
    pub async fn fail(&self, id: Uuid, err: &SessionError) {
        error!(session = %id, "Document load failed: {}", err);
        let mut inner = self.inner.lock().await;
        if inner.loading != Some(id) {
            return;
        }
        *inner = StoreInner::default();
        *self.status.write() = LoadStatus {
            error: Some(err.to_string()),
            ..LoadStatus::default()
        };
    }

    /// Merge enrichment if `id` is still the active or loading upload
    pub async fn apply_enrichment(&self, id: Uuid, enrichment: Vec<PageEnrichment>) -> bool {
        let mut inner = self.inner.lock().await;

        if let Some(session) = inner.active.as_mut().filter(|s| s.id() == id) {
            let merged = session.apply_enrichment(&enrichment);
            debug!(session = %id, merged, "Enrichment merged");
            return true;
        }
        if inner.loading == Some(id) {
            inner.pending_enrichment = Some((id, enrichment));
            return true;
        }

        debug!(session = %id, "Discarding enrichment for a replaced session");
        false
    }

    pub async fn with_session<R>(
        &self,
        f: impl FnOnce(&mut Session) -> Result<R, SessionError>,
    ) -> Result<R, SessionError> {
        let mut inner = self.inner.lock().await;
        let session = inner.active.as_mut().ok_or(SessionError::NoSession)?;
        f(session)
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        self.with_session(|s| Ok(s.snapshot())).await
    }

    /// Repaginate the current page of the active session, if any
    pub async fn repaginate_active(&self) -> Result<usize, SessionError> {
        self.with_session(|s| s.repaginate()).await
    }

    /// Load a PDF as the new active session.
    ///
    /// Enrichment starts alongside reconstruction and is merged whenever it
    /// finishes, provided the session has not been replaced by then.
    pub async fn load_document(
        self: &Arc<Self>,
        bytes: Vec<u8>,
        file_name: Option<String>,
        loader: &DocumentLoader,
        ocr: OcrService,
    ) -> Result<SessionSnapshot, SessionError> {
        let id = self.begin_load().await;

        match self.load_pages(id, bytes, loader, ocr).await {
            Ok(pages) => self.install(id, file_name, pages).await,
            Err(e) => {
                self.fail(id, &e).await;
                Err(e)
            }
        }
    }

    async fn load_pages(
        self: &Arc<Self>,
        id: Uuid,
        bytes: Vec<u8>,
        loader: &DocumentLoader,
        ocr: OcrService,
    ) -> Result<Vec<Page>, SessionError> {
        let bytes = Arc::new(bytes);
        let parse_bytes = bytes.clone();
        let parser = tokio::task::spawn_blocking(move || PdfParser::from_bytes(&parse_bytes))
            .await
            .map_err(PdfError::from)??;
        let parser = Arc::new(parser);

        self.spawn_enrichment(id, parser.clone(), ocr);

        let extractor = ImageExtractor::new(ObjectStore::spawn(bytes), loader.policy());
        let store = self.clone();
        let progress = move |p: u8| store.set_progress(p);
        let source: Arc<dyn PageSource> = parser;
        loader.load(source, &extractor, &progress).await
    }

    fn spawn_enrichment(self: &Arc<Self>, id: Uuid, parser: Arc<PdfParser>, ocr: OcrService) {
        let store = self.clone();
        tokio::spawn(async move {
            let progress_store = store.clone();
            let progress: ProgressCallback = Arc::new(move |p| progress_store.set_ocr_progress(p));
            let enrichment = enrich_document(parser, &ocr, Some(progress)).await;
            store.apply_enrichment(id, enrichment).await;
        });
    }
}
