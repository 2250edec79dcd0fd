//! Application state management

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::editor::{ContentEvent, ContentObserver, SurfaceConfig};
use crate::export::{ExportRasterizer, MupdfRasterizer, PageRasterizer, PrintExporter};
use crate::ocr::{OcrEngine, OcrService};
use crate::session::{DocumentLoader, SessionStore};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    sessions: Arc<SessionStore>,
    loader: DocumentLoader,
    ocr: OcrService,
    exporter: ExportRasterizer,
    printer: PrintExporter,
    observer: ContentObserver,
    started: Instant,
}

impl AppState {
    /// Build state from configuration with MuPDF rasterization and the
    /// configured OCR provider
    pub fn new(config: Config) -> Self {
        let engine = Arc::new(OcrEngine::from_config(&config.ocr));
        let rasterizer: Arc<dyn PageRasterizer> = Arc::new(MupdfRasterizer::default());
        Self::with_parts(config, engine, rasterizer)
    }

    /// Build state around an explicit OCR engine and rasterizer.
    ///
    /// Must be called inside a tokio runtime; the content observer task is
    /// spawned here.
    pub fn with_parts(
        config: Config,
        engine: Arc<OcrEngine>,
        rasterizer: Arc<dyn PageRasterizer>,
    ) -> Self {
        let surface = SurfaceConfig::from_config(&config.editor);
        let sessions = Arc::new(SessionStore::new(surface.clone()));

        let store = sessions.clone();
        let observer = ContentObserver::spawn(surface.debounce, move || {
            let store = store.clone();
            async move {
                match store.repaginate_active().await {
                    Ok(0) => {}
                    Ok(added) => tracing::debug!("Repagination added {} page(s)", added),
                    Err(e) => tracing::debug!("Repagination skipped: {}", e),
                }
            }
        });

        Self {
            inner: Arc::new(AppStateInner {
                loader: DocumentLoader::from_config(&config.layout),
                ocr: OcrService::new(engine),
                exporter: ExportRasterizer::new(
                    rasterizer.clone(),
                    Some(config.server.public_dir.clone()),
                ),
                printer: PrintExporter::from_config(rasterizer, &config.export),
                sessions,
                observer,
                config,
                started: Instant::now(),
            }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.inner.sessions
    }

    pub fn loader(&self) -> &DocumentLoader {
        &self.inner.loader
    }

    pub fn ocr(&self) -> &OcrService {
        &self.inner.ocr
    }

    pub fn exporter(&self) -> &ExportRasterizer {
        &self.inner.exporter
    }

    pub fn printer(&self) -> &PrintExporter {
        &self.inner.printer
    }

    /// Time since the state was built
    pub fn uptime(&self) -> Duration {
        self.inner.started.elapsed()
    }

    /// Report an edit to the debounced repaginator
    pub fn content_changed(&self, event: ContentEvent) {
        self.inner.observer.notify(event);
    }

    /// Shut down the OCR engine
    ///
    /// Called once the server has stopped accepting requests.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down application state...");
        self.inner.ocr.engine().shutdown().await;
    }
}
