//! OCR engine lifecycle
//!
//! One engine is built at startup and shared by reference. It probes its
//! providers once, serializes recognition calls, bounds each call by a
//! timeout and is shut down explicitly when the server stops.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};

use crate::config::{OcrBackend, OcrConfig};

use super::provider::{OcrProviderTrait, OllamaProvider};
use super::types::{OcrError, Recognition};

/// Receives recognition progress as a 0-100 percentage
pub type ProgressCallback = Arc<dyn Fn(u8) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct OcrOptions {
    pub language: String,
    pub timeout: Duration,
}

impl Default for OcrOptions {
    fn default() -> Self {
        Self {
            language: "eng".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

type Providers = Vec<Arc<dyn OcrProviderTrait>>;

pub struct OcrEngine {
    providers: Providers,
    options: OcrOptions,
    /// Providers that answered the availability probe, or why none did
    ready: OnceCell<Result<Providers, String>>,
    gate: Mutex<()>,
    shut_down: AtomicBool,
}

impl OcrEngine {
    /// Providers are tried in order until one succeeds
    pub fn new(providers: Providers, options: OcrOptions) -> Self {
        Self {
            providers,
            options,
            ready: OnceCell::new(),
            gate: Mutex::new(()),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn from_config(config: &OcrConfig) -> Self {
        let mut providers: Providers = Vec::new();
        match config.provider {
            #[cfg(feature = "ocr-tesseract")]
            OcrBackend::Tesseract => providers.push(Arc::new(
                super::provider::TesseractProvider::new(&config.tesseract_path, &config.language),
            )),
            #[cfg(not(feature = "ocr-tesseract"))]
            OcrBackend::Tesseract => {
                warn!("Tesseract requested but the ocr-tesseract feature is disabled")
            }
            OcrBackend::Ollama => providers.push(Arc::new(OllamaProvider::new(
                &config.ollama_url,
                &config.ollama_model,
            ))),
            OcrBackend::None => {}
        }

        Self::new(
            providers,
            OcrOptions {
                language: config.language.clone(),
                timeout: config.timeout(),
            },
        )
    }

    pub fn options(&self) -> &OcrOptions {
        &self.options
    }

    /// Probe providers once. Later calls return the first outcome.
    pub async fn initialize(&self) -> bool {
        let outcome = self
            .ready
            .get_or_init(|| async {
                let mut available: Providers = Vec::new();
                for provider in &self.providers {
                    if provider.is_available().await {
                        available.push(provider.clone());
                    } else {
                        debug!(provider = ?provider.provider_type(), "OCR provider not available");
                    }
                }

                if available.is_empty() {
                    let reason = "no OCR provider available".to_string();
                    warn!(
                        "OCR initialization failed: {}; recognition will return empty text",
                        reason
                    );
                    Err(reason)
                } else {
                    let providers: Vec<_> = available.iter().map(|p| p.provider_type()).collect();
                    info!(
                        providers = ?providers,
                        language = %self.options.language,
                        "OCR engine ready"
                    );
                    Ok(available)
                }
            })
            .await;
        outcome.is_ok()
    }

    /// Recognize text in an encoded image.
    ///
    /// Never fails: errors, timeouts and an uninitialized engine all yield "".
    pub async fn recognize(&self, image: &[u8], progress: Option<&ProgressCallback>) -> String {
        match self.try_recognize(image, progress).await {
            Ok(result) => result.text,
            Err(e) => {
                warn!("OCR degraded to empty text: {}", e);
                String::new()
            }
        }
    }

    pub async fn try_recognize(
        &self,
        image: &[u8],
        progress: Option<&ProgressCallback>,
    ) -> Result<Recognition, OcrError> {
        if self.is_shut_down() {
            return Err(OcrError::ShutDown);
        }
        self.initialize().await;
        let providers = match self.ready.get() {
            Some(Ok(providers)) => providers,
            Some(Err(reason)) => return Err(OcrError::Unavailable(reason.clone())),
            None => return Err(OcrError::Unavailable("engine not initialized".to_string())),
        };

        // Queued callers wait here; the timeout covers recognition only
        let _guard = self.gate.lock().await;
        if self.is_shut_down() {
            return Err(OcrError::ShutDown);
        }
        report(progress, 0);

        let timeout = self.options.timeout;
        let result = tokio::time::timeout(timeout, self.run(providers, image, progress))
            .await
            .map_err(|_| OcrError::Timeout(timeout.as_secs()))??;

        report(progress, 100);
        Ok(result)
    }

    async fn run(
        &self,
        providers: &Providers,
        image: &[u8],
        progress: Option<&ProgressCallback>,
    ) -> Result<Recognition, OcrError> {
        report(progress, 50);
        let mut last_error = None;

        for provider in providers {
            match provider.recognize(image, Some(&self.options.language)).await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    warn!("OCR provider {:?} failed: {}", provider.provider_type(), e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| OcrError::Unavailable("no providers".to_string())))
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Refuse new work and wait for the in-flight call to finish
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let _guard = self.gate.lock().await;
        info!("OCR engine shut down");
    }
}

fn report(progress: Option<&ProgressCallback>, percent: u8) {
    match progress {
        Some(callback) => callback(percent),
        None => debug!(progress = percent, "OCR progress"),
    }
}
