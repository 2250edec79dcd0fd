//! Asynchronous object-graph access
//!
//! The lopdf object graph is parsed on the blocking pool while the rest of
//! the page pipeline proceeds. Consumers poll it through a bounded retry.

use std::sync::Arc;

use lopdf::{Document, ObjectId};
use tokio::sync::watch;

use super::retry::{poll_with_retry, Probe, RetryError, RetryPolicy};

#[derive(Clone)]
enum LoadState {
    Pending,
    Ready(Arc<Document>),
    Failed(String),
}

/// Handle to a PDF object graph that may still be loading
#[derive(Clone)]
pub struct ObjectStore {
    state: watch::Receiver<LoadState>,
}

impl ObjectStore {
    /// Start parsing `bytes` in the background
    pub fn spawn(bytes: Arc<Vec<u8>>) -> Self {
        let (tx, rx) = watch::channel(LoadState::Pending);
        tokio::task::spawn_blocking(move || {
            let state = match Document::load_mem(&bytes) {
                Ok(doc) => {
                    tracing::debug!("Object graph ready ({} objects)", doc.objects.len());
                    LoadState::Ready(Arc::new(doc))
                }
                Err(e) => {
                    tracing::warn!("Object graph failed to load: {}", e);
                    LoadState::Failed(e.to_string())
                }
            };
            let _ = tx.send(state);
        });
        Self { state: rx }
    }

    /// Store over an already parsed document
    pub fn ready(doc: Document) -> Self {
        let (_tx, rx) = watch::channel(LoadState::Ready(Arc::new(doc)));
        Self { state: rx }
    }

    /// Store that never finishes loading
    pub fn pending() -> Self {
        let (_tx, rx) = watch::channel(LoadState::Pending);
        Self { state: rx }
    }

    /// Current load state without waiting
    pub fn probe(&self) -> Probe<Arc<Document>> {
        match &*self.state.borrow() {
            LoadState::Pending => Probe::Pending,
            LoadState::Ready(doc) => Probe::Ready(doc.clone()),
            LoadState::Failed(reason) => Probe::Failed(reason.clone()),
        }
    }

    /// Wait for the document within the retry budget
    pub async fn document(&self, policy: RetryPolicy) -> Result<Arc<Document>, RetryError> {
        poll_with_retry(policy, || self.probe()).await
    }

    /// Wait until object `id` can be read
    pub async fn resolve(
        &self,
        id: ObjectId,
        policy: RetryPolicy,
    ) -> Result<Arc<Document>, RetryError> {
        poll_with_retry(policy, || match self.probe() {
            Probe::Ready(doc) if doc.get_object(id).is_ok() => Probe::Ready(doc),
            Probe::Ready(_) => Probe::Failed(format!("object {} {} R is missing", id.0, id.1)),
            Probe::Pending => Probe::Pending,
            Probe::Failed(reason) => Probe::Failed(reason),
        })
        .await
    }
}

/// Object id of a 1-indexed page
pub fn page_object(doc: &Document, page: usize) -> Option<ObjectId> {
    doc.get_pages().get(&(page as u32)).copied()
}
