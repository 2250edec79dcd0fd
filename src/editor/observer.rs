//! Debounced content observer
//!
//! Edits report a [`ContentEvent`]; once no event has arrived for the
//! debounce period, the callback runs once. Bursts of keystrokes therefore
//! cost a single repagination pass.

use std::future::Future;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContentEvent {
    NodeChange,
    KeyUp,
    Change,
}

pub struct ContentObserver {
    events: Option<mpsc::UnboundedSender<ContentEvent>>,
    task: Option<JoinHandle<()>>,
}

impl ContentObserver {
    pub fn spawn<F, Fut>(debounce: Duration, mut on_settled: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<ContentEvent>();

        let task = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                trace!(?event, "Content event");
                let mut closed = false;
                loop {
                    match tokio::time::timeout(debounce, rx.recv()).await {
                        Ok(Some(event)) => trace!(?event, "Content event, debounce restarted"),
                        Ok(None) => {
                            closed = true;
                            break;
                        }
                        Err(_) => break,
                    }
                }
                on_settled().await;
                if closed {
                    break;
                }
            }
            debug!("Content observer stopped");
        });

        Self {
            events: Some(tx),
            task: Some(task),
        }
    }

    pub fn notify(&self, event: ContentEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }

    /// Stop accepting events, flush a pending callback and wait for the task
    pub async fn shutdown(mut self) {
        self.events.take();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for ContentObserver {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting(debounce: Duration) -> (ContentObserver, Arc<AtomicUsize>) {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let observer = ContentObserver::spawn(debounce, move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        (observer, fired)
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_fires_once_after_quiet_period() {
        let (observer, fired) = counting(Duration::from_millis(100));

        for event in [ContentEvent::KeyUp, ContentEvent::NodeChange, ContentEvent::Change] {
            observer.notify(event);
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_separate_bursts_fire_separately() {
        let (observer, fired) = counting(Duration::from_millis(100));

        observer.notify(ContentEvent::KeyUp);
        tokio::time::sleep(Duration::from_millis(200)).await;
        observer.notify(ContentEvent::KeyUp);
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_flushes_pending_event() {
        let (observer, fired) = counting(Duration::from_secs(10));

        observer.notify(ContentEvent::Change);
        tokio::task::yield_now().await;
        observer.shutdown().await;

        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
