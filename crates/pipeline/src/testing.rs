//! Fakes for the fetch and completion collaborators.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pagewise_client::{CompletionClient, CompletionError, FetchError, FetchedPage, PageFetcher};
use pagewise_core::{AuditRow, AuditSink, ContentCache, Error, FixedIdentity, RetryPolicy};

use crate::engine::EngineContext;

pub fn context(
    dir: &Path, fetcher: Arc<impl PageFetcher + 'static>, completion: Arc<impl CompletionClient + 'static>,
) -> EngineContext {
    EngineContext {
        cache_dir: dir.join("cache"),
        fetcher,
        completion,
        writer: ContentCache::new(RetryPolicy { max_attempts: 2, base_delay: Duration::from_millis(5) }),
        identity: Arc::new(FixedIdentity::new(4242, 1)),
    }
}

/// Returns the same page (or error) for every URL.
pub struct StaticFetcher {
    result: Result<FetchedPage, String>,
}

impl StaticFetcher {
    pub fn ok(title: &str, text: &str) -> Arc<Self> {
        Arc::new(Self { result: Ok(FetchedPage::new(title, text)) })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self { result: Err(message.to_string()) })
    }
}

#[async_trait]
impl PageFetcher for StaticFetcher {
    async fn fetch_page(&self, _url: &str) -> Result<FetchedPage, FetchError> {
        self.result.clone().map_err(FetchError::Render)
    }
}

/// URL-driven fetcher that records calls and peak concurrency.
///
/// URLs containing `unreachable` fail, URLs containing `panic` panic. URLs
/// containing `late-panic` panic only after sleeping a little longer than the
/// configured delay, so sibling pages are already in flight.
#[derive(Default)]
pub struct RecordingFetcher {
    delay: Duration,
    calls: Mutex<Vec<String>>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl RecordingFetcher {
    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self { delay, ..Default::default() })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageFetcher for RecordingFetcher {
    async fn fetch_page(&self, url: &str) -> Result<FetchedPage, FetchError> {
        self.calls.lock().unwrap().push(url.to_string());
        if url.contains("late-panic") {
            tokio::time::sleep(self.delay + Duration::from_millis(200)).await;
            panic!("fetcher exploded late on {url}");
        }
        if url.contains("panic") {
            panic!("fetcher exploded on {url}");
        }

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.active.fetch_sub(1, Ordering::SeqCst);

        if url.contains("unreachable") {
            return Err(FetchError::Render("connection reset".into()));
        }
        Ok(FetchedPage::new(format!("Page {url}"), "Installed capacity 120 MW"))
    }
}

/// Echoes the prompt back, failing when it contains a marker.
pub struct ScriptedCompletion {
    fail_marker: Option<String>,
    delay: Duration,
    calls: AtomicUsize,
}

impl ScriptedCompletion {
    pub fn echo() -> Arc<Self> {
        Arc::new(Self { fail_marker: None, delay: Duration::ZERO, calls: AtomicUsize::new(0) })
    }

    pub fn failing_on(marker: &str) -> Arc<Self> {
        Arc::new(Self { fail_marker: Some(marker.to_string()), delay: Duration::ZERO, calls: AtomicUsize::new(0) })
    }

    /// Echo after sleeping `delay`.
    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self { fail_marker: None, delay, calls: AtomicUsize::new(0) })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionClient for ScriptedCompletion {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.fail_marker {
            Some(marker) if prompt.contains(marker.as_str()) => Err(CompletionError::HttpError { status: 500 }),
            _ => Ok(prompt.to_string()),
        }
    }
}

/// Keeps audit rows in memory.
#[derive(Default)]
pub struct MemoryAudit {
    rows: Mutex<Vec<AuditRow>>,
}

impl MemoryAudit {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn rows(&self) -> Vec<AuditRow> {
        self.rows.lock().unwrap().clone()
    }
}

impl AuditSink for MemoryAudit {
    fn record(&self, row: &AuditRow) -> Result<(), Error> {
        self.rows.lock().unwrap().push(row.clone());
        Ok(())
    }
}
