//! Scrape-once engine: one page, fetched once, asked many questions.
//!
//! ### Lifecycle
//! `Unfetched -> Cached -> Destroyed`
//!
//! - [`ScrapeOnceEngine::fetch_and_cache`] retrieves the page and always writes
//!   a cache file (empty when the fetch failed).
//! - [`ScrapeOnceEngine::get_answer`] reads the cache file into memory on first
//!   use; every later call, including concurrent ones, reuses that copy.
//! - [`ScrapeOnceEngine::cleanup`] removes the file and forgets the path.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use pagewise_client::{CompletionClient, PageFetcher, build_prompt, parse_answer};
use pagewise_core::cache::cache_file_name;
use pagewise_core::{Answer, ContentCache, Error, PageCacheEntry, ProcessIdentity};

/// Shared collaborators for every engine of a run.
#[derive(Clone)]
pub struct EngineContext {
    pub cache_dir: PathBuf,
    pub fetcher: Arc<dyn PageFetcher>,
    pub completion: Arc<dyn CompletionClient>,
    pub writer: ContentCache,
    pub identity: Arc<dyn ProcessIdentity>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Unfetched,
    /// Cache file written; `fetched` is false when the page could not be retrieved.
    Cached {
        fetched: bool,
    },
    Destroyed,
}

/// Result of [`ScrapeOnceEngine::fetch_and_cache`].
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOutcome {
    pub success: bool,
    pub path: PathBuf,
    pub error: Option<String>,
    /// Characters of cached content.
    pub text_length: usize,
    pub elapsed: Duration,
}

/// Timing and status of one completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerMetrics {
    pub status: bool,
    pub error: Option<String>,
    pub duration: Duration,
}

/// Fetches one URL for one project and answers templates against it.
pub struct ScrapeOnceEngine {
    ctx: EngineContext,
    url: String,
    project: String,
    entry: PageCacheEntry,
    state: EngineState,
}

impl ScrapeOnceEngine {
    pub fn new(ctx: EngineContext, url: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            ctx,
            url: url.into(),
            project: project.into(),
            entry: PageCacheEntry::default(),
            state: EngineState::Unfetched,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Current cache file path, if one is assigned.
    pub fn path(&self) -> Option<&Path> {
        self.entry.path()
    }

    /// Number of times the cache file has been read from disk.
    pub fn disk_reads(&self) -> usize {
        self.entry.disk_reads()
    }

    /// Fetch the page and persist it to this engine's cache file.
    ///
    /// A fetch failure is reported in the outcome, not as an error; an empty
    /// cache file is still written so the engine moves to `Cached`.
    ///
    /// # Errors
    ///
    /// `Error::InvalidInput` for an empty or unparseable URL or project name,
    /// `Error::Precondition` after cleanup, and `Error::Io` when the cache
    /// file cannot be written after retries.
    pub async fn fetch_and_cache(&mut self) -> Result<FetchOutcome, Error> {
        if self.state == EngineState::Destroyed {
            return Err(Error::Precondition("engine already cleaned up".into()));
        }

        let path = cache_file_name(&self.ctx.cache_dir, &self.url, &self.project, self.ctx.identity.as_ref())?;
        let start = Instant::now();

        let (content, error) = match self.ctx.fetcher.fetch_page(&self.url).await {
            Ok(page) => (page.content(), None),
            Err(e) => {
                tracing::warn!(url = %self.url, project = %self.project, error = %e, "page fetch failed");
                (String::new(), Some(e.to_string()))
            }
        };

        // The previous entry deletes its file when replaced, which may be this path.
        self.entry.cleanup().await?;
        self.ctx.writer.write_atomic(&path, &content).await?;

        let success = error.is_none();
        self.entry = PageCacheEntry::new(path.clone());
        self.state = EngineState::Cached { fetched: success };

        let outcome =
            FetchOutcome { success, path, error, text_length: content.chars().count(), elapsed: start.elapsed() };
        tracing::debug!(
            url = %self.url,
            success,
            text_length = outcome.text_length,
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            "page cached"
        );
        Ok(outcome)
    }

    /// Ask one template about the cached page.
    ///
    /// Completion failures yield `None` with the error in the metrics.
    ///
    /// # Errors
    ///
    /// `Error::Precondition` unless a successful `fetch_and_cache` preceded
    /// this call; `Error::Io` if the cache file cannot be read.
    pub async fn get_answer(&self, template: &str) -> Result<(Option<Answer>, AnswerMetrics), Error> {
        if self.state != (EngineState::Cached { fetched: true }) {
            return Err(Error::Precondition(format!("no fetched page for {} (state {:?})", self.url, self.state)));
        }

        let content = self.entry.content().await?;
        let prompt = build_prompt(template, &self.project, &content);

        let start = Instant::now();
        let result = self.ctx.completion.complete(&prompt).await;
        let duration = start.elapsed();

        Ok(match result {
            Ok(text) => (Some(parse_answer(text)), AnswerMetrics { status: true, error: None, duration }),
            Err(e) => {
                tracing::warn!(url = %self.url, project = %self.project, error = %e, "completion failed");
                (None, AnswerMetrics { status: false, error: Some(e.to_string()), duration })
            }
        })
    }

    /// Drop the in-memory copy; the cache file is kept.
    pub fn invalidate_memory(&mut self) {
        self.entry.invalidate();
    }

    /// Remove the cache file and in-memory copy. Safe to call repeatedly.
    pub async fn cleanup(&mut self) -> Result<(), Error> {
        self.entry.cleanup().await?;
        self.state = EngineState::Destroyed;
        Ok(())
    }
}
