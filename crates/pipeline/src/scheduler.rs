//! Project-level fan-out under a hard admission limit.
//!
//! ### Concurrency
//! - At most `max_concurrent_projects` projects hold a permit at once; a
//!   permit is held while that project's pages are fetched and answered.
//! - Within a project, up to `max_concurrent_urls` pages are in flight and
//!   every template of one page is asked concurrently.
//!
//! ### Failure isolation
//! Each project runs in its own task. An error or panic inside one project
//! marks only that project [`ProjectOutcome::Failed`]; it is left out of the
//! checkpoint so the next run retries it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures_util::future::join_all;
use futures_util::{StreamExt, stream};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use pagewise_core::cache::normalize_project_name;
use pagewise_core::{AuditRow, AuditSink, CheckpointHandle, Error, ResultTable, UrlRecord};

use crate::engine::{EngineContext, ScrapeOnceEngine};
use crate::manifest::Project;

/// Completion-error text recorded for pages that could not be fetched.
pub const NO_COMPLETION_ATTEMPTED: &str = "Text extraction failed - no LLM processing attempted";

/// Admission limits for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerLimits {
    pub max_concurrent_projects: usize,
    pub max_concurrent_urls: usize,
}

impl SchedulerLimits {
    pub fn from_app_config(config: &pagewise_core::AppConfig) -> Self {
        Self {
            max_concurrent_projects: config.max_concurrent_projects,
            max_concurrent_urls: config.max_concurrent_urls,
        }
    }
}

/// What happened to one project in a run.
#[derive(Debug, Clone, PartialEq)]
pub enum ProjectOutcome {
    /// Already in the checkpoint; nothing was fetched.
    Skipped,
    Completed(ResultTable),
    Failed(String),
}

impl ProjectOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, ProjectOutcome::Failed(_))
    }
}

/// Merged results plus a per-project report, in manifest order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    /// Rows of every project present in the checkpoint after the run.
    pub table: ResultTable,
    pub outcomes: Vec<(String, ProjectOutcome)>,
}

impl RunSummary {
    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.is_failed()).count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| matches!(o, ProjectOutcome::Skipped)).count()
    }

    pub fn completed(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| matches!(o, ProjectOutcome::Completed(_))).count()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed() == 0
    }

    pub fn outcome(&self, project: &str) -> Option<&ProjectOutcome> {
        self.outcomes.iter().find(|(name, _)| name == project).map(|(_, o)| o)
    }
}

struct Inner {
    projects: Vec<Project>,
    templates: Vec<String>,
    ctx: EngineContext,
    checkpoint: CheckpointHandle,
    audit: Arc<dyn AuditSink>,
    permits: Arc<Semaphore>,
    limits: SchedulerLimits,
}

/// Runs projects against the checkpoint, at most M at a time.
#[derive(Clone)]
pub struct ProjectScheduler {
    inner: Arc<Inner>,
}

impl ProjectScheduler {
    /// # Errors
    ///
    /// `Error::InvalidInput` when either limit is zero or no template is given.
    pub fn new(
        projects: Vec<Project>, templates: Vec<String>, ctx: EngineContext, checkpoint: CheckpointHandle,
        audit: Arc<dyn AuditSink>, limits: SchedulerLimits,
    ) -> Result<Self, Error> {
        if limits.max_concurrent_projects == 0 || limits.max_concurrent_urls == 0 {
            return Err(Error::InvalidInput("concurrency limits must be at least 1".into()));
        }
        if templates.is_empty() {
            return Err(Error::InvalidInput("at least one question template is required".into()));
        }

        let permits = Arc::new(Semaphore::new(limits.max_concurrent_projects));
        Ok(Self { inner: Arc::new(Inner { projects, templates, ctx, checkpoint, audit, permits, limits }) })
    }

    pub fn projects(&self) -> &[Project] {
        &self.inner.projects
    }

    /// Permits not currently held by a running project.
    pub fn available_permits(&self) -> usize {
        self.inner.permits.available_permits()
    }

    /// Process one project unless the checkpoint already has it.
    ///
    /// Never returns an error: failures are reported as [`ProjectOutcome::Failed`].
    pub async fn process_project(&self, name: &str) -> ProjectOutcome {
        match self.try_process_project(name).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(project = %name, error = %e, "project failed");
                ProjectOutcome::Failed(e.to_string())
            }
        }
    }

    async fn try_process_project(&self, name: &str) -> Result<ProjectOutcome, Error> {
        let key = normalize_project_name(name)?;
        let project = self
            .inner
            .projects
            .iter()
            .find(|p| p.name == key)
            .ok_or_else(|| Error::InvalidInput(format!("unknown project: {key}")))?;

        if self.inner.checkpoint.is_completed(&project.name).await? {
            tracing::debug!(project = %project.name, "already checkpointed, skipping");
            return Ok(ProjectOutcome::Skipped);
        }

        let permit = Arc::clone(&self.inner.permits)
            .acquire_owned()
            .await
            .map_err(|_| Error::Worker("project semaphore closed".into()))?;
        let start = Instant::now();

        // Every page runs to completion (and cleans up its cache file) before
        // the first error is reported.
        let results: Vec<Result<UrlRecord, Error>> = stream::iter(project.urls.iter().cloned())
            .map(|url: String| {
                let name = project.name.as_str();
                async move { self.process_url(name, &url).await }
            })
            .buffered(self.inner.limits.max_concurrent_urls)
            .collect()
            .await;
        drop(permit);

        let table = results.into_iter().collect::<Result<ResultTable, Error>>()?;
        self.inner.checkpoint.record(&project.name, table.clone()).await?;

        tracing::info!(
            project = %project.name,
            urls = project.urls.len(),
            answered = table.answered(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "project completed"
        );
        Ok(ProjectOutcome::Completed(table))
    }

    async fn process_url(&self, project: &str, url: &str) -> Result<UrlRecord, Error> {
        let mut engine = ScrapeOnceEngine::new(self.inner.ctx.clone(), url, project);
        let result = self.answer_page(&mut engine, project).await;
        if let Err(e) = engine.cleanup().await {
            tracing::warn!(url, project, error = %e, "cache cleanup failed");
        }
        result
    }

    async fn answer_page(&self, engine: &mut ScrapeOnceEngine, project: &str) -> Result<UrlRecord, Error> {
        let start = Instant::now();
        let fetch = engine.fetch_and_cache().await?;
        let url = engine.url().to_string();
        let templates = &self.inner.templates;

        if !fetch.success {
            let row = AuditRow {
                url: url.clone(),
                project_name: project.to_string(),
                timestamp: AuditRow::timestamp(),
                text_extraction_status: false,
                text_extraction_error: AuditRow::error_text(fetch.error.as_deref()),
                text_length: 0,
                llm_response_status: false,
                llm_response_error: NO_COMPLETION_ATTEMPTED.to_string(),
                response_time_ms: elapsed_ms(start),
            };
            self.audit(row).await;
            return Ok(UrlRecord { project: project.to_string(), url, fetched: false, answers: vec![None; templates.len()] });
        }

        let engine = &*engine;
        let results = join_all(templates.iter().map(|t| engine.get_answer(t))).await;

        let mut answers = Vec::with_capacity(results.len());
        let mut first_error = None;
        for result in results {
            let (answer, metrics) = result?;
            if first_error.is_none() {
                first_error = metrics.error;
            }
            answers.push(answer);
        }

        let row = AuditRow {
            url: url.clone(),
            project_name: project.to_string(),
            timestamp: AuditRow::timestamp(),
            text_extraction_status: true,
            text_extraction_error: AuditRow::error_text(None),
            text_length: fetch.text_length,
            llm_response_status: first_error.is_none(),
            llm_response_error: AuditRow::error_text(first_error.as_deref()),
            response_time_ms: elapsed_ms(start),
        };
        self.audit(row).await;

        Ok(UrlRecord { project: project.to_string(), url, fetched: true, answers })
    }

    async fn audit(&self, row: AuditRow) {
        let sink = Arc::clone(&self.inner.audit);
        match tokio::task::spawn_blocking(move || sink.record(&row)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "audit row not written"),
            Err(e) => tracing::warn!(error = %e, "audit task failed"),
        }
    }

    /// Run every project not yet checkpointed and merge the results.
    ///
    /// The merged table holds, in manifest order, the rows of every project
    /// the checkpoint knows about once the run ends, so projects skipped
    /// because an earlier run finished them are included.
    ///
    /// # Errors
    ///
    /// Only when the checkpoint task is unreachable.
    pub async fn process_all(&self) -> Result<RunSummary, Error> {
        let completed = self.inner.checkpoint.completed().await?;

        let mut outcomes: HashMap<String, ProjectOutcome> = HashMap::new();
        let mut handles: Vec<(String, JoinHandle<ProjectOutcome>)> = Vec::new();
        for project in &self.inner.projects {
            if completed.contains(&project.name) {
                outcomes.insert(project.name.clone(), ProjectOutcome::Skipped);
                continue;
            }
            let scheduler = self.clone();
            let name = project.name.clone();
            handles.push((project.name.clone(), tokio::spawn(async move { scheduler.process_project(&name).await })));
        }

        tracing::info!(
            total = self.inner.projects.len(),
            skipped = outcomes.len(),
            launched = handles.len(),
            max_concurrent_projects = self.inner.limits.max_concurrent_projects,
            "processing projects"
        );

        for (name, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(project = %name, error = %e, "project task panicked");
                    ProjectOutcome::Failed(format!("project task panicked: {e}"))
                }
            };
            outcomes.insert(name, outcome);
        }

        let tables = self.inner.checkpoint.tables().await?;
        let mut summary = RunSummary::default();
        for project in &self.inner.projects {
            if let Some(table) = tables.get(&project.name) {
                summary.table.merge(table.clone());
            }
            if let Some(outcome) = outcomes.remove(&project.name) {
                summary.outcomes.push((project.name.clone(), outcome));
            }
        }

        tracing::info!(
            completed = summary.completed(),
            skipped = summary.skipped(),
            failed = summary.failed(),
            rows = summary.table.len(),
            "run finished"
        );
        Ok(summary)
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}
