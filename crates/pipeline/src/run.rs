//! One complete batch: lock, resume, process, export, clean up.

use std::path::PathBuf;
use std::sync::Arc;

use pagewise_client::{CompletionClient, PageFetcher};
use pagewise_core::{
    AppConfig, CheckpointHandle, CheckpointStore, ContentCache, CsvAuditLog, Error, LockPolicy, RunLock,
    SystemIdentity,
};

use crate::engine::EngineContext;
use crate::export::{Readout, write_results};
use crate::manifest::Project;
use crate::scheduler::{ProjectScheduler, RunSummary, SchedulerLimits};

/// Everything a finished batch produced.
#[derive(Debug)]
pub struct RunReport {
    pub summary: RunSummary,
    pub readout: Readout,
    pub audit_log: PathBuf,
    /// True when the checkpoint file was deleted after a clean run.
    pub checkpoint_removed: bool,
}

/// Run every unfinished project of `projects` against `templates`.
///
/// The run lock in `checkpoint_dir` is held for the whole batch. When it is
/// already held, [`LockPolicy::Abort`] returns `Error::LockContention` before
/// any state is touched and [`LockPolicy::Proceed`] continues without it.
///
/// The checkpoint is deleted only when no project failed and
/// `keep_checkpoint` is off.
pub async fn run_batch(
    config: &AppConfig, projects: Vec<Project>, templates: Vec<String>, fetcher: Arc<dyn PageFetcher>,
    completion: Arc<dyn CompletionClient>,
) -> Result<RunReport, Error> {
    let _lock = match RunLock::acquire(&config.checkpoint_dir).await {
        Ok(lock) => Some(lock),
        Err(e @ Error::LockContention { .. }) => match config.lock_policy {
            LockPolicy::Abort => {
                tracing::error!(error = %e, "another run holds the lock, aborting");
                return Err(e);
            }
            LockPolicy::Proceed => {
                tracing::warn!(error = %e, "another run holds the lock, proceeding anyway");
                None
            }
        },
        Err(e) => return Err(e),
    };

    let writer = ContentCache::default();
    let store = CheckpointStore::load(&config.checkpoint_dir, writer).await;
    let checkpoint = CheckpointHandle::spawn(store);

    let audit_dir = config.audit_log_dir.clone();
    let audit = tokio::task::spawn_blocking(move || CsvAuditLog::create(&audit_dir)).await??;
    let audit_log = audit.path().to_path_buf();

    let ctx = EngineContext {
        cache_dir: config.cache_dir.clone(),
        fetcher,
        completion,
        writer,
        identity: Arc::new(SystemIdentity),
    };
    let scheduler = ProjectScheduler::new(
        projects,
        templates,
        ctx,
        checkpoint.clone(),
        Arc::new(audit),
        SchedulerLimits::from_app_config(config),
    )?;

    let summary = scheduler.process_all().await?;
    let readout = write_results(&writer, &config.output_dir, &summary.table).await?;

    let checkpoint_removed = if summary.all_succeeded() && !config.keep_checkpoint {
        checkpoint.remove_file().await?;
        true
    } else {
        if !summary.all_succeeded() {
            tracing::warn!(failed = summary.failed(), "keeping checkpoint so failed projects are retried");
        }
        false
    };

    Ok(RunReport { summary, readout, audit_log, checkpoint_removed })
}
