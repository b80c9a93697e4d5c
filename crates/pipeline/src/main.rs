//! pagewise batch entry point.
//!
//! Logging goes to stderr as JSON. Exit codes: 0 when every project finished,
//! 1 on setup failure or when another run holds the lock, 2 when some projects
//! failed (their progress stays in the checkpoint for the next run).

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use pagewise_client::{CompletionConfig, FetchConfig, HttpPageFetcher, OpenAiCompletionClient, PageFetcher};
use pagewise_core::{AppConfig, Error};
use pagewise_pipeline::{load_manifest, load_templates, run_batch};

const EXIT_PARTIAL_FAILURE: u8 = 2;

#[derive(Parser)]
#[command(name = "pagewise")]
#[command(about = "Fetch each source page once and ask it every question template", long_about = None)]
struct Cli {
    /// JSON manifest of projects and their sources
    #[arg(long, env = "PAGEWISE_MANIFEST")]
    manifest: PathBuf,

    /// Keep the checkpoint file even after a fully successful run
    #[arg(long)]
    keep_checkpoint: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();
    match start(cli) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("pagewise failed: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn start(cli: Cli) -> Result<ExitCode> {
    let mut config = AppConfig::load()?;
    if cli.keep_checkpoint {
        config.keep_checkpoint = true;
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .max_blocking_threads(config.worker_threads)
        .build()
        .context("failed to build runtime")?;
    runtime.block_on(execute(cli, config))
}

async fn execute(cli: Cli, config: AppConfig) -> Result<ExitCode> {
    tracing::info!(manifest = %cli.manifest.display(), "starting pagewise batch");

    let projects = load_manifest(&cli.manifest)
        .await
        .with_context(|| format!("failed to load manifest {}", cli.manifest.display()))?;
    let templates = load_templates(&config.prompt_dir, &config.prompt_filename_base, config.template_count).await?;

    let completion = Arc::new(OpenAiCompletionClient::new(CompletionConfig::from_app_config(&config)?)?);
    let fetcher = build_fetcher(&config).await?;

    match run_batch(&config, projects, templates, fetcher, completion).await {
        Ok(report) => {
            tracing::info!(
                readout = %report.readout.csv.display(),
                results = %report.readout.json.display(),
                audit_log = %report.audit_log.display(),
                completed = report.summary.completed(),
                skipped = report.summary.skipped(),
                failed = report.summary.failed(),
                checkpoint_removed = report.checkpoint_removed,
                "batch finished"
            );
            if report.summary.all_succeeded() {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::from(EXIT_PARTIAL_FAILURE))
            }
        }
        Err(e @ Error::LockContention { .. }) => {
            tracing::error!(error = %e, "batch not started");
            Ok(ExitCode::FAILURE)
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(feature = "render")]
async fn build_fetcher(config: &AppConfig) -> Result<Arc<dyn PageFetcher>> {
    if config.render_enabled {
        let fetcher = pagewise_client::HeadlessPageFetcher::launch(config.timeout()).await?;
        return Ok(Arc::new(fetcher));
    }
    http_fetcher(config)
}

#[cfg(not(feature = "render"))]
async fn build_fetcher(config: &AppConfig) -> Result<Arc<dyn PageFetcher>> {
    if config.render_enabled {
        tracing::warn!("render_enabled is set but this build has no browser support, using HTTP fetching");
    }
    http_fetcher(config)
}

fn http_fetcher(config: &AppConfig) -> Result<Arc<dyn PageFetcher>> {
    Ok(Arc::new(HttpPageFetcher::new(FetchConfig::from_app_config(config))?))
}
