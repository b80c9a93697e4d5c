//! Batch research pipeline for pagewise.
//!
//! For every project in a manifest, each source page is fetched once, cached on
//! disk, and asked every question template. Finished projects are checkpointed
//! so an interrupted batch resumes where it stopped.

pub mod engine;
pub mod export;
pub mod manifest;
pub mod prompts;
pub mod run;
pub mod scheduler;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::{AnswerMetrics, EngineContext, EngineState, FetchOutcome, ScrapeOnceEngine};
pub use export::{Readout, write_results};
pub use manifest::{Project, load_manifest, parse_manifest};
pub use prompts::load_templates;
pub use run::{RunReport, run_batch};
pub use scheduler::{ProjectOutcome, ProjectScheduler, RunSummary, SchedulerLimits};
