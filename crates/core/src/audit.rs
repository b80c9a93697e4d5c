//! Per-URL processing audit trail.
//!
//! One row is appended per processed URL, in completion order. The CSV header
//! is written once, ahead of the first row.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Serialize;

use crate::Error;

/// One audit record. Column names follow the log's published header.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditRow {
    #[serde(rename = "URL")]
    pub url: String,
    pub project_name: String,
    /// RFC 3339 timestamp with offset.
    pub timestamp: String,
    pub text_extraction_status: bool,
    pub text_extraction_error: String,
    pub text_length: usize,
    pub llm_response_status: bool,
    pub llm_response_error: String,
    pub response_time_ms: u64,
}

/// Error-column text recorded when a step succeeded.
pub const NO_ERROR: &str = "None";

impl AuditRow {
    /// Current local time, formatted for the `timestamp` column.
    pub fn timestamp() -> String {
        chrono::Local::now().to_rfc3339()
    }

    /// Error-column text: the message, or [`NO_ERROR`].
    pub fn error_text(error: Option<&str>) -> String {
        error.unwrap_or(NO_ERROR).to_string()
    }
}

/// Destination for audit rows. Implementations must tolerate concurrent callers.
pub trait AuditSink: Send + Sync {
    fn record(&self, row: &AuditRow) -> Result<(), Error>;
}

/// CSV audit log at `{dir}/pipeline_log_{timestamp}.csv`.
pub struct CsvAuditLog {
    path: PathBuf,
    writer: Mutex<csv::Writer<File>>,
}

impl CsvAuditLog {
    /// Create a fresh, timestamped log file in `dir`.
    pub fn create(dir: &Path) -> Result<Self, Error> {
        let stamp = chrono::Local::now().format("%Y-%m-%d_%H-%M-%S");
        Self::create_at(dir.join(format!("pipeline_log_{stamp}.csv")))
    }

    /// Create (or truncate) a log file at an explicit path.
    pub fn create_at(path: PathBuf) -> Result<Self, Error> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let writer = csv::Writer::from_path(&path).map_err(csv_error)?;
        tracing::debug!(path = %path.display(), "audit log created");
        Ok(Self { path, writer: Mutex::new(writer) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for CsvAuditLog {
    fn record(&self, row: &AuditRow) -> Result<(), Error> {
        let mut writer = self.writer.lock().map_err(|_| Error::Worker("audit log mutex poisoned".into()))?;
        writer.serialize(row).map_err(csv_error)?;
        writer.flush()?;
        Ok(())
    }
}

impl std::fmt::Debug for CsvAuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsvAuditLog").field("path", &self.path).finish_non_exhaustive()
    }
}

fn csv_error(err: csv::Error) -> Error {
    match err.into_kind() {
        csv::ErrorKind::Io(io) => Error::Io(io),
        other => Error::InvalidInput(format!("audit row could not be written: {other:?}")),
    }
}
