//! Core types and shared functionality for pagewise.
//!
//! This crate provides:
//! - Content-addressed page cache with atomic, retrying writes
//! - Checkpoint persistence and the whole-process run lock
//! - Unified error types
//! - Configuration structures

pub mod audit;
pub mod cache;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod identity;
pub mod lock;
pub mod results;

#[cfg(test)]
pub(crate) mod test_support;

pub use audit::{AuditRow, AuditSink, CsvAuditLog};
pub use cache::{CacheKey, ContentCache, PageCacheEntry, RetryPolicy};
pub use checkpoint::{CheckpointHandle, CheckpointStore};
pub use config::{AppConfig, ConfigError, LockPolicy};
pub use error::Error;
pub use identity::{FixedIdentity, ProcessIdentity, SystemIdentity};
pub use lock::{RunLock, RunLockRecord};
pub use results::{Answer, ConsolidatedRow, ResultTable, UrlRecord, clean_values};
