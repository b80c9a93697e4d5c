//! File-backed page cache.
//!
//! Fetched page content is written to a content-addressed file per
//! (URL, project, worker) and read back lazily by the processing unit that
//! owns it. It supports:
//!
//! - Deterministic SHA-256 keys over normalized URLs and project names
//! - Write-temp-then-rename persistence with bounded retry/backoff
//! - Single disk read per owner, shared by all template calls

pub mod atomic;
pub mod entry;
pub mod key;

pub use crate::Error;

pub use atomic::{ContentCache, RetryPolicy};
pub use entry::PageCacheEntry;
pub use key::{CacheKey, cache_file_name, normalize_project_name, normalize_url, project_hash, url_hash};
