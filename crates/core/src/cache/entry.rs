//! Per-fetch cache state owned by a single processing unit.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::OnceCell;

use crate::Error;

/// Disk path plus a lazily loaded in-memory copy of the cached page.
///
/// Concurrent readers share one load: the first `content()` call reads the
/// file, every later call (on any task) gets the same `Arc<str>`.
///
/// Dropping an entry that still owns a path removes the file, so a unit that
/// unwinds before `cleanup()` leaves nothing behind.
#[derive(Debug, Default)]
pub struct PageCacheEntry {
    path: Option<PathBuf>,
    content: OnceCell<Arc<str>>,
    disk_reads: AtomicUsize,
}

impl PageCacheEntry {
    pub fn new(path: PathBuf) -> Self {
        Self { path: Some(path), content: OnceCell::new(), disk_reads: AtomicUsize::new(0) }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_loaded(&self) -> bool {
        self.content.initialized()
    }

    /// Number of times the file has been read from disk.
    pub fn disk_reads(&self) -> usize {
        self.disk_reads.load(Ordering::SeqCst)
    }

    /// Cached content, reading the file on first use.
    pub async fn content(&self) -> Result<Arc<str>, Error> {
        let path = self
            .path
            .clone()
            .ok_or_else(|| Error::Precondition("cache entry has no path".into()))?;

        self.content
            .get_or_try_init(|| async {
                self.disk_reads.fetch_add(1, Ordering::SeqCst);
                let text = tokio::task::spawn_blocking(move || std::fs::read_to_string(path)).await??;
                Ok::<_, Error>(Arc::from(text))
            })
            .await
            .cloned()
    }

    /// Drop the in-memory copy; the next `content()` re-reads disk.
    pub fn invalidate(&mut self) {
        self.content.take();
    }

    /// Remove the file (if any), drop memory and forget the path. Idempotent.
    pub async fn cleanup(&mut self) -> Result<(), Error> {
        self.content.take();
        let Some(path) = self.path.take() else {
            return Ok(());
        };

        let removed = tokio::task::spawn_blocking(move || match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::IsADirectory) => Ok(false),
            Err(e) if path.is_dir() => {
                tracing::debug!("cache path {} is not a file: {e}", path.display());
                Ok(false)
            }
            Err(e) => Err(e),
        })
        .await??;

        if !removed {
            tracing::debug!("cache file already gone during cleanup");
        }
        Ok(())
    }
}

impl Drop for PageCacheEntry {
    fn drop(&mut self) {
        let Some(path) = self.path.take() else {
            return;
        };
        match std::fs::remove_file(&path) {
            Ok(()) => tracing::debug!(path = %path.display(), "cache file removed on drop"),
            Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::IsADirectory) => {}
            Err(_) if path.is_dir() => {}
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to remove cache file on drop"),
        }
    }
}
