//! Atomic, retrying file persistence.
//!
//! Content is written to a temp file in the target's directory, synced, and
//! renamed over the target, so readers see either the old file or the complete
//! new one. Transient failures are retried with exponential backoff.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::Error;

/// Retry schedule for atomic writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first (default: 3).
    pub max_attempts: u32,
    /// Delay after the first failed attempt; doubles each time (default: 1s).
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, base_delay: Duration::from_secs(1) }
    }
}

impl RetryPolicy {
    /// Backoff before retrying after failed attempt `attempt` (1-based): `base * 2^(attempt-1)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * (1u32 << attempt.saturating_sub(1).min(16))
    }
}

/// Writes page content and checkpoints to disk atomically.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentCache {
    policy: RetryPolicy,
}

impl ContentCache {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Atomically replace `path` with `content`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` for an empty path or one without a file
    /// name (never retried), and the last `Error::Io` once every attempt failed.
    pub async fn write_atomic(&self, path: &Path, content: &str) -> Result<(), Error> {
        self.write_atomic_with(path, content, write_once).await
    }

    /// Retry loop around a single-attempt writer.
    pub(crate) async fn write_atomic_with<F>(&self, path: &Path, content: &str, attempt_fn: F) -> Result<(), Error>
    where
        F: Fn(&Path, &str) -> std::io::Result<()> + Send + Sync + 'static,
    {
        validate_target(path)?;

        let attempt_fn = Arc::new(attempt_fn);
        let target: Arc<Path> = Arc::from(path);
        let content: Arc<str> = Arc::from(content);
        let max_attempts = self.policy.max_attempts.max(1);

        let mut attempt = 1;
        loop {
            let (f, p, c) = (attempt_fn.clone(), target.clone(), content.clone());
            let result = tokio::task::spawn_blocking(move || f(&*p, &*c)).await?;

            let err = match result {
                Ok(()) => return Ok(()),
                Err(err) => err,
            };

            if attempt >= max_attempts {
                tracing::error!(
                    path = %target.display(),
                    attempts = max_attempts,
                    error = %err,
                    "atomic write failed after all attempts"
                );
                return Err(Error::Io(err));
            }

            let delay = self.policy.delay_for(attempt);
            tracing::warn!(
                path = %target.display(),
                attempt,
                max_attempts,
                error = %err,
                delay_ms = delay.as_millis() as u64,
                "atomic write attempt failed, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

fn validate_target(path: &Path) -> Result<(), Error> {
    if path.as_os_str().is_empty() {
        return Err(Error::InvalidInput("file path cannot be empty".into()));
    }
    if path.file_name().is_none() {
        return Err(Error::InvalidInput(format!("file path has no file name: {}", path.display())));
    }
    Ok(())
}

/// One write-temp-sync-rename attempt. The temp file is removed if any step fails.
pub(crate) fn write_once(path: &Path, content: &str) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let file_name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    let mut tmp = tempfile::Builder::new()
        .prefix(&format!(".{file_name}_"))
        .suffix(".tmp")
        .tempfile_in(parent)?;

    tmp.write_all(content.as_bytes())?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;

    #[cfg(unix)]
    if let Ok(dir) = fs::OpenOptions::new().read(true).open(parent) {
        let _ = dir.sync_all();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::LevelCounter;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn temp_artifacts(dir: &Path) -> Vec<String> {
        fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|n| n.ends_with(".tmp"))
            .collect()
    }

    #[test]
    fn test_delay_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_write_roundtrip_large_unicode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/page.txt");
        let content = "測試 ünïcødé 🚀 line\n".repeat(150_000);
        assert!(content.len() > 3 * 1024 * 1024);

        ContentCache::default().write_atomic(&path, &content).await.unwrap();

        let read = fs::read(&path).unwrap();
        assert_eq!(read, content.as_bytes());
        assert!(temp_artifacts(path.parent().unwrap()).is_empty());
    }

    #[tokio::test]
    async fn test_write_replaces_existing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.txt");
        let cache = ContentCache::default();
        cache.write_atomic(&path, "first").await.unwrap();
        cache.write_atomic(&path, "").await.unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
    }

    #[tokio::test]
    async fn test_invalid_path_fails_fast() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result = ContentCache::default()
            .write_atomic_with(Path::new(""), "x", move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let result = ContentCache::default().write_atomic(Path::new("/"), "x").await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_on_third_attempt() {
        let (counter, _guard) = LevelCounter::install();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.txt");
        let calls = Arc::new(AtomicU32::new(0));
        let seen = calls.clone();

        let start = tokio::time::Instant::now();
        ContentCache::default()
            .write_atomic_with(&path, "payload", move |p, c| {
                if seen.fetch_add(1, Ordering::SeqCst) < 2 {
                    return Err(std::io::Error::other("disk busy"));
                }
                write_once(p, c)
            })
            .await
            .unwrap();
        let elapsed = start.elapsed();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(elapsed >= Duration::from_secs(3), "slept {elapsed:?}");
        assert!(elapsed < Duration::from_secs(4), "slept {elapsed:?}");
        assert_eq!(counter.warnings(), 2);
        assert_eq!(counter.errors(), 0);
        assert_eq!(fs::read_to_string(&path).unwrap(), "payload");
        assert!(temp_artifacts(dir.path()).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhausted() {
        let (counter, _guard) = LevelCounter::install();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.txt");
        let calls = Arc::new(AtomicU32::new(0));
        let seen = calls.clone();

        let result = ContentCache::default()
            .write_atomic_with(&path, "payload", move |_, _| {
                seen.fetch_add(1, Ordering::SeqCst);
                Err(std::io::Error::new(std::io::ErrorKind::StorageFull, "no space"))
            })
            .await;

        assert!(matches!(result, Err(Error::Io(ref e)) if e.kind() == std::io::ErrorKind::StorageFull));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(counter.warnings(), 2);
        assert_eq!(counter.errors(), 1);
        assert!(!path.exists());
    }
}
