//! Whole-process run lock.
//!
//! A `run.lock` sentinel beside the checkpoint stops a relaunched batch from
//! running on top of one that is still alive. The file holds a JSON
//! [`RunLockRecord`] and is additionally held with an exclusive advisory lock
//! (`flock`/`LockFileEx`) for as long as the [`RunLock`] lives.
//!
//! ### Stale locks
//! A lock whose recorded pid no longer exists is stale: it is removed and
//! acquisition is retried once. A record that cannot be parsed is stale only if
//! nobody holds the advisory lock on it.
//!
//! Advisory locks may not be honored on network filesystems.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

use crate::Error;

pub const LOCK_FILE: &str = "run.lock";

/// Contents of the lock file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunLockRecord {
    pub pid: u32,
    pub acquired_at: DateTime<Utc>,
}

/// Held run lock. Released (file removed, advisory lock dropped) on drop.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
    file: Option<File>,
    record: RunLockRecord,
}

impl RunLock {
    /// Acquire the lock in `dir` without blocking the async runtime.
    ///
    /// # Errors
    ///
    /// `Error::LockContention` when a live process holds the lock, `Error::Io`
    /// when the directory or file cannot be created.
    pub async fn acquire(dir: &Path) -> Result<Self, Error> {
        let dir = dir.to_path_buf();
        tokio::task::spawn_blocking(move || Self::acquire_blocking(&dir)).await?
    }

    /// Blocking variant of [`RunLock::acquire`].
    pub fn acquire_blocking(dir: &Path) -> Result<Self, Error> {
        fs::create_dir_all(dir)?;
        let path = dir.join(LOCK_FILE);

        match try_create(&path)? {
            Some(lock) => return Ok(lock),
            None => {
                if !holder_is_stale(&path)? {
                    return Err(contention(&path));
                }
                tracing::warn!(path = %path.display(), "removing stale run lock");
                match fs::remove_file(&path) {
                    Err(e) if e.kind() != ErrorKind::NotFound => return Err(e.into()),
                    _ => {}
                }
            }
        }

        try_create(&path)?.ok_or_else(|| contention(&path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self) -> &RunLockRecord {
        &self.record
    }

    /// Read the record currently stored at `path`, if any.
    pub fn read_record(path: &Path) -> Option<RunLockRecord> {
        let raw = fs::read_to_string(path).ok()?;
        serde_json::from_str(&raw).ok()
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Err(e) if e.kind() != ErrorKind::NotFound => {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to remove run lock");
            }
            _ => {}
        }
        if let Some(file) = self.file.take() {
            let _ = FileExt::unlock(&file);
        }
        tracing::debug!(path = %self.path.display(), "run lock released");
    }
}

/// Create the lock file exclusively. `Ok(None)` means it already exists.
fn try_create(path: &Path) -> Result<Option<RunLock>, Error> {
    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    if file.try_lock_exclusive().is_err() {
        // Someone opened the fresh file and locked it first.
        return Ok(None);
    }

    let record = RunLockRecord { pid: std::process::id(), acquired_at: Utc::now() };
    let written = serde_json::to_vec(&record)
        .map_err(Error::from)
        .and_then(|body| file.write_all(&body).and_then(|()| file.sync_all()).map_err(Error::from));

    if let Err(e) = written {
        let _ = FileExt::unlock(&file);
        let _ = fs::remove_file(path);
        return Err(e);
    }

    tracing::info!(path = %path.display(), pid = record.pid, "run lock acquired");
    Ok(Some(RunLock { path: path.to_path_buf(), file: Some(file), record }))
}

fn holder_is_stale(path: &Path) -> Result<bool, Error> {
    match RunLock::read_record(path) {
        Some(record) => Ok(!process_alive(record.pid)),
        None => {
            let file = match File::open(path) {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::NotFound => return Ok(true),
                Err(e) => return Err(e.into()),
            };
            let free = file.try_lock_exclusive().is_ok();
            let _ = FileExt::unlock(&file);
            Ok(free)
        }
    }
}

fn contention(path: &Path) -> Error {
    match RunLock::read_record(path) {
        Some(record) => Error::LockContention { pid: record.pid, acquired_at: record.acquired_at.to_rfc3339() },
        None => Error::LockContention { pid: 0, acquired_at: "unknown".into() },
    }
}

/// Whether a process with `pid` currently exists.
pub fn process_alive(pid: u32) -> bool {
    if pid == std::process::id() {
        return true;
    }
    let mut system = System::new();
    let target = [Pid::from(pid as usize)];
    system.refresh_processes_specifics(ProcessesToUpdate::Some(&target), true, ProcessRefreshKind::new());
    system.process(target[0]).is_some()
}
