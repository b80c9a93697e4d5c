//! Durable record of completed projects.
//!
//! The checkpoint is one version-tagged JSON document per checkpoint directory:
//!
//! ```json
//! {"version": 1, "projects": {"Solar Alpha": [ ...rows... ]}}
//! ```
//!
//! A project appears in the document only once its whole result table has been
//! persisted. [`CheckpointHandle`] wraps the store in a single owning task so
//! concurrent projects never race on the completed set.

use std::collections::{BTreeMap, BTreeSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crate::cache::{ContentCache, normalize_project_name};
use crate::{Error, ResultTable};

pub const CHECKPOINT_FILE: &str = "checkpoint.json";
pub const CHECKPOINT_VERSION: u32 = 1;

const COMMAND_BUFFER: usize = 64;

#[derive(Debug, Serialize, Deserialize)]
struct CheckpointDocument {
    version: u32,
    #[serde(default)]
    projects: BTreeMap<String, ResultTable>,
}

/// Completed-project results backed by `checkpoint.json`.
#[derive(Debug)]
pub struct CheckpointStore {
    path: PathBuf,
    writer: ContentCache,
    projects: BTreeMap<String, ResultTable>,
}

impl CheckpointStore {
    /// Load the checkpoint in `dir`.
    ///
    /// Never fails: a missing file starts empty, and an unreadable, corrupt or
    /// newer-version file is logged and treated as empty.
    pub async fn load(dir: &Path, writer: ContentCache) -> Self {
        let path = dir.join(CHECKPOINT_FILE);
        let read_path = path.clone();
        let read = tokio::task::spawn_blocking(move || std::fs::read_to_string(read_path)).await;

        let projects = match read {
            Ok(Ok(raw)) => match decode(&raw) {
                Ok(projects) => {
                    tracing::info!(path = %path.display(), completed = projects.len(), "checkpoint loaded");
                    projects
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "ignoring unusable checkpoint");
                    BTreeMap::new()
                }
            },
            Ok(Err(e)) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no checkpoint, starting fresh");
                BTreeMap::new()
            }
            Ok(Err(e)) => {
                tracing::warn!(path = %path.display(), error = %e, "checkpoint unreadable, starting fresh");
                BTreeMap::new()
            }
            Err(e) => {
                tracing::warn!(error = %e, "checkpoint load task failed, starting fresh");
                BTreeMap::new()
            }
        };

        Self { path, writer, projects }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_completed(&self, project: &str) -> bool {
        self.projects.contains_key(&project_key(project))
    }

    pub fn completed(&self) -> BTreeSet<String> {
        self.projects.keys().cloned().collect()
    }

    pub fn table(&self, project: &str) -> Option<&ResultTable> {
        self.projects.get(&project_key(project))
    }

    pub fn tables(&self) -> &BTreeMap<String, ResultTable> {
        &self.projects
    }

    /// Mark `project` complete with its results and persist the whole document.
    ///
    /// The in-memory set only changes once the write succeeded.
    pub async fn record(&mut self, project: &str, table: ResultTable) -> Result<(), Error> {
        let key = project_key(project);
        let previous = self.projects.insert(key.clone(), table);

        let outcome = match self.encode() {
            Ok(body) => self.writer.write_atomic(&self.path, &body).await,
            Err(e) => Err(e),
        };

        if let Err(e) = outcome {
            match previous {
                Some(prev) => self.projects.insert(key, prev),
                None => self.projects.remove(&key),
            };
            return Err(e);
        }

        tracing::debug!(project = %key, completed = self.projects.len(), "checkpoint updated");
        Ok(())
    }

    /// Delete the checkpoint file. A missing file is not an error.
    pub async fn remove_file(&self) -> Result<(), Error> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || match std::fs::remove_file(&path) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        })
        .await??;
        tracing::info!(path = %self.path.display(), "checkpoint removed");
        Ok(())
    }

    fn encode(&self) -> Result<String, Error> {
        let doc = CheckpointDocumentRef { version: CHECKPOINT_VERSION, projects: &self.projects };
        Ok(serde_json::to_string(&doc)?)
    }
}

#[derive(Serialize)]
struct CheckpointDocumentRef<'a> {
    version: u32,
    projects: &'a BTreeMap<String, ResultTable>,
}

fn decode(raw: &str) -> Result<BTreeMap<String, ResultTable>, Error> {
    let doc: CheckpointDocument = serde_json::from_str(raw).map_err(|e| Error::CheckpointCorrupt(e.to_string()))?;
    if doc.version > CHECKPOINT_VERSION {
        return Err(Error::CheckpointCorrupt(format!(
            "checkpoint version {} is newer than supported version {CHECKPOINT_VERSION}",
            doc.version
        )));
    }
    Ok(doc.projects)
}

fn project_key(project: &str) -> String {
    normalize_project_name(project).unwrap_or_else(|_| project.to_string())
}

enum Command {
    IsCompleted { project: String, reply: oneshot::Sender<bool> },
    Record { project: String, table: ResultTable, reply: oneshot::Sender<Result<(), Error>> },
    Completed { reply: oneshot::Sender<BTreeSet<String>> },
    Tables { reply: oneshot::Sender<BTreeMap<String, ResultTable>> },
    RemoveFile { reply: oneshot::Sender<Result<(), Error>> },
}

/// Cloneable handle to a checkpoint store owned by a background task.
#[derive(Debug, Clone)]
pub struct CheckpointHandle {
    sender: mpsc::Sender<Command>,
}

impl CheckpointHandle {
    /// Move `store` into a new task and return a handle to it.
    ///
    /// The task exits once every handle is dropped.
    pub fn spawn(store: CheckpointStore) -> Self {
        let (sender, receiver) = mpsc::channel(COMMAND_BUFFER);
        tokio::spawn(Self::run(store, receiver));
        Self { sender }
    }

    async fn run(mut store: CheckpointStore, mut receiver: mpsc::Receiver<Command>) {
        while let Some(command) = receiver.recv().await {
            match command {
                Command::IsCompleted { project, reply } => {
                    let _ = reply.send(store.is_completed(&project));
                }
                Command::Record { project, table, reply } => {
                    let _ = reply.send(store.record(&project, table).await);
                }
                Command::Completed { reply } => {
                    let _ = reply.send(store.completed());
                }
                Command::Tables { reply } => {
                    let _ = reply.send(store.tables().clone());
                }
                Command::RemoveFile { reply } => {
                    let _ = reply.send(store.remove_file().await);
                }
            }
        }
        tracing::debug!("checkpoint task stopped");
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T, Error> {
        let (reply, response) = oneshot::channel();
        self.sender.send(build(reply)).await.map_err(|_| Error::Worker("checkpoint task is gone".into()))?;
        response.await.map_err(|_| Error::Worker("checkpoint task dropped the request".into()))
    }

    pub async fn is_completed(&self, project: &str) -> Result<bool, Error> {
        let project = project.to_string();
        self.request(|reply| Command::IsCompleted { project, reply }).await
    }

    pub async fn record(&self, project: &str, table: ResultTable) -> Result<(), Error> {
        let project = project.to_string();
        self.request(|reply| Command::Record { project, table, reply }).await?
    }

    pub async fn completed(&self) -> Result<BTreeSet<String>, Error> {
        self.request(|reply| Command::Completed { reply }).await
    }

    pub async fn tables(&self) -> Result<BTreeMap<String, ResultTable>, Error> {
        self.request(|reply| Command::Tables { reply }).await
    }

    pub async fn remove_file(&self) -> Result<(), Error> {
        self.request(|reply| Command::RemoveFile { reply }).await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Answer, RetryPolicy, UrlRecord};
    use std::time::Duration;

    fn table(project: &str) -> ResultTable {
        ResultTable::from_rows(vec![UrlRecord {
            project: project.into(),
            url: "https://example.com/a".into(),
            fetched: true,
            answers: vec![Some(Answer::new("42 MW", None)), None],
        }])
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::load(dir.path(), ContentCache::default()).await;
        assert!(store.completed().is_empty());
        assert_eq!(store.path(), dir.path().join(CHECKPOINT_FILE));
    }

    #[tokio::test]
    async fn test_record_then_reload() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = CheckpointStore::load(dir.path(), ContentCache::default()).await;
        store.record("Alpha", table("Alpha")).await.unwrap();
        assert!(store.is_completed("Alpha"));
        assert!(store.is_completed("  Alpha "));

        let reloaded = CheckpointStore::load(dir.path(), ContentCache::default()).await;
        assert_eq!(reloaded.completed(), BTreeSet::from(["Alpha".to_string()]));
        assert_eq!(reloaded.table("Alpha"), Some(&table("Alpha")));

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(raw["version"], CHECKPOINT_VERSION);
        assert!(raw["projects"]["Alpha"].is_array());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CHECKPOINT_FILE), "{\"version\": 1, \"projects\": ").unwrap();
        let store = CheckpointStore::load(dir.path(), ContentCache::default()).await;
        assert!(store.completed().is_empty());
    }

    #[tokio::test]
    async fn test_future_version_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CHECKPOINT_FILE), "{\"version\": 99, \"projects\": {\"Alpha\": []}}").unwrap();
        let store = CheckpointStore::load(dir.path(), ContentCache::default()).await;
        assert!(!store.is_completed("Alpha"));
    }

    #[test]
    fn test_decode_errors_are_corrupt() {
        assert!(matches!(decode("not json"), Err(Error::CheckpointCorrupt(_))));
        assert!(matches!(decode("{\"version\": 2}"), Err(Error::CheckpointCorrupt(_))));
        assert!(decode("{\"version\": 1}").unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_write_leaves_project_incomplete() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the checkpoint file should be makes every rename fail.
        std::fs::create_dir(dir.path().join(CHECKPOINT_FILE)).unwrap();
        let writer = ContentCache::new(RetryPolicy { max_attempts: 2, base_delay: Duration::from_millis(10) });

        let mut store = CheckpointStore::load(dir.path(), writer).await;
        assert!(store.record("Alpha", table("Alpha")).await.is_err());
        assert!(!store.is_completed("Alpha"));
    }

    #[tokio::test]
    async fn test_remove_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = CheckpointStore::load(dir.path(), ContentCache::default()).await;
        store.record("Alpha", table("Alpha")).await.unwrap();
        store.remove_file().await.unwrap();
        assert!(!store.path().exists());
        store.remove_file().await.unwrap();
    }

    #[tokio::test]
    async fn test_handle_serializes_concurrent_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::load(dir.path(), ContentCache::default()).await;
        let handle = CheckpointHandle::spawn(store);

        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..20 {
            let handle = handle.clone();
            tasks.spawn(async move {
                let name = format!("Project {i}");
                handle.record(&name, table(&name)).await
            });
        }
        while let Some(result) = tasks.join_next().await {
            result.unwrap().unwrap();
        }

        assert_eq!(handle.completed().await.unwrap().len(), 20);
        assert!(handle.is_completed("Project 7").await.unwrap());
        assert!(!handle.is_completed("Project 20").await.unwrap());

        let reloaded = CheckpointStore::load(dir.path(), ContentCache::default()).await;
        assert_eq!(reloaded.completed().len(), 20);
        assert_eq!(handle.tables().await.unwrap().len(), 20);

        handle.remove_file().await.unwrap();
        assert!(!dir.path().join(CHECKPOINT_FILE).exists());
    }
}
