//! Unified error types for pagewise.

/// Unified error types for the pagewise pipeline core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., empty URL or project name).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Filesystem operation failed (after any retries).
    #[error("IO_ERROR: {0}")]
    Io(#[from] std::io::Error),

    /// Operation called before the state it depends on exists.
    #[error("PRECONDITION_FAILED: {0}")]
    Precondition(String),

    /// Another live process holds the run lock.
    #[error("LOCK_CONTENTION: held by pid {pid} since {acquired_at}")]
    LockContention { pid: u32, acquired_at: String },

    /// Checkpoint data could not be decoded.
    #[error("CHECKPOINT_CORRUPT: {0}")]
    CheckpointCorrupt(String),

    /// Serialization of persisted state failed.
    #[error("SERIALIZE_FAILED: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Background worker (blocking pool or actor task) went away.
    #[error("WORKER_FAILED: {0}")]
    Worker(String),
}

impl Error {
    /// Stable short code for logs and audit rows.
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidInput(_) => "INVALID_INPUT",
            Error::Io(_) => "IO_ERROR",
            Error::Precondition(_) => "PRECONDITION_FAILED",
            Error::LockContention { .. } => "LOCK_CONTENTION",
            Error::CheckpointCorrupt(_) => "CHECKPOINT_CORRUPT",
            Error::Serialize(_) => "SERIALIZE_FAILED",
            Error::Worker(_) => "WORKER_FAILED",
        }
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Worker(err.to_string())
    }
}
