use shelfsync_scanner::ScanError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("task {0} already exists")]
    DuplicateTask(String),

    /// A whole-job precondition failed; the job is marked failed before any
    /// unit runs.
    #[error("{0}")]
    Invariant(String),

    #[error("{0}")]
    Validation(String),

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Scan(#[from] ScanError),
}

pub type Result<T> = std::result::Result<T, CoreError>;
