//! Error taxonomy shared by every workspace component.
//!
//! Write conflicts are not errors. They are [`crate::concurrency::WriteOutcome::Conflict`].

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkspaceError {
    /// The path was rejected by the sandbox.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("document not found: {0}")]
    NotFound(String),

    /// The embedding provider failed, timed out, or returned garbage.
    #[error("embedding provider error: {0}")]
    Provider(String),

    #[error("semantic search is disabled")]
    EmbeddingsDisabled,

    /// A full crawl is in progress; results may be partial.
    #[error("index unavailable: crawl in progress")]
    IndexUnavailable,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl WorkspaceError {
    /// Maps an IO error on a known path, turning `ENOENT` into [`WorkspaceError::NotFound`].
    pub fn from_io(path: &str, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            WorkspaceError::NotFound(path.to_string())
        } else {
            WorkspaceError::Io(err)
        }
    }
}

pub type Result<T> = std::result::Result<T, WorkspaceError>;
