//! Errors reported by the task stores.

use thiserror::Error;

use crate::task::TaskId;

pub type StoreResult<T> = Result<T, StoreError>;

/// Failures of a task store. A store that returns one of these has not
/// applied the requested change.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Local storage could not be read or written
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Stored or received data is not valid task JSON
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The request never produced a response
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status
    #[error("{message} (HTTP {status})")]
    Api { status: u16, message: String },

    /// Missing or rejected bearer token
    #[error("not logged in or session expired; run `justdoit login`")]
    Unauthorized,

    #[error("task not found: {0}")]
    NotFound(TaskId),

    /// The task data failed validation before reaching the store
    #[error("invalid task: {0}")]
    InvalidInput(String),
}
