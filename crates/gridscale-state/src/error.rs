//! Error types for the state core.

use thiserror::Error;

/// Result type alias for state operations.
pub type StateResult<T> = Result<T, StateError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StateError {
    /// The job's watcher stopped before completing its first load.
    #[error("status watcher for job {job_id} ended before its first update")]
    WatcherEnded { job_id: String },

    #[error("invalid configuration: {0}")]
    Config(String),
}
