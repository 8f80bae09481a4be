//! Error types for orchestrator queries.

use thiserror::Error;

/// Result type alias for orchestrator queries.
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

/// Errors returned by an orchestrator query.
///
/// All variants are transport-level failures from the caller's point of
/// view: blocking loops log them and retry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OrchestratorError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
}
