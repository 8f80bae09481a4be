//! Error types for policy loading.

use std::fmt;

use gridscale_orchestrator::OrchestratorError;
use thiserror::Error;

/// Result type alias for policy operations.
pub type PolicyResult<T> = Result<T, PolicyError>;

/// A single malformed or missing field in a raw policy document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// Path of the field, e.g. `strategy[0].min`.
    pub field: String,
    pub reason: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

/// Every field error found while decoding one policy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
    pub fn push(&mut self, field: impl Into<String>, reason: impl Into<String>) {
        self.0.push(FieldError::new(field, reason));
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.0.iter()
    }

    /// Whether any error was reported for `field`.
    pub fn has_field(&self, field: &str) -> bool {
        self.0.iter().any(|e| e.field == field)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

/// Errors returned by a policy source.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PolicyError {
    /// The raw document is malformed. Reported per policy; other policies
    /// are unaffected.
    #[error("failed to parse policy {id}: {errors}")]
    Validation { id: String, errors: ValidationErrors },

    /// The orchestrator could not be queried.
    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),
}

impl PolicyError {
    pub fn validation(id: &str, errors: ValidationErrors) -> Self {
        PolicyError::Validation {
            id: id.to_string(),
            errors,
        }
    }

    /// Field errors of a validation failure, if this is one.
    pub fn field_errors(&self) -> Option<&ValidationErrors> {
        match self {
            PolicyError::Validation { errors, .. } => Some(errors),
            PolicyError::Orchestrator(_) => None,
        }
    }
}
