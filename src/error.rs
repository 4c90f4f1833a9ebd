use thiserror::Error;

use crate::state_machine::ProcessStatus;

/// Failures of the persistence layer. Propagated unchanged by the engine.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Store lock poisoned")]
    Poisoned,
}

/// Outcome of a rejected engine operation. Every variant is scoped to the
/// single invocation and leaves the store untouched.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Process not found: {0}")]
    NotFound(String),

    #[error("Admin access required for {}", .fields.join(", "))]
    Forbidden { fields: Vec<String> },

    #[error("Invalid {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Cannot {action} a process that is {status}")]
    InvalidTransition {
        action: &'static str,
        status: ProcessStatus,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

impl EngineError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        EngineError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Short machine-readable tag, used in logs and error bodies.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::NotFound(_) => ErrorKind::NotFound,
            EngineError::Forbidden { .. } => ErrorKind::Forbidden,
            EngineError::Validation { .. } => ErrorKind::Validation,
            EngineError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            EngineError::Storage(_) => ErrorKind::Storage,
        }
    }
}

/// Classifies an engine failure for callers that map it to a transport signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    NotFound,
    Forbidden,
    Validation,
    InvalidTransition,
    Storage,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::NotFound => write!(f, "not_found"),
            ErrorKind::Forbidden => write!(f, "forbidden"),
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::InvalidTransition => write!(f, "invalid_transition"),
            ErrorKind::Storage => write!(f, "storage"),
        }
    }
}
