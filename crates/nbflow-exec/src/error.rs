//! Execution error types.
//!
//! Only fatal conditions live here. A notebook that fails while running, or a
//! container that exits non-zero, is reported through
//! [`ExecutionResult`](crate::result::ExecutionResult) instead.

use thiserror::Error;

/// Errors that abort an execution before a result exists.
#[derive(Debug, Error)]
pub enum ExecError {
    /// Identity string without a `firm.` namespace, or with an unknown firm.
    #[error("Malformed identity: {0}")]
    MalformedIdentity(String),

    /// Task or project definition is missing a required field.
    #[error("Invalid task definition: {0}")]
    InvalidTaskDefinition(String),

    /// Precondition outside the unit of work's control (credentials, engine binary).
    #[error("Setup error: {0}")]
    Setup(String),

    /// Project service call failed.
    #[error("Client error: {0}")]
    Client(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(String),
}

impl ExecError {
    /// Returns true for errors the caller must treat as "do not register".
    pub fn is_setup(&self) -> bool {
        matches!(
            self,
            ExecError::Setup(_)
                | ExecError::InvalidTaskDefinition(_)
                | ExecError::MalformedIdentity(_)
        )
    }
}

impl From<std::io::Error> for ExecError {
    fn from(e: std::io::Error) -> Self {
        ExecError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for ExecError {
    fn from(e: serde_json::Error) -> Self {
        ExecError::Json(e.to_string())
    }
}

impl From<reqwest::Error> for ExecError {
    fn from(e: reqwest::Error) -> Self {
        ExecError::Client(e.to_string())
    }
}
