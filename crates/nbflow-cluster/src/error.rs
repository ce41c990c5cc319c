//! Provider error types.

use std::fmt;
use thiserror::Error;

/// Resource addressed by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Machine,
    Volume,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Machine => write!(f, "machine"),
            ResourceKind::Volume => write!(f, "volume"),
        }
    }
}

/// Errors returned by cluster providers.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// No resource with that exact name exists.
    #[error("{kind} not found: {name}")]
    NotFound { kind: ResourceKind, name: String },

    /// Several resources share the name.
    #[error("{count} {kind}s named {name}")]
    Ambiguous {
        kind: ResourceKind,
        name: String,
        count: usize,
    },

    /// Cloud API rejected the call or the operation finished with errors.
    #[error("Cloud API error: {0}")]
    Api(String),

    /// Authentication error
    #[error("Authentication error: {0}")]
    Auth(String),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(String),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ProviderError {
    pub fn not_found(kind: ResourceKind, name: impl Into<String>) -> Self {
        ProviderError::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ProviderError::NotFound { .. })
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        ProviderError::Http(e.to_string())
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(e: serde_json::Error) -> Self {
        ProviderError::Json(e.to_string())
    }
}

impl From<envy::Error> for ProviderError {
    fn from(e: envy::Error) -> Self {
        ProviderError::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProviderError::not_found(ResourceKind::Volume, "data-1");
        assert_eq!(err.to_string(), "volume not found: data-1");
        assert!(err.is_not_found());

        let err = ProviderError::Ambiguous {
            kind: ResourceKind::Machine,
            name: "vm".to_string(),
            count: 2,
        };
        assert_eq!(err.to_string(), "2 machines named vm");
    }
}
