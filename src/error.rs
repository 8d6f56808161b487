//! Domain error types for the randomizer core.
//!
//! Orchestration code (loaders, the CLI, the dispatcher boundary) uses `anyhow` and attaches
//! context. The variants here name the failures callers may want to match on.

use std::io;
use thiserror::Error;

/// Main error type for randomizer operations.
#[derive(Error, Debug)]
pub enum RandomizerError {
    /// No action with the given name is registered.
    #[error("no action found with name '{0}'")]
    ActionNotFound(String),

    /// The key of an action cannot be mapped to an input.
    #[error("invalid key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    /// The input injector failed to synthesize an input.
    #[error("input injection failed for '{input}': {reason}")]
    Injector { input: String, reason: String },

    /// The sequence store rejected an operation.
    #[error("persistence of sequence '{name}' failed: {reason}")]
    Persistence { name: String, reason: String },

    /// The executor was started twice.
    #[error("executor is already running")]
    AlreadyRunning,

    /// The executor's background runtime could not be created.
    #[error("executor runtime error: {0}")]
    Runtime(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for randomizer operations.
pub type Result<T> = std::result::Result<T, RandomizerError>;

impl RandomizerError {
    /// Create a new InvalidKey error.
    pub fn invalid_key(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create a new Injector error.
    pub fn injector(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Injector {
            input: input.into(),
            reason: reason.into(),
        }
    }

    /// Create a new Persistence error.
    pub fn persistence(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Persistence {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RandomizerError::ActionNotFound("Jump".into());
        assert_eq!(err.to_string(), "no action found with name 'Jump'");

        let err = RandomizerError::invalid_key("HYPER", "unknown key");
        assert_eq!(err.to_string(), "invalid key 'HYPER': unknown key");

        let err = RandomizerError::persistence("Peek", "disk full");
        assert_eq!(
            err.to_string(),
            "persistence of sequence 'Peek' failed: disk full"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: RandomizerError = io_err.into();
        assert!(matches!(err, RandomizerError::Io(_)));
    }
}
