//! Error types for stream-regex.
//!
//! All errors are strongly typed using thiserror so callers of the command
//! surface can match on specific conditions. The watcher never returns these
//! to anyone; it logs and discards them.

use std::any::Any;

use thiserror::Error;

/// Validation errors raised before any state is touched.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid pattern '{spec}': {reason}")]
    InvalidPattern {
        spec: String,
        reason: String,
    },

    #[error("Required argument '{name}' is missing")]
    MissingArgument {
        name: String,
    },

    #[error("Unknown argument '{name}'")]
    UnknownArgument {
        name: String,
    },

    #[error("Unknown command '{name}'")]
    UnknownCommand {
        name: String,
    },

    #[error("Malformed command line: {reason}")]
    MalformedCommand {
        reason: String,
    },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        reason: String,
    },
}

/// Execution errors raised while applying an operation.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("A regex with this ID already exists: {id}")]
    DuplicateId {
        id: String,
    },

    #[error("A regex with this ID does not exist: {id}")]
    NotFound {
        id: String,
    },

    #[error("Evaluation failed: {reason}")]
    TransientEvaluation {
        reason: String,
    },

    #[error("Storage error: {message}")]
    Storage {
        message: String,
    },

    #[error("Channel disconnected: {path}")]
    Disconnected {
        path: String,
    },

    #[error("Operation timed out after {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },
}

/// Top-level error type for stream-regex.
#[derive(Debug, Error)]
pub enum StreamRegexError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    /// An error surfaced by a named command, prefixed with the command name.
    #[error("/{command}: {source}")]
    Command {
        command: String,
        #[source]
        source: Box<StreamRegexError>,
    },

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl StreamRegexError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates a storage error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Execution(ExecutionError::Storage {
            message: message.into(),
        })
    }

    /// Converts a caught panic payload into a transient evaluation error.
    #[must_use]
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let reason = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "panic with non-string payload".to_string());
        Self::Execution(ExecutionError::TransientEvaluation { reason })
    }

    /// Wraps this error with the name of the command that produced it.
    #[must_use]
    pub fn in_command(self, command: impl Into<String>) -> Self {
        Self::Command {
            command: command.into(),
            source: Box::new(self),
        }
    }

    /// Strips any command wrapper and returns the underlying error.
    #[must_use]
    pub fn root(&self) -> &Self {
        match self {
            Self::Command { source, .. } => source.root(),
            other => other,
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self.root(), Self::Validation(_))
    }

    /// Returns true if this is an execution error.
    #[must_use]
    pub fn is_execution(&self) -> bool {
        matches!(self.root(), Self::Execution(_))
    }

    /// Returns true if this is an internal error.
    #[must_use]
    pub fn is_internal(&self) -> bool {
        matches!(self.root(), Self::Internal { .. })
    }

    /// Returns true if this is an invalid pattern error.
    #[must_use]
    pub fn is_invalid_pattern(&self) -> bool {
        matches!(
            self.root(),
            Self::Validation(ValidationError::InvalidPattern { .. })
        )
    }

    /// Returns true if this is a duplicate id error.
    #[must_use]
    pub fn is_duplicate_id(&self) -> bool {
        matches!(self.root(), Self::Execution(ExecutionError::DuplicateId { .. }))
    }

    /// Returns true if this is a not-found error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), Self::Execution(ExecutionError::NotFound { .. }))
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self.root() {
            Self::Execution(e) => matches!(
                e,
                ExecutionError::Timeout { .. } | ExecutionError::Storage { .. }
            ),
            _ => false,
        }
    }
}

/// Result type alias for stream-regex operations.
pub type StreamRegexResult<T> = Result<T, StreamRegexError>;
