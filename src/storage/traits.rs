//! Abstract settings storage trait.
//!
//! The host owns where settings live. The engine only needs to load the
//! record once at startup and write it back after each mutation.

use thiserror::Error;

use crate::config::Settings;
use crate::error::{ExecutionError, StreamRegexError};

/// Errors that can occur during settings storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Backend I/O failed.
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stored record could not be (de)serialized.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Backend error.
    #[error("Storage backend error: {0}")]
    BackendError(String),
}

impl From<StorageError> for StreamRegexError {
    fn from(err: StorageError) -> Self {
        Self::Execution(ExecutionError::Storage {
            message: err.to_string(),
        })
    }
}

/// Storage trait for the settings record.
///
/// Implementations must be safe to call from the saver worker thread.
pub trait SettingsStore: Send + Sync {
    /// Load the settings record. A store with nothing saved yet returns defaults.
    fn load(&self) -> Result<Settings, StorageError>;

    /// Replace the stored record.
    fn save(&self, settings: &Settings) -> Result<(), StorageError>;
}
