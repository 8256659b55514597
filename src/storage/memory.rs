//! In-memory settings store.
//!
//! Intended for embedded usage and tests. Keeps the record as serialized JSON
//! so a load always goes through the same decode path as a file.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use crate::config::Settings;
use crate::storage::traits::{SettingsStore, StorageError};

fn lock_err(context: &'static str) -> StorageError {
    StorageError::BackendError(format!("poisoned lock: {context}"))
}

/// Thread-safe in-memory [`SettingsStore`].
#[derive(Debug, Default)]
pub struct InMemorySettingsStore {
    record: RwLock<Option<String>>,
    saves: AtomicU64,
}

impl InMemorySettingsStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store preloaded with a raw JSON record.
    #[must_use]
    pub fn with_record(json: impl Into<String>) -> Self {
        Self {
            record: RwLock::new(Some(json.into())),
            saves: AtomicU64::new(0),
        }
    }

    /// The last saved raw JSON record, if any.
    pub fn record(&self) -> Result<Option<String>, StorageError> {
        let guard = self.record.read().map_err(|_| lock_err("settings.read"))?;
        Ok(guard.clone())
    }

    /// Number of completed saves.
    #[must_use]
    pub fn save_count(&self) -> u64 {
        self.saves.load(Ordering::Relaxed)
    }
}

impl SettingsStore for InMemorySettingsStore {
    fn load(&self) -> Result<Settings, StorageError> {
        let guard = self.record.read().map_err(|_| lock_err("settings.load"))?;
        match guard.as_deref() {
            None => Ok(Settings::default()),
            Some(json) => serde_json::from_str(json)
                .map_err(|e| StorageError::SerializationError(e.to_string())),
        }
    }

    fn save(&self, settings: &Settings) -> Result<(), StorageError> {
        let json = serde_json::to_string(settings)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;
        let mut guard = self.record.write().map_err(|_| lock_err("settings.save"))?;
        *guard = Some(json);
        self.saves.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
