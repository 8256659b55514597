//! Settings persistence.
//!
//! The trait defines the boundary with the host's configuration storage;
//! in-memory and JSON file backends are provided, plus the debounced writer
//! used after every mutating command.

mod debounce;
mod file;
mod memory;
mod traits;

pub use debounce::DebouncedSaver;
pub use file::JsonFileSettingsStore;
pub use memory::InMemorySettingsStore;
pub use traits::{SettingsStore, StorageError};
