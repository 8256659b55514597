//! Runtime configuration and the persisted settings record.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::rule_set::RuleSet;

/// Default delay between watcher polls.
///
/// Bounds the latency between a generation flag flip and the wrapper being
/// installed or removed.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default quiet period before a pending settings save is written.
pub const DEFAULT_SAVE_DEBOUNCE: Duration = Duration::from_millis(500);

/// The persisted settings record.
///
/// Serialized as `{ "regexList": [ {id, regex: {source, flags}, automationId} ] }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Rules in evaluation order.
    #[serde(default)]
    pub regex_list: RuleSet,
}

impl Settings {
    /// Creates settings holding the given rules.
    #[must_use]
    pub fn new(regex_list: RuleSet) -> Self {
        Self { regex_list }
    }
}

/// Stream watcher configuration.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Delay between polls of the generation flag and buffer length.
    pub poll_interval: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Notification bus configuration.
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Per-subscriber buffered event capacity.
    pub stream_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            stream_capacity: 1024,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub watcher: WatcherConfig,
    pub bus: BusConfig,
    /// Quiet period before a settings save is written.
    pub save_debounce: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            watcher: WatcherConfig::default(),
            bus: BusConfig::default(),
            save_debounce: DEFAULT_SAVE_DEBOUNCE,
        }
    }
}

impl EngineConfig {
    /// Rejects configurations that would spin or deadlock.
    pub fn validate(self) -> Result<Self, ValidationError> {
        if self.watcher.poll_interval.is_zero() {
            return Err(ValidationError::InvalidConfig {
                reason: "poll_interval must be greater than zero".to_string(),
            });
        }
        if self.bus.stream_capacity == 0 {
            return Err(ValidationError::InvalidConfig {
                reason: "stream_capacity must be at least 1".to_string(),
            });
        }
        Ok(self)
    }
}
