//! Rule service: owns the live rule set and its persistence.
//!
//! Readers take an `Arc<RuleSet>` snapshot, so evaluation on a writer's
//! thread never waits on a command beyond the pointer swap. Mutations apply to
//! a copy which replaces the snapshot only on success.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use tracing::info;

use crate::config::Settings;
use crate::error::{StreamRegexError, StreamRegexResult};
use crate::rule::{AutomationId, Rule, RuleId};
use crate::rule_set::RuleSet;
use crate::storage::{DebouncedSaver, SettingsStore};

/// The configuration service instance shared by the command surface and the
/// stream watcher.
#[derive(Debug)]
pub struct RuleService {
    rules: RwLock<Arc<RuleSet>>,
    saver: DebouncedSaver,
}

impl RuleService {
    /// Loads settings from `store` and starts the debounced saver.
    pub fn open(store: Arc<dyn SettingsStore>, save_debounce: Duration) -> StreamRegexResult<Self> {
        let settings = store.load()?;
        info!(rules = settings.regex_list.len(), "stream regex settings loaded");

        let saver = DebouncedSaver::start(store, save_debounce)?;
        Ok(Self {
            rules: RwLock::new(Arc::new(settings.regex_list)),
            saver,
        })
    }

    /// Adds a rule. See [`RuleSet::add`].
    pub fn add(
        &self,
        id: Option<RuleId>,
        pattern: &str,
        automation_id: AutomationId,
    ) -> StreamRegexResult<RuleId> {
        self.mutate(|rules| rules.add(id, pattern, automation_id))
    }

    /// Updates a rule. See [`RuleSet::update`].
    pub fn update(
        &self,
        id: &RuleId,
        pattern: Option<&str>,
        automation_id: Option<AutomationId>,
    ) -> StreamRegexResult<RuleId> {
        self.mutate(|rules| rules.update(id, pattern, automation_id))
    }

    /// Deletes a rule. See [`RuleSet::delete`].
    pub fn delete(&self, id: &RuleId) -> StreamRegexResult<RuleId> {
        self.mutate(|rules| rules.delete(id))
    }

    /// All rules in evaluation order.
    pub fn list(&self) -> StreamRegexResult<Vec<Rule>> {
        Ok(self.snapshot()?.list().to_vec())
    }

    /// The rule list serialized as a JSON array.
    pub fn list_json(&self) -> StreamRegexResult<String> {
        let snapshot = self.snapshot()?;
        serde_json::to_string(snapshot.list())
            .map_err(|e| StreamRegexError::internal(format!("failed to serialize rules: {e}")))
    }

    /// The current rule set.
    pub fn snapshot(&self) -> StreamRegexResult<Arc<RuleSet>> {
        let guard = self
            .rules
            .read()
            .map_err(|_| StreamRegexError::internal("poisoned lock: rules.read"))?;
        Ok(Arc::clone(&guard))
    }

    /// Writes any pending settings now.
    pub fn flush(&self) -> StreamRegexResult<()> {
        self.saver.flush()
    }

    /// The settings saver, for inspecting save counters.
    #[must_use]
    pub const fn saver(&self) -> &DebouncedSaver {
        &self.saver
    }

    fn mutate<T>(
        &self,
        op: impl FnOnce(&mut RuleSet) -> StreamRegexResult<T>,
    ) -> StreamRegexResult<T> {
        let mut guard = self
            .rules
            .write()
            .map_err(|_| StreamRegexError::internal("poisoned lock: rules.write"))?;

        let mut next = RuleSet::clone(&guard);
        let out = op(&mut next)?;

        self.saver.schedule(Settings::new(next.clone()));
        *guard = Arc::new(next);
        Ok(out)
    }
}
