//! Rule matching against a text snapshot.
//!
//! Evaluation is pure and runs on the writer's call stack, once per write.

use serde::{Deserialize, Serialize};

use crate::rule::AutomationId;
use crate::rule_set::RuleSet;

/// One matched rule, as carried by a notification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Match {
    #[serde(rename = "automationId")]
    pub automation_id: AutomationId,
}

impl Match {
    #[must_use]
    pub fn new(automation_id: AutomationId) -> Self {
        Self { automation_id }
    }
}

/// Returns one [`Match`] per rule whose pattern matches anywhere in `text`.
///
/// Order follows the rule set. Rules sharing an automation id each produce a
/// match; nothing is deduplicated.
#[must_use]
pub fn evaluate(text: &str, rules: &RuleSet) -> Vec<Match> {
    rules
        .iter()
        .filter(|rule| rule.pattern.is_match(text))
        .map(|rule| Match::new(rule.automation_id.clone()))
        .collect()
}
