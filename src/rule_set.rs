//! Ordered rule collection with CRUD semantics.
//!
//! Insertion order is evaluation order. Every operation validates fully before
//! mutating, so a failed call leaves the set exactly as it was.

use serde::{Deserialize, Serialize};

use crate::error::{ExecutionError, StreamRegexResult, ValidationError};
use crate::rule::{AutomationId, Rule, RuleId, RulePattern};

/// An ordered set of rules with unique ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Rule>", into = "Vec<Rule>")]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    /// Creates an empty rule set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a new rule and returns its id.
    ///
    /// # Errors
    /// - `DuplicateId` if `id` (explicit or generated) is already present
    /// - `InvalidPattern` if `pattern` is not a valid `/body/flags` literal
    pub fn add(
        &mut self,
        id: Option<RuleId>,
        pattern: &str,
        automation_id: AutomationId,
    ) -> StreamRegexResult<RuleId> {
        let id = id.unwrap_or_default();
        if self.contains(&id) {
            return Err(ExecutionError::DuplicateId { id: id.to_string() }.into());
        }

        let pattern = RulePattern::parse(pattern)?;
        self.rules.push(Rule::new(id.clone(), pattern, automation_id));
        Ok(id)
    }

    /// Updates the supplied fields of an existing rule in place.
    ///
    /// # Errors
    /// - `NotFound` if no rule has this id
    /// - `InvalidPattern` if a new pattern is supplied and does not compile
    pub fn update(
        &mut self,
        id: &RuleId,
        pattern: Option<&str>,
        automation_id: Option<AutomationId>,
    ) -> StreamRegexResult<RuleId> {
        let idx = self.position(id)?;
        let pattern = pattern.map(RulePattern::parse).transpose()?;

        let rule = &mut self.rules[idx];
        if let Some(pattern) = pattern {
            rule.pattern = pattern;
        }
        if let Some(automation_id) = automation_id {
            rule.automation_id = automation_id;
        }
        Ok(rule.id.clone())
    }

    /// Removes a rule and returns its id.
    ///
    /// # Errors
    /// - `NotFound` if no rule has this id
    pub fn delete(&mut self, id: &RuleId) -> StreamRegexResult<RuleId> {
        let idx = self.position(id)?;
        Ok(self.rules.remove(idx).id)
    }

    /// All rules in evaluation order.
    #[must_use]
    pub fn list(&self) -> &[Rule] {
        &self.rules
    }

    /// Looks up a rule by id.
    #[must_use]
    pub fn get(&self, id: &RuleId) -> Option<&Rule> {
        self.rules.iter().find(|r| &r.id == id)
    }

    /// Returns true if a rule with this id exists.
    #[must_use]
    pub fn contains(&self, id: &RuleId) -> bool {
        self.get(id).is_some()
    }

    /// Iterates rules in evaluation order.
    pub fn iter(&self) -> std::slice::Iter<'_, Rule> {
        self.rules.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    fn position(&self, id: &RuleId) -> StreamRegexResult<usize> {
        self.rules
            .iter()
            .position(|r| &r.id == id)
            .ok_or_else(|| ExecutionError::NotFound { id: id.to_string() }.into())
    }
}

impl<'a> IntoIterator for &'a RuleSet {
    type Item = &'a Rule;
    type IntoIter = std::slice::Iter<'a, Rule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}

impl TryFrom<Vec<Rule>> for RuleSet {
    type Error = ValidationError;

    fn try_from(rules: Vec<Rule>) -> Result<Self, Self::Error> {
        for (i, rule) in rules.iter().enumerate() {
            if rules[..i].iter().any(|r| r.id == rule.id) {
                return Err(ValidationError::InvalidConfig {
                    reason: format!("duplicate rule id in regexList: {}", rule.id),
                });
            }
        }
        Ok(Self { rules })
    }
}

impl From<RuleSet> for Vec<Rule> {
    fn from(set: RuleSet) -> Self {
        set.rules
    }
}
