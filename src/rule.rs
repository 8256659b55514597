//! Rule types: a compiled pattern bound to an automation identifier.
//!
//! Rules are written by users as `/body/flags` and persisted as a
//! `{source, flags}` pair. The compiled form is never serialized.

use std::fmt;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Compiled program size limit for a single rule pattern.
///
/// Evaluation runs inline with the host's write, so pathological patterns are
/// rejected at add/update time instead.
const COMPILED_SIZE_LIMIT: usize = 1 << 20;

/// Unique identifier for a rule.
///
/// Caller supplied or a random UUID v4 rendered as a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(String);

impl RuleId {
    /// Creates a new random rule id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RuleId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RuleId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RuleId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Opaque automation identifier, meaningful only to the automation subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AutomationId(String);

impl AutomationId {
    /// Wraps an automation identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AutomationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AutomationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for AutomationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// The serializable form of a pattern: body source plus flag letters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PatternSpec {
    /// Pattern body, exactly as written between the delimiters.
    pub source: String,
    /// Flag letters, exactly as written after the closing delimiter.
    #[serde(default)]
    pub flags: String,
}

impl PatternSpec {
    /// Creates a spec from a body and flags without validating it.
    #[must_use]
    pub fn new(source: impl Into<String>, flags: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            flags: flags.into(),
        }
    }

    /// Parses a `/body/flags` literal.
    ///
    /// The body runs up to the last `/`; everything after it must be
    /// lowercase ASCII letters.
    pub fn parse(literal: &str) -> Result<Self, ValidationError> {
        let invalid = |reason: &str| ValidationError::InvalidPattern {
            spec: literal.to_string(),
            reason: reason.to_string(),
        };

        let Some(rest) = literal.strip_prefix('/') else {
            return Err(invalid("expected the form /matcher/flags"));
        };
        let Some(close) = rest.rfind('/') else {
            return Err(invalid("missing closing '/'"));
        };

        let (source, flags) = (&rest[..close], &rest[close + 1..]);
        if source.is_empty() {
            return Err(invalid("pattern body is empty"));
        }
        if !flags.bytes().all(|b| b.is_ascii_lowercase()) {
            return Err(invalid("flags must be lowercase letters"));
        }

        Ok(Self::new(source, flags))
    }

    /// Compiles this spec into a matcher.
    pub fn compile(&self) -> Result<Regex, ValidationError> {
        let flags = PatternFlags::parse(&self.flags).map_err(|reason| {
            ValidationError::InvalidPattern {
                spec: self.to_string(),
                reason,
            }
        })?;

        RegexBuilder::new(&self.source)
            .case_insensitive(flags.case_insensitive)
            .multi_line(flags.multi_line)
            .dot_matches_new_line(flags.dot_all)
            .size_limit(COMPILED_SIZE_LIMIT)
            .build()
            .map_err(|e| ValidationError::InvalidPattern {
                spec: self.to_string(),
                reason: e.to_string(),
            })
    }
}

impl fmt::Display for PatternSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}", self.source, self.flags)
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct PatternFlags {
    case_insensitive: bool,
    multi_line: bool,
    dot_all: bool,
}

impl PatternFlags {
    fn parse(flags: &str) -> Result<Self, String> {
        let mut out = Self::default();
        let mut seen = String::with_capacity(flags.len());

        for c in flags.chars() {
            if seen.contains(c) {
                return Err(format!("flag '{c}' is repeated"));
            }
            seen.push(c);

            match c {
                'i' => out.case_insensitive = true,
                'm' => out.multi_line = true,
                's' => out.dot_all = true,
                // Unicode is always on; global/indices do not affect an unanchored test.
                'u' | 'v' | 'g' | 'd' => {}
                'y' => return Err("sticky flag 'y' is not supported".to_string()),
                other => return Err(format!("unknown flag '{other}'")),
            }
        }

        if seen.contains('u') && seen.contains('v') {
            return Err("flags 'u' and 'v' cannot be combined".to_string());
        }

        Ok(out)
    }
}

/// A validated, compiled pattern together with its source spec.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "PatternSpec", into = "PatternSpec")]
pub struct RulePattern {
    spec: PatternSpec,
    regex: Regex,
}

impl RulePattern {
    /// Validates and compiles a spec.
    pub fn new(spec: PatternSpec) -> Result<Self, ValidationError> {
        let regex = spec.compile()?;
        Ok(Self { spec, regex })
    }

    /// Parses and compiles a `/body/flags` literal.
    pub fn parse(literal: &str) -> Result<Self, ValidationError> {
        Self::new(PatternSpec::parse(literal)?)
    }

    /// Returns true if the pattern matches anywhere in `text`.
    #[must_use]
    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    /// The serializable spec.
    #[must_use]
    pub const fn spec(&self) -> &PatternSpec {
        &self.spec
    }
}

impl PartialEq for RulePattern {
    fn eq(&self, other: &Self) -> bool {
        self.spec == other.spec
    }
}

impl Eq for RulePattern {}

impl TryFrom<PatternSpec> for RulePattern {
    type Error = ValidationError;

    fn try_from(spec: PatternSpec) -> Result<Self, Self::Error> {
        Self::new(spec)
    }
}

impl From<RulePattern> for PatternSpec {
    fn from(pattern: RulePattern) -> Self {
        pattern.spec
    }
}

impl fmt::Display for RulePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.spec.fmt(f)
    }
}

/// A rule: when `pattern` matches the streamed text, `automation_id` fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// Unique id within the rule set.
    pub id: RuleId,
    /// Compiled pattern, serialized as `{source, flags}`.
    #[serde(rename = "regex")]
    pub pattern: RulePattern,
    /// Automation to trigger on match.
    #[serde(rename = "automationId")]
    pub automation_id: AutomationId,
}

impl Rule {
    /// Creates a rule from already validated parts.
    #[must_use]
    pub fn new(id: RuleId, pattern: RulePattern, automation_id: AutomationId) -> Self {
        Self {
            id,
            pattern,
            automation_id,
        }
    }
}
