//! Policy rules
//!
//! A [`RuleSet`] maps unit-of-work identifiers to rules. Each rule names a
//! target (an argument path for input rules, a state path for output
//! rules), the checks to run, a severity and an optional threshold.
//!
//! ```toml
//! [[units.pay]]
//! target = "amount"
//! severity = "block"
//! threshold = 3
//! checks = { min = 0, max = 10000 }
//!
//! [[units.pay]]
//! target = "domain.ledger.memo"
//! phase = "output"
//! severity = "count"
//! checks = { max_len = 140, pattern = "^[ -~]*$" }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use warden_core::{Error, Result};

/// How a violation escalates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Raise `AuditStop` immediately
    Stop,
    /// Raise `AuditAbort` immediately
    Abort,
    /// Raise `AuditBlock` once the violation counter reaches the threshold
    Block,
    /// Count and log, never raise
    Count,
}

impl Severity {
    /// Violations needed before this severity raises.
    pub fn default_threshold(&self) -> u32 {
        match self {
            Severity::Block => 3,
            Severity::Stop | Severity::Abort | Severity::Count => 1,
        }
    }

    /// Lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Stop => "stop",
            Severity::Abort => "abort",
            Severity::Block => "block",
            Severity::Count => "count",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// When a rule is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RulePhase {
    /// Against bound arguments, before the unit runs
    #[default]
    Input,
    /// Against pending writes, before commit
    Output,
}

impl RulePhase {
    /// Lowercase name, as written in rule files.
    pub fn as_str(&self) -> &'static str {
        match self {
            RulePhase::Input => "input",
            RulePhase::Output => "output",
        }
    }
}

/// Checks applied to a target value. Unset checks are skipped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Checks {
    /// Inclusive numeric lower bound
    pub min: Option<f64>,
    /// Inclusive numeric upper bound
    pub max: Option<f64>,
    /// Minimum length (chars, bytes or elements)
    pub min_len: Option<usize>,
    /// Maximum length (chars, bytes or elements)
    pub max_len: Option<usize>,
    /// Regular expression a string must match
    pub pattern: Option<String>,
}

/// One declarative rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Dot-separated target path
    pub target: String,
    /// Evaluation phase
    #[serde(default)]
    pub phase: RulePhase,
    /// Checks to run
    #[serde(default)]
    pub checks: Checks,
    /// Escalation on violation
    pub severity: Severity,
    /// Threshold override for Block severity
    #[serde(default)]
    pub threshold: Option<u32>,
}

impl Rule {
    /// Input rule with no checks yet.
    pub fn new(target: impl Into<String>, severity: Severity) -> Self {
        Rule {
            target: target.into(),
            phase: RulePhase::Input,
            checks: Checks::default(),
            severity,
            threshold: None,
        }
    }

    /// Evaluate against pending writes instead of arguments.
    pub fn output(mut self) -> Self {
        self.phase = RulePhase::Output;
        self
    }

    /// Inclusive lower bound.
    pub fn min(mut self, min: f64) -> Self {
        self.checks.min = Some(min);
        self
    }

    /// Inclusive upper bound.
    pub fn max(mut self, max: f64) -> Self {
        self.checks.max = Some(max);
        self
    }

    /// Minimum length.
    pub fn min_len(mut self, len: usize) -> Self {
        self.checks.min_len = Some(len);
        self
    }

    /// Maximum length.
    pub fn max_len(mut self, len: usize) -> Self {
        self.checks.max_len = Some(len);
        self
    }

    /// Pattern a string must match.
    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.checks.pattern = Some(pattern.into());
        self
    }

    /// Threshold override.
    pub fn threshold(mut self, threshold: u32) -> Self {
        self.threshold = Some(threshold);
        self
    }

    /// Threshold in effect (never below 1).
    pub fn effective_threshold(&self) -> u32 {
        self.threshold
            .unwrap_or_else(|| self.severity.default_threshold())
            .max(1)
    }
}

/// Rules keyed by unit-of-work identifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleSet {
    units: BTreeMap<String, Vec<Rule>>,
}

impl RuleSet {
    /// Empty rule set: every unit skips validation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from TOML.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::config(format!("invalid rule set: {}", e)))
    }

    /// Parse from JSON.
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::config(format!("invalid rule set: {}", e)))
    }

    /// Add a rule for `unit`.
    pub fn rule(mut self, unit: impl Into<String>, rule: Rule) -> Self {
        self.units.entry(unit.into()).or_default().push(rule);
        self
    }

    /// Rules for `unit`, empty when none are registered.
    pub fn rules_for(&self, unit: &str) -> &[Rule] {
        self.units.get(unit).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Units with at least one rule.
    pub fn units(&self) -> impl Iterator<Item = &str> {
        self.units.keys().map(String::as_str)
    }

    /// Total rule count.
    pub fn len(&self) -> usize {
        self.units.values().map(Vec::len).sum()
    }

    /// True when no rules are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
