//! Policy validation
//!
//! ## Severity state machine
//!
//! Every `unit/phase/target` key owns a violation counter that persists
//! across calls, so an input rule and an output rule on the same target
//! count separately. On a violation the counter is incremented, then:
//!
//! | Severity | Effect |
//! |----------|--------|
//! | Stop | raise `AuditStop` |
//! | Abort | raise `AuditAbort` |
//! | Block | raise `AuditBlock` once the counter reaches the threshold, then reset it |
//! | Count | log only |
//!
//! With `reset_on_success` a passing evaluation zeroes the key's counter;
//! without it only a Block firing resets, so intermittent violations
//! accumulate.
//!
//! A unit with no rules skips validation entirely.

use crate::rule::{Rule, RulePhase, RuleSet, Severity};
use parking_lot::Mutex;
use regex::Regex;
use rustc_hash::FxHashMap;
use tracing::{debug, warn};
use warden_core::delta::apply_all;
use warden_core::{Delta, Error, Path, Result, Value};

struct CompiledRule {
    rule: Rule,
    segments: Vec<String>,
    target: Option<Path>,
    pattern: Option<Regex>,
}

/// Evaluates rule sets and tracks violation counters.
pub struct PolicyValidator {
    rules: FxHashMap<String, Vec<CompiledRule>>,
    counters: Mutex<FxHashMap<String, u32>>,
    reset_on_success: bool,
}

impl PolicyValidator {
    /// Compile a rule set. Fails on an invalid pattern or output target.
    pub fn new(rules: &RuleSet, reset_on_success: bool) -> Result<Self> {
        let mut compiled: FxHashMap<String, Vec<CompiledRule>> = FxHashMap::default();
        for unit in rules.units() {
            let mut list = Vec::new();
            for rule in rules.rules_for(unit) {
                let pattern = match &rule.checks.pattern {
                    Some(p) => Some(Regex::new(p).map_err(|e| {
                        Error::config(format!("rule {}/{}: invalid pattern: {}", unit, rule.target, e))
                    })?),
                    None => None,
                };
                let target = match rule.phase {
                    RulePhase::Output => Some(rule.target.parse::<Path>()?),
                    RulePhase::Input => None,
                };
                list.push(CompiledRule {
                    segments: rule.target.split('.').map(String::from).collect(),
                    rule: rule.clone(),
                    target,
                    pattern,
                });
            }
            compiled.insert(unit.to_string(), list);
        }
        Ok(PolicyValidator {
            rules: compiled,
            counters: Mutex::new(FxHashMap::default()),
            reset_on_success,
        })
    }

    /// Validator with no rules.
    pub fn empty() -> Self {
        PolicyValidator {
            rules: FxHashMap::default(),
            counters: Mutex::new(FxHashMap::default()),
            reset_on_success: false,
        }
    }

    /// Does `unit` have any rules?
    pub fn has_rules(&self, unit: &str) -> bool {
        self.rules.get(unit).is_some_and(|r| !r.is_empty())
    }

    /// Check bound arguments before the unit runs.
    pub fn validate_inputs(&self, unit: &str, args: &Value) -> Result<()> {
        let Some(rules) = self.rules_for(unit) else {
            return Ok(());
        };
        for compiled in rules.iter().filter(|c| c.rule.phase == RulePhase::Input) {
            if let Some(value) = args.get_path(&compiled.segments) {
                self.judge(unit, compiled, value)?;
            }
        }
        Ok(())
    }

    /// Check pending writes before commit.
    ///
    /// Output targets are evaluated on the tree that would result from
    /// applying `pending` to `base`, and only when a pending delta
    /// overlaps the target.
    pub fn validate_outputs(&self, unit: &str, pending: &[Delta], base: &Value) -> Result<()> {
        let Some(rules) = self.rules_for(unit) else {
            return Ok(());
        };
        let touched: Vec<&CompiledRule> = rules
            .iter()
            .filter(|c| c.rule.phase == RulePhase::Output)
            .filter(|c| {
                c.target
                    .as_ref()
                    .is_some_and(|t| pending.iter().any(|d| d.path.overlaps(t)))
            })
            .collect();
        if touched.is_empty() {
            return Ok(());
        }

        let mut prospective = base.clone();
        apply_all(&mut prospective, pending)?;
        for compiled in touched {
            if let Some(value) = prospective.get_path(&compiled.segments) {
                self.judge(unit, compiled, value)?;
            }
        }
        Ok(())
    }

    fn rules_for(&self, unit: &str) -> Option<&[CompiledRule]> {
        match self.rules.get(unit) {
            Some(rules) if !rules.is_empty() => Some(rules),
            _ => {
                debug!(unit, "No rules registered, validation skipped");
                None
            }
        }
    }

    fn judge(&self, unit: &str, compiled: &CompiledRule, value: &Value) -> Result<()> {
        let key = counter_key(unit, compiled.rule.phase, &compiled.rule.target);
        let rule = format!("{}/{}", unit, compiled.rule.target);
        let Some(reason) = evaluate(compiled, value) else {
            if self.reset_on_success {
                self.counters.lock().remove(&key);
            }
            return Ok(());
        };

        let mut counters = self.counters.lock();
        let count = {
            let count = counters.entry(key.clone()).or_insert(0);
            *count += 1;
            *count
        };

        let phase = compiled.rule.phase.as_str();
        match compiled.rule.severity {
            Severity::Stop => Err(Error::AuditStop { rule, reason }),
            Severity::Abort => Err(Error::AuditAbort { rule, reason }),
            Severity::Block => {
                let threshold = compiled.rule.effective_threshold();
                if count >= threshold {
                    counters.insert(key, 0);
                    warn!(rule = %rule, phase, count, threshold, "Block threshold reached");
                    Err(Error::AuditBlock { rule, reason, count })
                } else {
                    warn!(rule = %rule, phase, count, threshold, reason = %reason, "Policy violation below block threshold");
                    Ok(())
                }
            }
            Severity::Count => {
                warn!(rule = %rule, phase, count, reason = %reason, "Policy violation counted");
                Ok(())
            }
        }
    }

    /// Current counter for `target` under `unit`'s rules of `phase`.
    pub fn violation_count(&self, unit: &str, phase: RulePhase, target: &str) -> u32 {
        let key = counter_key(unit, phase, target);
        self.counters.lock().get(&key).copied().unwrap_or(0)
    }

    /// Zero every counter belonging to `unit`.
    pub fn reset_counters(&self, unit: &str) {
        let prefix = format!("{}/", unit);
        self.counters.lock().retain(|key, _| !key.starts_with(&prefix));
    }
}

fn counter_key(unit: &str, phase: RulePhase, target: &str) -> String {
    format!("{}/{}/{}", unit, phase.as_str(), target)
}

impl std::fmt::Debug for PolicyValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyValidator")
            .field("units", &self.rules.len())
            .field("reset_on_success", &self.reset_on_success)
            .finish()
    }
}

/// First failing check, described.
fn evaluate(compiled: &CompiledRule, value: &Value) -> Option<String> {
    let checks = &compiled.rule.checks;

    if checks.min.is_some() || checks.max.is_some() {
        let Some(n) = value.as_number() else {
            return Some(format!("expected a number, found {}", value.type_name()));
        };
        if let Some(min) = checks.min {
            if n < min {
                return Some(format!("{} is below minimum {}", n, min));
            }
        }
        if let Some(max) = checks.max {
            if n > max {
                return Some(format!("{} is above maximum {}", n, max));
            }
        }
    }

    if checks.min_len.is_some() || checks.max_len.is_some() {
        let Some(len) = value.len() else {
            return Some(format!("{} has no length", value.type_name()));
        };
        if let Some(min) = checks.min_len {
            if len < min {
                return Some(format!("length {} is below minimum {}", len, min));
            }
        }
        if let Some(max) = checks.max_len {
            if len > max {
                return Some(format!("length {} is above maximum {}", len, max));
            }
        }
    }

    if let Some(pattern) = &compiled.pattern {
        match value.as_str() {
            Some(s) if pattern.is_match(s) => {}
            Some(s) => return Some(format!("{:?} does not match /{}/", s, pattern.as_str())),
            None => return Some(format!("expected a string, found {}", value.type_name())),
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::Rule;
    use serde_json::json;
    use warden_core::DeltaOp;

    fn args(v: serde_json::Value) -> Value {
        Value::from(v)
    }

    fn validator(rules: RuleSet, reset_on_success: bool) -> PolicyValidator {
        PolicyValidator::new(&rules, reset_on_success).unwrap()
    }

    #[test]
    fn test_no_rules_skips_validation() {
        let v = validator(RuleSet::new().rule("other", Rule::new("x", Severity::Stop).min(0.0)), false);
        assert!(!v.has_rules("pay"));
        assert!(v.validate_inputs("pay", &args(json!({"x": -5}))).is_ok());
    }

    #[test]
    fn test_stop_and_abort_raise_immediately() {
        let v = validator(
            RuleSet::new()
                .rule("a", Rule::new("x", Severity::Stop).min(0.0))
                .rule("b", Rule::new("x", Severity::Abort).max(1.0)),
            false,
        );
        assert!(matches!(
            v.validate_inputs("a", &args(json!({"x": -1}))),
            Err(Error::AuditStop { .. })
        ));
        assert!(matches!(
            v.validate_inputs("b", &args(json!({"x": 2}))),
            Err(Error::AuditAbort { .. })
        ));
        assert_eq!(v.violation_count("a", RulePhase::Input, "x"), 1);
    }

    #[test]
    fn test_block_raises_at_threshold_then_resets() {
        let v = validator(RuleSet::new().rule("pay", Rule::new("amount", Severity::Block).min(0.0)), false);
        let bad = args(json!({"amount": -1}));

        assert!(v.validate_inputs("pay", &bad).is_ok());
        assert!(v.validate_inputs("pay", &bad).is_ok());
        match v.validate_inputs("pay", &bad) {
            Err(Error::AuditBlock { count, rule, .. }) => {
                assert_eq!(count, 3);
                assert_eq!(rule, "pay/amount");
            }
            other => panic!("expected AuditBlock, got {other:?}"),
        }
        assert_eq!(v.violation_count("pay", RulePhase::Input, "amount"), 0);
        assert!(v.validate_inputs("pay", &bad).is_ok());
        assert_eq!(v.violation_count("pay", RulePhase::Input, "amount"), 1);
    }

    #[test]
    fn test_counter_persists_without_reset_on_success() {
        let rules = RuleSet::new().rule("pay", Rule::new("amount", Severity::Block).min(0.0));
        let good = args(json!({"amount": 5}));
        let bad = args(json!({"amount": -1}));

        let flaky = validator(rules.clone(), false);
        flaky.validate_inputs("pay", &bad).unwrap();
        flaky.validate_inputs("pay", &good).unwrap();
        flaky.validate_inputs("pay", &bad).unwrap();
        assert_eq!(flaky.violation_count("pay", RulePhase::Input, "amount"), 2);

        let consecutive = validator(rules, true);
        consecutive.validate_inputs("pay", &bad).unwrap();
        consecutive.validate_inputs("pay", &good).unwrap();
        consecutive.validate_inputs("pay", &bad).unwrap();
        assert_eq!(consecutive.violation_count("pay", RulePhase::Input, "amount"), 1);
    }

    #[test]
    fn test_count_never_raises() {
        let v = validator(RuleSet::new().rule("u", Rule::new("name", Severity::Count).max_len(3)), false);
        for _ in 0..10 {
            v.validate_inputs("u", &args(json!({"name": "toolong"}))).unwrap();
        }
        assert_eq!(v.violation_count("u", RulePhase::Input, "name"), 10);
        v.reset_counters("u");
        assert_eq!(v.violation_count("u", RulePhase::Input, "name"), 0);
    }

    #[test]
    fn test_absent_target_not_applicable() {
        let v = validator(RuleSet::new().rule("u", Rule::new("x", Severity::Stop).min(0.0)), false);
        assert!(v.validate_inputs("u", &args(json!({"y": -1}))).is_ok());
        assert_eq!(v.violation_count("u", RulePhase::Input, "x"), 0);
    }

    #[test]
    fn test_checks() {
        let v = validator(
            RuleSet::new()
                .rule("u", Rule::new("code", Severity::Stop).pattern("^[A-Z]{3}$"))
                .rule("u", Rule::new("tags", Severity::Stop).min_len(1)),
            false,
        );
        assert!(v.validate_inputs("u", &args(json!({"code": "ABC", "tags": [1]}))).is_ok());
        assert!(v.validate_inputs("u", &args(json!({"code": "abc"}))).is_err());
        assert!(v.validate_inputs("u", &args(json!({"code": 5}))).is_err());
        assert!(v.validate_inputs("u", &args(json!({"tags": []}))).is_err());
        assert!(v.validate_inputs("u", &args(json!({"nested": {"x": 1}}))).is_ok());
    }

    #[test]
    fn test_nested_input_target() {
        let v = validator(RuleSet::new().rule("u", Rule::new("order.qty", Severity::Abort).min(1.0)), false);
        assert!(v.validate_inputs("u", &args(json!({"order": {"qty": 0}}))).is_err());
        assert!(v.validate_inputs("u", &args(json!({"order": {"qty": 2}}))).is_ok());
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let rules = RuleSet::new().rule("u", Rule::new("x", Severity::Stop).pattern("("));
        assert!(matches!(PolicyValidator::new(&rules, false), Err(Error::Config { .. })));
    }

    #[test]
    fn test_outputs_checked_on_prospective_tree() {
        let v = validator(
            RuleSet::new().rule("u", Rule::new("domain.order.total", Severity::Stop).output().max(100.0)),
            false,
        );
        let base = args(json!({"domain": {"order": {"total": 10}}}));
        let ok = vec![Delta::explicit("domain.order.total".parse().unwrap(), DeltaOp::Set(Value::Int(50)))];
        let bad = vec![Delta::explicit(
            "domain.order".parse().unwrap(),
            DeltaOp::Set(args(json!({"total": 500}))),
        )];
        let unrelated = vec![Delta::explicit("domain.other".parse().unwrap(), DeltaOp::Set(Value::Int(1)))];

        assert!(v.validate_outputs("u", &ok, &base).is_ok());
        assert!(matches!(v.validate_outputs("u", &bad, &base), Err(Error::AuditStop { .. })));
        assert!(v.validate_outputs("u", &unrelated, &base).is_ok());
    }

    #[test]
    fn test_input_and_output_counters_are_separate() {
        let v = validator(
            RuleSet::new()
                .rule("u", Rule::new("domain.amount", Severity::Block).min(0.0).threshold(2))
                .rule("u", Rule::new("domain.amount", Severity::Block).output().min(0.0).threshold(2)),
            false,
        );
        let bad = args(json!({"domain": {"amount": -1}}));
        let pending = vec![Delta::explicit("domain.amount".parse().unwrap(), DeltaOp::Set(Value::Int(-1)))];

        v.validate_inputs("u", &bad).unwrap();
        v.validate_outputs("u", &pending, &Value::object()).unwrap();
        assert_eq!(v.violation_count("u", RulePhase::Input, "domain.amount"), 1);
        assert_eq!(v.violation_count("u", RulePhase::Output, "domain.amount"), 1);

        assert!(matches!(v.validate_inputs("u", &bad), Err(Error::AuditBlock { count: 2, .. })));
        assert_eq!(v.violation_count("u", RulePhase::Input, "domain.amount"), 0);
        assert_eq!(v.violation_count("u", RulePhase::Output, "domain.amount"), 1);

        v.reset_counters("u");
        assert_eq!(v.violation_count("u", RulePhase::Output, "domain.amount"), 0);
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_block_fires_once_per_threshold(threshold in 1u32..6, violations in 0u32..40) {
                let rules = RuleSet::new()
                    .rule("u", Rule::new("x", Severity::Block).min(0.0).threshold(threshold));
                let v = PolicyValidator::new(&rules, false).unwrap();
                let bad = Value::from(json!({"x": -1}));

                let mut fired = 0;
                for _ in 0..violations {
                    if v.validate_inputs("u", &bad).is_err() {
                        fired += 1;
                    }
                }
                prop_assert_eq!(fired, violations / threshold);
                prop_assert_eq!(v.violation_count("u", RulePhase::Input, "x"), violations % threshold);
            }
        }
    }
}
