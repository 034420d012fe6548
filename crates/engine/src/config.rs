//! Engine configuration
//!
//! Every field has a default, so an empty document is a valid
//! configuration:
//!
//! ```toml
//! commit_mode = "smart"
//! access_default = "deny"
//! history_limit = 1024
//! reset_on_success = false
//!
//! [retry]
//! max_attempts = 8
//! max_elapsed_ms = 5000
//!
//! [priority]
//! starvation_threshold = 3
//!
//! [zones.annotations]
//! events = "signal"
//!
//! [[rules.units.pay]]
//! target = "amount"
//! severity = "block"
//! checks = { min = 0 }
//! ```

use serde::{Deserialize, Serialize};
use warden_concurrency::{CommitMode, PriorityConfig, RetryPolicy};
use warden_core::{Error, Result};
use warden_policy::RuleSet;
use warden_security::{AccessDefault, ZoneTable};
use warden_storage::DEFAULT_HISTORY_LIMIT;

/// Engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Commit validation mode
    pub commit_mode: CommitMode,
    /// Resolution of paths absent from a manifest
    pub access_default: AccessDefault,
    /// Commits retained for smart validation
    pub history_limit: usize,
    /// Backoff and retry budget
    pub retry: RetryPolicy,
    /// Starvation arbitration
    pub priority: PriorityConfig,
    /// Reset a rule's violation counter on a passing evaluation
    pub reset_on_success: bool,
    /// Zone annotations
    pub zones: ZoneTable,
    /// Policy rules
    pub rules: RuleSet,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            commit_mode: CommitMode::default(),
            access_default: AccessDefault::default(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            retry: RetryPolicy::default(),
            priority: PriorityConfig::default(),
            reset_on_success: false,
            zones: ZoneTable::new(),
            rules: RuleSet::new(),
        }
    }
}

impl EngineConfig {
    /// Parse from TOML and validate.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: EngineConfig =
            toml::from_str(text).map_err(|e| Error::config(format!("invalid engine config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse from JSON and validate.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(text)
            .map_err(|e| Error::config(format!("invalid engine config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.history_limit == 0 {
            return Err(Error::config("history_limit must be at least 1"));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::config("retry.max_attempts must be at least 1"));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(Error::config(format!(
                "retry.base_delay_ms ({}) exceeds retry.max_delay_ms ({})",
                self.retry.base_delay_ms, self.retry.max_delay_ms
            )));
        }
        if self.priority.starvation_threshold == 0 {
            return Err(Error::config("priority.starvation_threshold must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::Zone;
    use warden_policy::Severity;

    #[test]
    fn test_empty_document_is_default() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.access_default, AccessDefault::Deny);
        assert_eq!(config.commit_mode, CommitMode::Smart);
    }

    #[test]
    fn test_full_document() {
        let config = EngineConfig::from_toml_str(
            r#"
            commit_mode = "strict"
            access_default = "read_only"
            history_limit = 16
            reset_on_success = true

            [retry]
            max_attempts = 3
            jitter = false

            [priority]
            starvation_threshold = 2

            [zones.annotations]
            events = "signal"

            [[rules.units.pay]]
            target = "amount"
            severity = "block"
            threshold = 5
            checks = { min = 0 }
            "#,
        )
        .unwrap();

        assert_eq!(config.commit_mode, CommitMode::Strict);
        assert_eq!(config.access_default, AccessDefault::ReadOnly);
        assert_eq!(config.history_limit, 16);
        assert!(config.reset_on_success);
        assert_eq!(config.retry.max_attempts, 3);
        assert!(!config.retry.jitter);
        assert_eq!(config.retry.max_elapsed_ms, RetryPolicy::default().max_elapsed_ms);
        assert_eq!(config.priority.starvation_threshold, 2);
        assert_eq!(config.zones.classify("events"), Zone::Signal);

        let rules = config.rules.rules_for("pay");
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].severity, Severity::Block);
        assert_eq!(rules[0].effective_threshold(), 5);
    }

    #[test]
    fn test_rejects_invalid_settings() {
        assert!(EngineConfig::from_toml_str("history_limit = 0").is_err());
        assert!(EngineConfig::from_toml_str("[retry]\nmax_attempts = 0").is_err());
        assert!(EngineConfig::from_toml_str("commit_mode = \"eventual\"").is_err());
        assert!(EngineConfig::from_json_str("{\"access_default\": \"allow\"}").is_err());
    }
}
