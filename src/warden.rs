//! Main entry point for Warden.
//!
//! This module provides the `Warden` struct, the handle callers use to
//! register units of work and execute them against the shared state.

use std::sync::Arc;
use tracing::debug;
use warden_concurrency::{CommitMode, Committed, PriorityConfig, RetryPolicy};
use warden_core::{Result, Value, Version, Zone};
use warden_engine::{Engine, EngineConfig, EngineMetrics, ExecuteOptions, UnitContext};
use warden_policy::{Rule, RuleSet};
use warden_security::{AccessDefault, Manifest};
use warden_storage::Snapshot;

/// The Warden state engine.
///
/// Cheap to clone; clones share the same state.
///
/// # Example
///
/// ```ignore
/// use warden::prelude::*;
///
/// let warden = Warden::builder()
///     .unit("deposit", Manifest::builder().write("domain.account").build()?)
///     .build()?;
///
/// let out = warden.execute("deposit", json!({"amount": 5}), |ctx| {
///     let amount = ctx.arg("amount").and_then(Value::as_int).unwrap_or(0);
///     ctx.view_at("domain.account")?.set("balance", amount)
/// })?;
/// assert_eq!(out.version, Version::new(1));
/// ```
#[derive(Clone)]
pub struct Warden {
    engine: Arc<Engine>,
}

impl Warden {
    /// Engine with default settings and no registered units.
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    /// Create a builder.
    pub fn builder() -> WardenBuilder {
        WardenBuilder::new()
    }

    /// Engine built from a TOML configuration document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Self::builder().config(EngineConfig::from_toml_str(text)?).build()
    }

    /// Register or replace a unit of work.
    pub fn register(&self, unit: impl Into<String>, manifest: Manifest) {
        self.engine.register(unit, manifest);
    }

    /// Execute `unit` with default options.
    pub fn execute<T, F>(&self, unit: &str, args: impl Into<Value>, f: F) -> Result<Committed<T>>
    where
        F: FnMut(&mut UnitContext<'_>) -> Result<T>,
    {
        self.engine.execute(unit, &args.into(), &ExecuteOptions::default(), f)
    }

    /// Execute `unit` with explicit options.
    pub fn execute_with<T, F>(
        &self,
        unit: &str,
        args: impl Into<Value>,
        options: &ExecuteOptions,
        f: F,
    ) -> Result<Committed<T>>
    where
        F: FnMut(&mut UnitContext<'_>) -> Result<T>,
    {
        self.engine.execute(unit, &args.into(), options, f)
    }

    /// Read committed state outside any transaction.
    pub fn inspect(&self, path: &str) -> Result<Option<Value>> {
        self.engine.inspect(path)
    }

    /// Current committed snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.engine.snapshot()
    }

    /// Current committed version.
    pub fn version(&self) -> Version {
        self.engine.version()
    }

    /// Delete every signal-zone key in one commit.
    pub fn clear_signals(&self) -> Result<Option<Version>> {
        self.engine.clear_signals()
    }

    /// Engine metrics.
    pub fn metrics(&self) -> EngineMetrics {
        self.engine.metrics()
    }

    /// The underlying engine.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }
}

impl std::fmt::Debug for Warden {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Warden").field("engine", &self.engine).finish()
    }
}

/// Builder for a [`Warden`].
///
/// # Example
///
/// ```ignore
/// // Inspection context: undeclared reads allowed, strict commits
/// let warden = Warden::builder()
///     .read_only_default()
///     .strict()
///     .zone("events", Zone::Signal)
///     .build()?;
/// ```
#[derive(Debug, Default)]
pub struct WardenBuilder {
    config: EngineConfig,
    root: Option<Value>,
    zones: Vec<(String, Zone)>,
    units: Vec<(String, Manifest)>,
}

impl WardenBuilder {
    /// Builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Commit validation mode.
    pub fn commit_mode(mut self, mode: CommitMode) -> Self {
        self.config.commit_mode = mode;
        self
    }

    /// Reject commits if anything was committed since the base version.
    pub fn strict(self) -> Self {
        self.commit_mode(CommitMode::Strict)
    }

    /// Reject commits only on overlapping concurrent writes (default).
    pub fn smart(self) -> Self {
        self.commit_mode(CommitMode::Smart)
    }

    /// Resolution of undeclared paths.
    pub fn access_default(mut self, default: AccessDefault) -> Self {
        self.config.access_default = default;
        self
    }

    /// Let undeclared paths resolve to Read (inspection contexts).
    pub fn read_only_default(self) -> Self {
        self.access_default(AccessDefault::ReadOnly)
    }

    /// Commits retained for smart validation.
    pub fn history_limit(mut self, limit: usize) -> Self {
        self.config.history_limit = limit;
        self
    }

    /// Retry policy for conflicting commits.
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    /// Starvation arbitration settings.
    pub fn priority(mut self, config: PriorityConfig) -> Self {
        self.config.priority = config;
        self
    }

    /// Reset violation counters on passing evaluations.
    pub fn reset_on_success(mut self, reset: bool) -> Self {
        self.config.reset_on_success = reset;
        self
    }

    /// Annotate a final-segment name with a zone. Checked at build.
    pub fn zone(mut self, name: impl Into<String>, zone: Zone) -> Self {
        self.zones.push((name.into(), zone));
        self
    }

    /// Replace the policy rule set.
    pub fn rules(mut self, rules: RuleSet) -> Self {
        self.config.rules = rules;
        self
    }

    /// Add one policy rule.
    pub fn rule(mut self, unit: impl Into<String>, rule: Rule) -> Self {
        self.config.rules = std::mem::take(&mut self.config.rules).rule(unit, rule);
        self
    }

    /// Initial state tree (version 0).
    pub fn root(mut self, root: impl Into<Value>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// Register a unit of work.
    pub fn unit(mut self, unit: impl Into<String>, manifest: Manifest) -> Self {
        self.units.push((unit.into(), manifest));
        self
    }

    /// Build the engine.
    pub fn build(self) -> Result<Warden> {
        let mut config = self.config;
        for (name, zone) in self.zones {
            config.zones.annotate(name, zone)?;
        }
        let engine = Engine::with_root(config, self.root.unwrap_or_else(Value::object))?;
        let count = self.units.len();
        for (unit, manifest) in self.units {
            engine.register(unit, manifest);
        }
        debug!(units = count, "Warden built");
        Ok(Warden {
            engine: Arc::new(engine),
        })
    }
}
