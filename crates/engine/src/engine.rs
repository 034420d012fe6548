//! Unit-of-work execution
//!
//! ```text
//! execute(unit, args):
//!   ┌──────────────────┐
//!   │ validate inputs  │  once per call
//!   └────────┬─────────┘
//!            │
//!   ┌────────▼─────────┐
//!   │ open transaction │◄─────────┐
//!   └────────┬─────────┘          │
//!            │                    │
//!   ┌────────▼─────────┐          │
//!   │ run unit of work │          │ retryable conflict
//!   └────────┬─────────┘          │ (backoff, priority)
//!            │                    │
//!   ┌────────▼─────────┐          │
//!   │ validate outputs │          │
//!   └────────┬─────────┘          │
//!            │                    │
//!   ┌────────▼─────────┐          │
//!   │ attempt commit   ├──────────┘
//!   └──────────────────┘
//! ```
//!
//! Every failure discards the attempt's transaction; the store only ever
//! sees whole commits.

use crate::config::EngineConfig;
use crate::context::{ExecuteOptions, UnitContext};
use crate::metrics::{Counters, EngineMetrics};
use crate::registry::ManifestRegistry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, info};
use warden_concurrency::{Committed, ConflictResolver, Transaction};
use warden_core::{Error, Path, Result, Value, Version, Zone};
use warden_policy::PolicyValidator;
use warden_security::{CapabilityResolver, Manifest};
use warden_storage::{Snapshot, VersionedStore};

/// The state engine.
pub struct Engine {
    config: EngineConfig,
    store: Arc<VersionedStore>,
    resolver: Arc<CapabilityResolver>,
    conflicts: ConflictResolver,
    validator: PolicyValidator,
    registry: ManifestRegistry,
    counters: Counters,
}

impl Engine {
    /// Engine over an empty store.
    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::with_root(config, Value::object())
    }

    /// Engine over a store seeded with `root` at version 0.
    pub fn with_root(config: EngineConfig, root: Value) -> Result<Self> {
        config.validate()?;
        let store = Arc::new(VersionedStore::seeded(root, config.history_limit));
        let resolver = Arc::new(CapabilityResolver::new(
            config.zones.clone(),
            config.access_default,
        ));
        let conflicts = ConflictResolver::new(
            config.commit_mode,
            config.retry.clone(),
            config.priority.clone(),
        );
        let validator = PolicyValidator::new(&config.rules, config.reset_on_success)?;

        info!(
            commit_mode = ?config.commit_mode,
            access_default = ?config.access_default,
            history_limit = config.history_limit,
            rule_units = config.rules.units().count(),
            "Engine started"
        );

        Ok(Engine {
            config,
            store,
            resolver,
            conflicts,
            validator,
            registry: ManifestRegistry::new(),
            counters: Counters::default(),
        })
    }

    /// Configuration the engine was built with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The versioned store.
    pub fn store(&self) -> &Arc<VersionedStore> {
        &self.store
    }

    /// The capability resolver.
    pub fn resolver(&self) -> &Arc<CapabilityResolver> {
        &self.resolver
    }

    /// The conflict resolver.
    pub fn conflict_resolver(&self) -> &ConflictResolver {
        &self.conflicts
    }

    /// The policy validator.
    pub fn validator(&self) -> &PolicyValidator {
        &self.validator
    }

    /// Registered units.
    pub fn registry(&self) -> &ManifestRegistry {
        &self.registry
    }

    /// Register or replace a unit's manifest.
    pub fn register(&self, unit: impl Into<String>, manifest: Manifest) -> Option<Arc<Manifest>> {
        self.registry.register(unit, manifest)
    }

    /// Current committed version.
    pub fn version(&self) -> Version {
        self.store.version()
    }

    /// Current committed snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.store.snapshot()
    }

    /// Open a transaction for `unit` against the current snapshot.
    ///
    /// For callers that drive the open, run, commit sequence themselves;
    /// pair it with [`attempt_commit`](Self::attempt_commit).
    pub fn begin(&self, unit: &str) -> Result<Transaction> {
        let manifest = self.registry.get(unit)?;
        Ok(self.open(unit, manifest))
    }

    fn open(&self, unit: &str, manifest: Arc<Manifest>) -> Transaction {
        Transaction::open(
            unit,
            Arc::clone(&self.store),
            Arc::clone(&self.resolver),
            manifest,
        )
    }

    /// Validate outputs and commit `txn` once. No retry.
    pub fn attempt_commit(&self, txn: Transaction, token: Option<&str>) -> Result<Version> {
        let unit = txn.unit().to_string();
        if let Err(e) = self.validate_outputs(&unit, &txn) {
            self.note_failure(&e);
            txn.discard();
            Counters::bump(&self.counters.discarded);
            return Err(e);
        }
        let result = self.conflicts.attempt_commit(txn, token);
        match &result {
            Ok(_) => Counters::bump(&self.counters.committed),
            Err(e) if !e.is_retryable() => Counters::bump(&self.counters.discarded),
            Err(_) => {}
        }
        result
    }

    /// Run `f` as `unit` and commit its changes, retrying conflicts.
    ///
    /// Inputs are validated once; outputs before every commit attempt.
    /// An error from `f` discards the attempt and propagates unless it is
    /// retryable.
    pub fn execute<T, F>(
        &self,
        unit: &str,
        args: &Value,
        options: &ExecuteOptions,
        mut f: F,
    ) -> Result<Committed<T>>
    where
        F: FnMut(&mut UnitContext<'_>) -> Result<T>,
    {
        let manifest = self.registry.get(unit)?;
        if let Err(e) = self.validator.validate_inputs(unit, args) {
            self.note_failure(&e);
            return Err(e);
        }

        let token = options.priority_token.as_deref();
        let result = self.conflicts.run(token, |attempt| {
            let txn = self.open(unit, Arc::clone(&manifest));
            let outcome = {
                let mut ctx = UnitContext::new(&txn, args, attempt);
                f(&mut ctx)
            }
            .and_then(|value| self.validate_outputs(unit, &txn).map(|()| value));

            match outcome {
                Ok(value) => Ok((value, txn)),
                Err(e) => {
                    debug!(unit, attempt, txn_id = %txn.id(), error = %e, "Attempt discarded");
                    txn.discard();
                    if !e.is_retryable() {
                        Counters::bump(&self.counters.discarded);
                    }
                    Err(e)
                }
            }
        });

        match &result {
            Ok(committed) => {
                Counters::bump(&self.counters.committed);
                debug!(
                    unit,
                    version = %committed.version,
                    attempts = committed.attempts,
                    "Unit of work committed"
                );
            }
            Err(e) => self.note_failure(e),
        }
        result
    }

    fn validate_outputs(&self, unit: &str, txn: &Transaction) -> Result<()> {
        if !self.validator.has_rules(unit) {
            return Ok(());
        }
        let pending = txn.pending_deltas()?;
        self.validator
            .validate_outputs(unit, &pending, txn.base().root())
    }

    fn note_failure(&self, error: &Error) {
        if error.is_audit() {
            Counters::bump(&self.counters.audit_failures);
        } else if error.is_capability_denied() {
            Counters::bump(&self.counters.capability_denials);
        }
    }

    /// Read committed state outside any transaction.
    ///
    /// Bypasses capabilities, so diagnostics in the meta zone are visible
    /// here. Heavy-zone paths read their slot.
    pub fn inspect(&self, path: &str) -> Result<Option<Value>> {
        let path: Path = path.parse()?;
        if let Some(root) = self.resolver.heavy_root(&path) {
            let rel = &path.segments()[root.depth()..];
            return Ok(self
                .store
                .heavy()
                .read(&root)
                .and_then(|slot| slot.get_path(rel).cloned()));
        }
        Ok(self.store.read(&path))
    }

    /// Delete every signal-zone key in one commit.
    ///
    /// Returns the new version, or `None` if there were no signals.
    pub fn clear_signals(&self) -> Result<Option<Version>> {
        let zones = self.resolver.zones();
        let cleared = self
            .store
            .clear_matching(|name| zones.classify(name) == Zone::Signal)?;
        if let Some(version) = cleared {
            info!(version = %version, "Signals cleared");
        }
        Ok(cleared)
    }

    fn heavy_path(&self, path: &str) -> Result<Path> {
        let path: Path = path.parse()?;
        let zone = self.resolver.zones().zone_of(&path);
        if zone != Zone::Heavy {
            return Err(Error::invalid_path(
                path.to_string(),
                format!("zone is {}, not heavy", zone.as_str()),
            ));
        }
        Ok(path)
    }

    /// Swap a heavy-zone slot. Applied immediately, never rolled back.
    pub fn write_heavy(&self, path: &str, value: impl Into<Value>) -> Result<Option<Value>> {
        let path = self.heavy_path(path)?;
        Ok(self.store.heavy().write(path, value.into()))
    }

    /// Read a heavy-zone slot.
    pub fn read_heavy(&self, path: &str) -> Result<Option<Value>> {
        let path = self.heavy_path(path)?;
        Ok(self.store.heavy().read(&path))
    }

    /// Empty a heavy-zone slot.
    pub fn remove_heavy(&self, path: &str) -> Result<Option<Value>> {
        let path = self.heavy_path(path)?;
        Ok(self.store.heavy().remove(&path))
    }

    /// Counter snapshot.
    pub fn metrics(&self) -> EngineMetrics {
        let stats = self.conflicts.stats();
        EngineMetrics {
            committed: self.counters.committed.load(Ordering::Relaxed),
            discarded: self.counters.discarded.load(Ordering::Relaxed) + stats.conflicts,
            conflicts: stats.conflicts,
            retries: stats.retries,
            exhausted: stats.exhausted,
            audit_failures: self.counters.audit_failures.load(Ordering::Relaxed),
            capability_denials: self.counters.capability_denials.load(Ordering::Relaxed),
            version: self.store.version().as_u64(),
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("version", &self.store.version())
            .field("units", &self.registry.len())
            .field("commit_mode", &self.config.commit_mode)
            .finish()
    }
}
