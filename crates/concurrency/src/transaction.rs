//! Transactions
//!
//! A [`Transaction`] is one unit of work's private workspace over a base
//! snapshot. Mutations made through its [`GuardedView`]s land in shadows;
//! explicit deltas are recorded alongside. At commit the shadows are
//! deep-diffed against their originals and the merged delta set is handed
//! to the store.
//!
//! ## Lifecycle
//!
//! ```text
//! Open --commit ok--> Committed
//! Open --commit err / discard / drop--> Discarded
//! ```
//!
//! Closing a transaction drops every shadow. Views handed out earlier keep
//! a reference to the transaction but fail with `StaleView` on any use.
//!
//! ## Merge order
//!
//! Explicit deltas are applied first, then inferred ones. An explicit delta
//! overlapping an inferred one is stale and is dropped: shadow content at
//! commit time is authoritative.
//!
//! ## Heavy zone
//!
//! Writes to heavy-zone paths go straight to the store's heavy slots. They
//! are not shadowed and survive discard.

use crate::conflict::{self, CommitMode};
use crate::shadow::{check_reachable, Shadow};
use crate::view::GuardedView;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, warn};
use uuid::Uuid;
use warden_core::delta::diff;
use warden_core::{Capability, Delta, DeltaOp, Error, Layer, Path, Result, Value, Version, Zone};
use warden_security::{CapabilityResolver, Manifest, ZoneTable};
use warden_storage::{Snapshot, VersionedStore};

/// Transaction lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionStatus {
    /// Accepting reads and writes
    Open,
    /// Deltas published to the store
    Committed,
    /// Closed without publishing
    Discarded,
}

impl TransactionStatus {
    /// Lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Open => "open",
            TransactionStatus::Committed => "committed",
            TransactionStatus::Discarded => "discarded",
        }
    }

    /// Is the transaction still open?
    pub fn is_open(&self) -> bool {
        matches!(self, TransactionStatus::Open)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) struct TxnState {
    status: TransactionStatus,
    /// Shadow roots. No key is an ancestor of another.
    shadows: BTreeMap<Path, Shadow>,
    explicit: Vec<Delta>,
    caps: FxHashMap<Path, Capability>,
}

/// State shared between a transaction and the views it issued.
pub(crate) struct TxnShared {
    id: Uuid,
    unit: String,
    base: Arc<Snapshot>,
    store: Arc<VersionedStore>,
    resolver: Arc<CapabilityResolver>,
    manifest: Arc<Manifest>,
    admin: bool,
    state: Mutex<TxnState>,
}

/// What a write needs from the capability set.
enum Need {
    /// Update if the target exists, Append otherwise
    Set,
    Append,
    Delete,
}

impl TxnShared {
    pub(crate) fn is_admin(&self) -> bool {
        self.admin
    }

    fn stale(&self, state: &TxnState, path: &Path) -> Result<()> {
        if state.status.is_open() {
            return Ok(());
        }
        Err(Error::StaleView {
            path: path.clone(),
            txn_id: self.id.to_string(),
            status: state.status.to_string(),
        })
    }

    /// Paths reachable through a transaction are global or domain.
    pub(crate) fn check_layer(path: &Path) -> Result<()> {
        match path.layer() {
            Some(Layer::Global) | Some(Layer::Domain) => Ok(()),
            Some(Layer::Local) => Err(Error::invalid_path(
                path.to_string(),
                "local layer lives in the execution scope, not the transaction",
            )),
            None if path.is_root() => Ok(()),
            None => Err(Error::invalid_path(path.to_string(), "unknown layer")),
        }
    }

    fn capability_locked(&self, state: &mut TxnState, path: &Path) -> Result<Capability> {
        if self.admin {
            return Ok(Capability::FULL);
        }
        if let Some(caps) = state.caps.get(path) {
            return Ok(*caps);
        }
        let caps = self.resolver.resolve(path, &self.manifest, false)?;
        state.caps.insert(path.clone(), caps);
        Ok(caps)
    }

    /// Resolve (or fetch the cached) capability set for `path`.
    pub(crate) fn capability(&self, path: &Path) -> Result<Capability> {
        let mut state = self.state.lock();
        self.stale(&state, path)?;
        self.capability_locked(&mut state, path)
    }

    pub(crate) fn require(&self, path: &Path, have: Capability, needed: Capability) -> Result<()> {
        self.resolver.require(path, &self.manifest, have, needed)
    }

    fn zone_of(&self, path: &Path) -> Zone {
        self.resolver.zone_of(path)
    }

    /// Shadow root covering `path`, if any.
    fn covering(state: &TxnState, path: &Path) -> Option<Path> {
        path.ancestors_and_self()
            .find(|candidate| state.shadows.contains_key(candidate))
    }

    /// Value of `path` as this transaction sees it.
    fn effective(&self, state: &TxnState, path: &Path) -> Option<Value> {
        if let Some(root) = self.resolver.heavy_root(path) {
            let rel = &path.segments()[root.depth()..];
            return self.store.heavy().read(&root)?.get_path(rel).cloned();
        }
        if let Some(root) = Self::covering(state, path) {
            let rel = &path.segments()[root.depth()..];
            return state.shadows.get(&root)?.get(rel).cloned();
        }

        // Overlay shadows below `path` onto the base value
        let mut nested = Self::nested(state, path).peekable();
        if nested.peek().is_none() {
            return self.base.read(path);
        }
        let mut overlay = Shadow::new(self.base.read(path));
        for (key, shadow) in nested {
            let rel = &key.segments()[path.depth()..];
            if let Err(e) = overlay.replace(path, rel, shadow.current().cloned()) {
                error!(txn_id = %self.id, path = %key, error = %e, "Shadow no longer fits the base tree");
            }
        }
        overlay.current().cloned()
    }

    /// Shadows at or below `path`, in path order.
    fn nested<'a>(state: &'a TxnState, path: &'a Path) -> impl Iterator<Item = (&'a Path, &'a Shadow)> {
        state
            .shadows
            .range(path.clone()..)
            .take_while(move |(key, _)| key.starts_with(path))
    }

    /// Shadow root for a write at `at`, creating a shadow there if nothing
    /// covers it yet. Shadows below `at` are folded into the new one.
    fn ensure_shadow(&self, state: &mut TxnState, at: &Path) -> Result<Path> {
        if let Some(root) = Self::covering(state, at) {
            return Ok(root);
        }

        check_reachable(self.base.root(), at)?;
        let mut shadow = Shadow::new(self.base.read(at));
        let nested: Vec<Path> = Self::nested(state, at).map(|(key, _)| key.clone()).collect();
        for key in &nested {
            let rel = &key.segments()[at.depth()..];
            let content = state.shadows.get(key).and_then(|s| s.current().cloned());
            shadow.replace(at, rel, content)?;
        }
        for key in &nested {
            state.shadows.remove(key);
        }

        debug!(txn_id = %self.id, path = %at, folded = nested.len(), "Shadow created");
        state.shadows.insert(at.clone(), shadow);
        Ok(at.clone())
    }

    fn needed(&self, state: &TxnState, target: &Path, need: Need) -> Capability {
        match need {
            Need::Set if self.zone_of(target) == Zone::Heavy => Capability::UPDATE,
            Need::Set if self.effective(state, target).is_some() => Capability::UPDATE,
            Need::Set => Capability::APPEND,
            Need::Append => Capability::APPEND,
            Need::Delete => Capability::DELETE,
        }
    }

    /// Apply a write to a heavy slot. The slot holds one opaque value, so
    /// only `Set` and `Delete` of the heavy key itself are possible.
    pub(crate) fn write_heavy(&self, target: &Path, op: DeltaOp) -> Result<bool> {
        let whole = self.resolver.heavy_root(target).as_ref() == Some(target);
        let slots = self.store.heavy();
        match op {
            DeltaOp::Set(value) if whole => {
                slots.write(target.clone(), value);
                debug!(txn_id = %self.id, path = %target, "Heavy slot written");
                Ok(true)
            }
            DeltaOp::Delete if whole => Ok(slots.remove(target).is_some()),
            op => Err(heavy_denied(target, &op)),
        }
    }

    /// Require the capability for every change below `target`, including
    /// the descendants a replaced or deleted container takes with it.
    fn check_changes(
        &self,
        state: &mut TxnState,
        target: &Path,
        before: Option<&Value>,
        changes: &[Delta],
    ) -> Result<()> {
        for change in changes {
            if self.zone_of(&change.path) == Zone::Heavy {
                return Err(heavy_denied(&change.path, &change.op));
            }
            let rel = &change.path.segments()[target.depth()..];
            let old = before.and_then(|v| v.get_path(rel));
            let caps = self.capability_locked(state, &change.path)?;
            let needed = match &change.op {
                DeltaOp::Set(_) if old.is_some() => Capability::UPDATE,
                DeltaOp::Set(_) | DeltaOp::Append(_) => Capability::APPEND,
                DeltaOp::Delete => Capability::DELETE,
            };
            self.require(&change.path, caps, needed)?;

            if let (Some(old), false) = (old, matches!(change.op, DeltaOp::Append(_))) {
                self.check_removed(state, &change.path, old)?;
            }
        }
        Ok(())
    }

    /// Descendants of a removed container go with it. Data-zone ones share
    /// the container's manifest request; any other zone needs Delete itself.
    fn check_removed(&self, state: &mut TxnState, at: &Path, old: &Value) -> Result<()> {
        let children: Vec<(Path, &Value)> = match old {
            Value::Object(map) => map
                .iter()
                .map(|(key, value)| Ok((at.child(key.as_str())?, value)))
                .collect::<Result<_>>()?,
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(index, value)| Ok((at.child(index.to_string())?, value)))
                .collect::<Result<_>>()?,
            _ => return Ok(()),
        };
        for (path, value) in children {
            if self.zone_of(&path) != Zone::Data {
                let caps = self.capability_locked(state, &path)?;
                self.require(&path, caps, Capability::DELETE)?;
            }
            self.check_removed(state, &path, value)?;
        }
        Ok(())
    }

    // ========================================================================
    // View operations
    // ========================================================================

    /// Read `path`. Meta-zone descendants are left out: no unit of work
    /// reads diagnostics unless it holds Admin.
    pub(crate) fn read(&self, path: &Path, caps: Capability) -> Result<Option<Value>> {
        let state = self.state.lock();
        self.stale(&state, path)?;
        self.require(path, caps, Capability::READ)?;
        let value = self.effective(&state, path);
        if self.admin {
            return Ok(value);
        }
        Ok(value.map(|v| without_unreadable(self.resolver.zones(), &v).unwrap_or(v)))
    }

    /// Read without a capability check, for navigation decisions.
    pub(crate) fn peek(&self, path: &Path) -> Result<Option<Value>> {
        let state = self.state.lock();
        self.stale(&state, path)?;
        Ok(self.effective(&state, path))
    }

    /// Set `target` (a child of the view at `view_path`).
    pub(crate) fn set(&self, view_path: &Path, target: &Path, value: Value) -> Result<()> {
        let mut state = self.state.lock();
        self.stale(&state, target)?;
        let caps = self.capability_locked(&mut state, target)?;
        let needed = self.needed(&state, target, Need::Set);
        self.require(target, caps, needed)?;

        if self.zone_of(target) == Zone::Heavy {
            return self.write_heavy(target, DeltaOp::Set(value)).map(|_| ());
        }

        let before = self.effective(&state, target);
        let mut changes = Vec::new();
        diff(target, before.as_ref(), Some(&value), &mut changes);
        self.check_changes(&mut state, target, before.as_ref(), &changes)?;

        let root = self.ensure_shadow(&mut state, view_path)?;
        let rel = &target.segments()[root.depth()..];
        match state.shadows.get_mut(&root) {
            Some(shadow) => shadow.set(&root, rel, value),
            None => Err(missing_shadow(&root)),
        }
    }

    /// Push onto the sequence at `target`.
    pub(crate) fn append(&self, target: &Path, caps: Capability, value: Value) -> Result<()> {
        let mut state = self.state.lock();
        self.stale(&state, target)?;
        self.require(target, caps, Capability::APPEND)?;

        if self.zone_of(target) == Zone::Heavy {
            return self.write_heavy(target, DeltaOp::Append(value)).map(|_| ());
        }

        let root = self.ensure_shadow(&mut state, target)?;
        let rel = &target.segments()[root.depth()..];
        match state.shadows.get_mut(&root) {
            Some(shadow) => shadow.push(&root, rel, value),
            None => Err(missing_shadow(&root)),
        }
    }

    /// Delete `target` (a child of the view at `view_path`).
    pub(crate) fn delete(&self, view_path: &Path, target: &Path) -> Result<bool> {
        let mut state = self.state.lock();
        self.stale(&state, target)?;
        let caps = self.capability_locked(&mut state, target)?;
        self.require(target, caps, Capability::DELETE)?;

        if self.zone_of(target) == Zone::Heavy {
            return self.write_heavy(target, DeltaOp::Delete);
        }
        let Some(before) = self.effective(&state, target) else {
            return Ok(false);
        };
        let changes = [Delta::inferred(target.clone(), DeltaOp::Delete)];
        self.check_changes(&mut state, target, Some(&before), &changes)?;

        let root = self.ensure_shadow(&mut state, view_path)?;
        let rel = &target.segments()[root.depth()..];
        match state.shadows.get_mut(&root) {
            Some(shadow) => shadow.remove(&root, rel),
            None => Err(missing_shadow(&root)),
        }
    }

    /// Run `f` on a working copy of `target`, then admit the change only if
    /// every resulting delta is within capability.
    ///
    /// A target holding meta-zone values cannot be modified as a whole: the
    /// closure would see diagnostics it may not read.
    pub(crate) fn modify<R, F>(&self, view_path: &Path, target: &Path, f: F) -> Result<R>
    where
        F: FnOnce(&mut Value) -> R,
    {
        let before = {
            let mut state = self.state.lock();
            self.stale(&state, target)?;
            let caps = self.capability_locked(&mut state, target)?;
            self.require(target, caps, Capability::READ)?;
            let before = self.effective(&state, target);
            let hides = before
                .as_ref()
                .is_some_and(|v| without_unreadable(self.resolver.zones(), v).is_some());
            if hides && !self.admin {
                return Err(Error::CapabilityDenied {
                    path: target.clone(),
                    missing: Capability::READ,
                    grant_hint: "holds meta zone values no unit of work may read; modify its data children instead"
                        .to_string(),
                });
            }
            before
        };

        // The closure runs without the state lock held.
        let mut working = before.clone().unwrap_or(Value::Null);
        let output = f(&mut working);
        let after = if before.is_none() && working.is_null() {
            None
        } else {
            Some(working)
        };

        let mut changes = Vec::new();
        diff(target, before.as_ref(), after.as_ref(), &mut changes);
        if changes.is_empty() {
            return Ok(output);
        }

        let mut state = self.state.lock();
        self.stale(&state, target)?;
        self.check_changes(&mut state, target, before.as_ref(), &changes)?;

        let root = self.ensure_shadow(&mut state, view_path)?;
        let rel = &target.segments()[root.depth()..];
        match state.shadows.get_mut(&root) {
            Some(shadow) => shadow.replace(&root, rel, after)?,
            None => return Err(missing_shadow(&root)),
        }
        Ok(output)
    }
}

/// Denial for any write a heavy slot cannot take.
fn heavy_denied(path: &Path, op: &DeltaOp) -> Error {
    let missing = match op {
        DeltaOp::Set(_) => Capability::UPDATE,
        DeltaOp::Append(_) => Capability::APPEND,
        DeltaOp::Delete => Capability::DELETE,
    };
    Error::CapabilityDenied {
        path: path.clone(),
        missing,
        grant_hint: "heavy zone values are swapped whole with `set` on the heavy key".to_string(),
    }
}

/// Copy of `value` without keys whose zone is never readable, or `None`
/// when nothing needs to go.
fn without_unreadable(zones: &ZoneTable, value: &Value) -> Option<Value> {
    match value {
        Value::Object(map) => {
            let mut kept: Option<BTreeMap<String, Value>> = None;
            for (key, child) in map.iter() {
                if !zones.classify(key).ceiling().contains(Capability::READ) {
                    kept.get_or_insert_with(|| (**map).clone()).remove(key);
                } else if let Some(child) = without_unreadable(zones, child) {
                    kept.get_or_insert_with(|| (**map).clone())
                        .insert(key.clone(), child);
                }
            }
            kept.map(|map| Value::Object(Arc::new(map)))
        }
        Value::Array(items) => {
            let mut kept: Option<Vec<Value>> = None;
            for (index, item) in items.iter().enumerate() {
                if let Some(item) = without_unreadable(zones, item) {
                    kept.get_or_insert_with(|| (**items).clone())[index] = item;
                }
            }
            kept.map(|items| Value::Array(Arc::new(items)))
        }
        _ => None,
    }
}

fn missing_shadow(root: &Path) -> Error {
    Error::Internal {
        message: format!("shadow `{}` vanished while the transaction lock was held", root),
    }
}

/// One unit of work's transactional workspace.
///
/// Dropping an open transaction discards it.
pub struct Transaction {
    shared: Arc<TxnShared>,
}

impl Transaction {
    /// Open a transaction against the store's current snapshot.
    pub fn open(
        unit: impl Into<String>,
        store: Arc<VersionedStore>,
        resolver: Arc<CapabilityResolver>,
        manifest: Arc<Manifest>,
    ) -> Self {
        let base = store.snapshot();
        let admin = manifest.is_admin();
        let shared = TxnShared {
            id: Uuid::new_v4(),
            unit: unit.into(),
            base,
            store,
            resolver,
            manifest,
            admin,
            state: Mutex::new(TxnState {
                status: TransactionStatus::Open,
                shadows: BTreeMap::new(),
                explicit: Vec::new(),
                caps: FxHashMap::default(),
            }),
        };
        debug!(
            txn_id = %shared.id,
            unit = %shared.unit,
            base = %shared.base.version(),
            admin,
            "Transaction opened"
        );
        Transaction {
            shared: Arc::new(shared),
        }
    }

    /// Unique transaction id.
    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    /// Unit of work this transaction belongs to.
    pub fn unit(&self) -> &str {
        &self.shared.unit
    }

    /// Version of the snapshot the transaction reads from.
    pub fn base_version(&self) -> Version {
        self.shared.base.version()
    }

    /// Snapshot the transaction reads from.
    pub fn base(&self) -> &Arc<Snapshot> {
        &self.shared.base
    }

    /// Current lifecycle state.
    pub fn status(&self) -> TransactionStatus {
        self.shared.state.lock().status
    }

    /// Was the admin override granted?
    pub fn is_admin(&self) -> bool {
        self.shared.admin
    }

    /// Guarded view at the tree root.
    pub fn view(&self) -> Result<GuardedView> {
        let root = Path::root();
        let caps = self.shared.capability(&root)?;
        Ok(GuardedView::new(Arc::clone(&self.shared), root, caps))
    }

    /// Guarded view at `path`.
    pub fn view_at(&self, path: &str) -> Result<GuardedView> {
        let path: Path = path.parse()?;
        TxnShared::check_layer(&path)?;
        let caps = self.shared.capability(&path)?;
        Ok(GuardedView::new(Arc::clone(&self.shared), path, caps))
    }

    /// Record a change stated by the unit of work.
    ///
    /// Heavy-zone changes are applied to the heavy slots immediately.
    pub fn record_explicit(&self, path: Path, op: DeltaOp) -> Result<()> {
        TxnShared::check_layer(&path)?;
        let shared = &self.shared;
        let mut state = shared.state.lock();
        shared.stale(&state, &path)?;
        let caps = shared.capability_locked(&mut state, &path)?;
        let need = match &op {
            DeltaOp::Set(_) => Need::Set,
            DeltaOp::Append(_) => Need::Append,
            DeltaOp::Delete => Need::Delete,
        };
        let needed = shared.needed(&state, &path, need);
        shared.require(&path, caps, needed)?;

        if shared.zone_of(&path) == Zone::Heavy {
            return shared.write_heavy(&path, op).map(|_| ());
        }

        let delta = Delta::explicit(path, op);
        let before = shared.effective(&state, &delta.path);
        shared.check_changes(&mut state, &delta.path, before.as_ref(), std::slice::from_ref(&delta))?;
        state.explicit.push(delta);
        Ok(())
    }

    /// Deltas found by diffing every shadow against its original.
    pub fn infer_deltas(&self) -> Result<Vec<Delta>> {
        let state = self.shared.state.lock();
        self.shared.stale(&state, &Path::root())?;
        let mut out = Vec::new();
        for (root, shadow) in &state.shadows {
            shadow.deltas(root, &mut out);
        }
        Ok(out)
    }

    /// The merged delta set, in the order it would be committed.
    pub fn pending_deltas(&self) -> Result<Vec<Delta>> {
        let state = self.shared.state.lock();
        self.shared.stale(&state, &Path::root())?;

        let mut inferred = Vec::new();
        for (root, shadow) in &state.shadows {
            shadow.deltas(root, &mut inferred);
        }

        let mut out: Vec<Delta> = state
            .explicit
            .iter()
            .filter(|delta| !inferred.iter().any(|i| i.path.overlaps(&delta.path)))
            .cloned()
            .collect();
        let superseded = state.explicit.len() - out.len();
        if superseded > 0 {
            debug!(txn_id = %self.shared.id, superseded, "Explicit deltas superseded by shadows");
        }
        out.extend(inferred);
        Ok(out)
    }

    /// Paths this transaction would write.
    pub fn write_set(&self) -> Result<BTreeSet<Path>> {
        Ok(self
            .pending_deltas()?
            .into_iter()
            .map(|delta| delta.path)
            .collect())
    }

    /// Close without publishing anything.
    pub fn discard(self) {
        self.close(TransactionStatus::Discarded);
    }

    /// Publish the pending deltas under `mode`.
    ///
    /// An empty delta set publishes nothing and returns the base version.
    /// Any failure discards the transaction.
    pub fn commit(self, mode: CommitMode) -> Result<Version> {
        let deltas = match self.pending_deltas() {
            Ok(deltas) => deltas,
            Err(e) => {
                self.close(TransactionStatus::Discarded);
                return Err(e);
            }
        };
        let base = self.base_version();
        if deltas.is_empty() {
            self.close(TransactionStatus::Committed);
            return Ok(base);
        }

        let write_set: BTreeSet<Path> = deltas.iter().map(|d| d.path.clone()).collect();
        let result = self
            .shared
            .store
            .commit_with(&deltas, |check| conflict::validate(mode, base, &write_set, check));

        match result {
            Ok(version) => {
                self.close(TransactionStatus::Committed);
                debug!(
                    txn_id = %self.shared.id,
                    unit = %self.shared.unit,
                    version = %version,
                    deltas = deltas.len(),
                    "Transaction committed"
                );
                Ok(version)
            }
            Err(e) => {
                self.close(TransactionStatus::Discarded);
                if e.is_conflict() {
                    warn!(txn_id = %self.shared.id, unit = %self.shared.unit, error = %e, "Commit conflict");
                }
                Err(e)
            }
        }
    }

    fn close(&self, status: TransactionStatus) {
        let mut state = self.shared.state.lock();
        if !state.status.is_open() {
            return;
        }
        state.status = status;
        state.shadows.clear();
        state.explicit.clear();
        state.caps.clear();
        if status == TransactionStatus::Discarded {
            debug!(txn_id = %self.shared.id, unit = %self.shared.unit, "Transaction discarded");
        }
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        self.close(TransactionStatus::Discarded);
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.shared.id)
            .field("unit", &self.shared.unit)
            .field("base_version", &self.base_version())
            .field("status", &self.status())
            .finish()
    }
}
