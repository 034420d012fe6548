//! Execution context handed to a unit of work

use uuid::Uuid;
use warden_concurrency::{GuardedView, Transaction};
use warden_core::{DeltaOp, Error, Layer, Path, Result, Value, Version};

/// Options for one `execute` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecuteOptions {
    /// Caller identity for starvation arbitration
    pub priority_token: Option<String>,
}

impl ExecuteOptions {
    /// Defaults: no priority token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Identify the caller to the priority arbiter.
    pub fn priority_token(mut self, token: impl Into<String>) -> Self {
        self.priority_token = Some(token.into());
        self
    }
}

/// Scratch state for one attempt of a unit of work.
///
/// Keys are `local.`-layer paths. The scope is created fresh for every
/// attempt and dropped with it; nothing in it reaches the store.
#[derive(Debug, Clone, Default)]
pub struct LocalScope {
    root: Value,
}

impl LocalScope {
    /// Empty scope.
    pub fn new() -> Self {
        Self::default()
    }

    fn local_path(path: &str) -> Result<Path> {
        let path: Path = path.parse()?;
        if path.layer() != Some(Layer::Local) {
            return Err(Error::invalid_path(
                path.to_string(),
                "local scope only holds `local.` paths",
            ));
        }
        Ok(path)
    }

    /// Value at `path`.
    pub fn get(&self, path: &str) -> Result<Option<&Value>> {
        let path = Self::local_path(path)?;
        Ok(self.root.get_path(path.segments()))
    }

    /// Set `path`, creating intermediate objects. Returns the previous value.
    pub fn set(&mut self, path: &str, value: impl Into<Value>) -> Result<Option<Value>> {
        let path = Self::local_path(path)?;
        let (parent, last) = split(&path)?;
        let node = self.root.descend_or_create(&Path::root(), parent.segments())?;
        node.insert_child(&parent, last, value.into())
    }

    /// Push onto the sequence at `path`.
    pub fn push(&mut self, path: &str, value: impl Into<Value>) -> Result<()> {
        let path = Self::local_path(path)?;
        let node = self.root.descend_or_create(&Path::root(), path.segments())?;
        node.push(&path, value.into())
    }

    /// Remove `path`, returning the removed value.
    pub fn remove(&mut self, path: &str) -> Result<Option<Value>> {
        let path = Self::local_path(path)?;
        let (parent, last) = split(&path)?;
        if self.root.get_path(parent.segments()).is_none() {
            return Ok(None);
        }
        let node = self.root.descend_or_create(&Path::root(), parent.segments())?;
        node.remove_child(&parent, last)
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.root = Value::Null;
    }

    /// Is the scope empty?
    pub fn is_empty(&self) -> bool {
        self.root.len().map_or(true, |n| n == 0)
    }
}

fn split(path: &Path) -> Result<(Path, &str)> {
    match (path.parent(), path.last()) {
        (Some(parent), Some(last)) => Ok((parent, last)),
        _ => Err(Error::invalid_path(path.to_string(), "root is not addressable")),
    }
}

/// What a unit of work sees while it runs.
///
/// All state access goes through [`view`](Self::view); the transaction
/// itself stays with the engine.
pub struct UnitContext<'a> {
    txn: &'a Transaction,
    args: &'a Value,
    local: LocalScope,
    attempt: u32,
}

impl<'a> UnitContext<'a> {
    pub(crate) fn new(txn: &'a Transaction, args: &'a Value, attempt: u32) -> Self {
        UnitContext {
            txn,
            args,
            local: LocalScope::new(),
            attempt,
        }
    }

    /// Guarded view at the tree root.
    pub fn view(&self) -> Result<GuardedView> {
        self.txn.view()
    }

    /// Guarded view at `path`.
    pub fn view_at(&self, path: &str) -> Result<GuardedView> {
        self.txn.view_at(path)
    }

    /// Bound arguments.
    pub fn args(&self) -> &Value {
        self.args
    }

    /// Argument at a dotted path.
    pub fn arg(&self, path: &str) -> Option<&Value> {
        let segments: Vec<String> = path.split('.').map(String::from).collect();
        self.args.get_path(&segments)
    }

    /// Scratch scope for this attempt.
    pub fn local(&self) -> &LocalScope {
        &self.local
    }

    /// Mutable scratch scope for this attempt.
    pub fn local_mut(&mut self) -> &mut LocalScope {
        &mut self.local
    }

    /// Record an explicit change. It is visible after commit.
    pub fn record(&self, path: &str, op: DeltaOp) -> Result<()> {
        self.txn.record_explicit(path.parse()?, op)
    }

    /// Transaction id of this attempt.
    pub fn transaction_id(&self) -> Uuid {
        self.txn.id()
    }

    /// Unit of work being executed.
    pub fn unit(&self) -> &str {
        self.txn.unit()
    }

    /// 1-based attempt number.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Version this attempt reads from.
    pub fn base_version(&self) -> Version {
        self.txn.base_version()
    }
}

impl std::fmt::Debug for UnitContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitContext")
            .field("unit", &self.txn.unit())
            .field("txn_id", &self.txn.id())
            .field("attempt", &self.attempt)
            .finish()
    }
}
