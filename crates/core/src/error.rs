//! Error taxonomy for the state engine
//!
//! Every failure the engine can surface is a variant of [`Error`]. Callers
//! route on the variant (or on the helper predicates) rather than on
//! message text.
//!
//! | Variant | Class | Transaction |
//! |---------|-------|-------------|
//! | CapabilityDenied | fatal to the execution | discarded |
//! | StaleView | programmer error | already closed |
//! | VersionMismatch | retryable | discarded |
//! | WriteConflict | retryable | discarded |
//! | HistoryTrimmed | retryable | discarded |
//! | RetryBudgetExceeded | terminal | discarded |
//! | AuditStop / AuditAbort | terminal | discarded |
//! | AuditBlock | terminal for this call | discarded |

use crate::capability::Capability;
use crate::path::Path;
use crate::types::{Version, Zone};
use thiserror::Error;

/// All state engine errors.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Access attempted outside the resolved capability set
    #[error("capability denied on `{path}`: missing {missing} ({grant_hint})")]
    CapabilityDenied {
        /// Path that was accessed
        path: Path,
        /// The capability bits that were required but absent
        missing: Capability,
        /// The manifest entry that would grant the access, or why none can
        grant_hint: String,
    },

    /// A guarded view was used after its transaction closed
    #[error("stale view on `{path}`: transaction {txn_id} is {status}")]
    StaleView {
        /// Path the view was bound to
        path: Path,
        /// Transaction that issued the view
        txn_id: String,
        /// Terminal status of that transaction
        status: String,
    },

    /// Strict commit found a different current version
    #[error("version mismatch: expected {expected}, current is {actual}")]
    VersionMismatch {
        /// Base version the transaction was opened against
        expected: Version,
        /// Version found at commit time
        actual: Version,
    },

    /// Smart commit found an intervening commit touching the write set
    #[error("write conflict on `{path}`: concurrently modified at {version}")]
    WriteConflict {
        /// Path in this transaction's write set
        path: Path,
        /// Version of the intervening commit
        version: Version,
    },

    /// Commit history needed for smart validation has been evicted
    #[error("commit history trimmed: base {requested} predates earliest retained {earliest}")]
    HistoryTrimmed {
        /// Base version whose successors were needed
        requested: Version,
        /// Earliest version still in the commit log
        earliest: Version,
    },

    /// Retries were exhausted without a successful commit
    #[error("retry budget exceeded after {attempts} attempts in {elapsed_ms}ms: {last}")]
    RetryBudgetExceeded {
        /// Attempts made
        attempts: u32,
        /// Wall-clock time spent
        elapsed_ms: u64,
        /// The last retryable error observed
        last: Box<Error>,
    },

    /// Policy violation at Stop severity
    #[error("audit stop on {rule}: {reason}")]
    AuditStop {
        /// Rule key (`unit/target`)
        rule: String,
        /// Violation description
        reason: String,
    },

    /// Policy violation at Abort severity
    #[error("audit abort on {rule}: {reason}")]
    AuditAbort {
        /// Rule key (`unit/target`)
        rule: String,
        /// Violation description
        reason: String,
    },

    /// Policy violation at Block severity after the threshold was reached
    #[error("audit block on {rule} after {count} violations: {reason}")]
    AuditBlock {
        /// Rule key (`unit/target`)
        rule: String,
        /// Violation description
        reason: String,
        /// Counter value that tripped the threshold
        count: u32,
    },

    /// A field name was assigned a second, different zone
    #[error("zone for `{name}` is {current}; reassigning to {requested} requires a schema version bump")]
    ZoneReassigned {
        /// Final segment name
        name: String,
        /// Zone already assigned
        current: Zone,
        /// Zone that was requested
        requested: Zone,
    },

    /// Path syntax or layer invalid
    #[error("invalid path `{path}`: {reason}")]
    InvalidPath {
        /// The offending path text
        path: String,
        /// Why it was rejected
        reason: String,
    },

    /// Operation applied to a value of the wrong shape
    #[error("wrong type at `{path}`: expected {expected}, found {actual}")]
    WrongType {
        /// Path of the value
        path: Path,
        /// Expected shape
        expected: &'static str,
        /// Actual shape
        actual: &'static str,
    },

    /// Value required by an operation does not exist
    #[error("not found: `{path}`")]
    NotFound {
        /// Missing path
        path: Path,
    },

    /// No manifest registered for a unit of work
    #[error("unknown unit of work `{unit}`")]
    UnknownUnit {
        /// Unit identifier
        unit: String,
    },

    /// Configuration could not be parsed or is inconsistent
    #[error("configuration error: {message}")]
    Config {
        /// Description
        message: String,
    },

    /// The unit of work itself failed
    #[error("unit of work failed: {message}")]
    UnitFailed {
        /// Description supplied by the unit of work
        message: String,
    },

    /// Bug or invariant violation
    #[error("internal error: {message}")]
    Internal {
        /// Description
        message: String,
    },
}

/// Result alias used across the workspace.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Build a unit-of-work failure.
    pub fn unit_failed(message: impl Into<String>) -> Self {
        Error::UnitFailed {
            message: message.into(),
        }
    }

    /// Build an invalid-path error.
    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Build a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
        }
    }

    /// Retryable errors may succeed with a fresh transaction.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::VersionMismatch { .. }
                | Error::WriteConflict { .. }
                | Error::HistoryTrimmed { .. }
        )
    }

    /// Check if this is an optimistic concurrency conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Error::VersionMismatch { .. } | Error::WriteConflict { .. }
        )
    }

    /// Check if this is a policy violation.
    pub fn is_audit(&self) -> bool {
        matches!(
            self,
            Error::AuditStop { .. } | Error::AuditAbort { .. } | Error::AuditBlock { .. }
        )
    }

    /// Check if this is a capability failure.
    pub fn is_capability_denied(&self) -> bool {
        matches!(self, Error::CapabilityDenied { .. })
    }

    /// Stable error code for routing and logging.
    pub fn code(&self) -> &'static str {
        match self {
            Error::CapabilityDenied { .. } => "CapabilityDenied",
            Error::StaleView { .. } => "StaleView",
            Error::VersionMismatch { .. } => "VersionMismatch",
            Error::WriteConflict { .. } => "WriteConflict",
            Error::HistoryTrimmed { .. } => "HistoryTrimmed",
            Error::RetryBudgetExceeded { .. } => "RetryBudgetExceeded",
            Error::AuditStop { .. } => "AuditStop",
            Error::AuditAbort { .. } => "AuditAbort",
            Error::AuditBlock { .. } => "AuditBlock",
            Error::ZoneReassigned { .. } => "ZoneReassigned",
            Error::InvalidPath { .. } => "InvalidPath",
            Error::WrongType { .. } => "WrongType",
            Error::NotFound { .. } => "NotFound",
            Error::UnknownUnit { .. } => "UnknownUnit",
            Error::Config { .. } => "Config",
            Error::UnitFailed { .. } => "UnitFailed",
            Error::Internal { .. } => "Internal",
        }
    }
}
