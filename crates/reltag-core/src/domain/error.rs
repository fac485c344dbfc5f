//! Domain-level error taxonomy for reltag.

use reltag_store::{CommitRef, StoreError};

/// Reltag domain errors.
#[derive(Debug, thiserror::Error)]
pub enum ReltagError {
    #[error("invalid semver: {0}")]
    InvalidSemver(String),

    #[error("invalid environment name '{name}' (allowed: {allowed})")]
    InvalidEnvironmentName { name: String, allowed: String },

    #[error("invalid subproject path: {0}")]
    InvalidSubprojectPath(String),

    #[error("invalid tag name: {0}")]
    InvalidTagName(String),

    #[error("{kind} tag request is missing required field: {field}")]
    MissingField { kind: String, field: &'static str },

    #[error("commit not found: {0}")]
    CommitNotFound(String),

    #[error("tag {tag} is immutable and already bound to {existing}")]
    AlreadyImmutable { tag: String, existing: CommitRef },

    #[error("state tag {tag} requires version tag {version_tag}, which does not exist")]
    ParentMissing { tag: String, version_tag: String },

    #[error("state tag {tag} must point at {expected} (its version's commit), got {actual}")]
    CommitMismatch {
        tag: String,
        expected: CommitRef,
        actual: CommitRef,
    },

    #[error("environment tag {tag} points at {current}; moving it to {requested} requires force-move")]
    Rejected {
        tag: String,
        current: CommitRef,
        requested: CommitRef,
    },

    #[error("environment tag {tag} is not bound to any released version")]
    Unbound { tag: String },

    #[error("no rollback candidate for environment tag {tag}")]
    NoCandidate { tag: String },

    #[error("remote rejected update of {tag}")]
    RemoteSyncConflict { tag: String },

    #[error("remote sync of {tag} failed: {reason}")]
    RemoteSyncFailed { tag: String, reason: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("unknown execution mode '{value}' in scope {scope}")]
    UnknownExecutionMode { scope: String, value: String },

    #[error("simulated failure for operation {operation}")]
    SimulatedFailure { operation: String },

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl ReltagError {
    /// Process exit code reported to the calling pipeline.
    ///
    /// `1` validation, `2` immutability conflict, `3` missing parent,
    /// `4` remote sync failure or cancellation. Everything else is `1`.
    pub fn exit_code(&self) -> i32 {
        match self {
            ReltagError::AlreadyImmutable { .. }
            | ReltagError::Rejected { .. }
            | ReltagError::CommitMismatch { .. } => 2,
            ReltagError::ParentMissing { .. } => 3,
            ReltagError::RemoteSyncConflict { .. }
            | ReltagError::RemoteSyncFailed { .. }
            | ReltagError::Cancelled => 4,
            _ => 1,
        }
    }

    /// Whether the error was detected before any mutating store call.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ReltagError::InvalidSemver(_)
                | ReltagError::InvalidEnvironmentName { .. }
                | ReltagError::InvalidSubprojectPath(_)
                | ReltagError::InvalidTagName(_)
                | ReltagError::MissingField { .. }
                | ReltagError::CommitNotFound(_)
        )
    }
}

/// Result type for reltag domain operations.
pub type Result<T> = std::result::Result<T, ReltagError>;
