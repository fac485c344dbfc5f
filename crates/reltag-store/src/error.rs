//! Error types for reltag-store

use thiserror::Error;

use crate::reference_store::CommitRef;

/// Errors that can occur while talking to a reference store
#[derive(Error, Debug)]
pub enum StoreError {
    /// The named reference does not exist locally
    #[error("Reference not found: {name}")]
    NotFound { name: String },

    /// A create without move permission hit an existing reference
    #[error("Reference {name} already exists at {existing}")]
    AlreadyExists { name: String, existing: CommitRef },

    /// The commit a reference should point at is unknown to the store
    #[error("Commit not found: {commit}")]
    CommitNotFound { commit: String },

    /// The remote replica rejected the update (it holds a different binding)
    #[error("Remote rejected update of {name}")]
    Conflict { name: String },

    /// The remote replica could not be reached
    #[error("Remote unreachable: {0}")]
    Network(String),

    /// A backend command exceeded its time budget
    #[error("Operation {operation} timed out after {secs}s")]
    Timeout { operation: String, secs: u64 },

    /// A backend command failed for a reason not covered above
    #[error("Backend command failed: {0}")]
    Command(String),

    /// The reference name is not acceptable to the backend
    #[error("Invalid reference name: {0}")]
    InvalidName(String),

    /// I/O error spawning or talking to the backend
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Whether the error came from the remote replica rather than the local store.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            StoreError::Conflict { .. } | StoreError::Network(_) | StoreError::Timeout { .. }
        )
    }
}
