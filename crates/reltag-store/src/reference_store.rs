//! Reference store port for reltag
//!
//! `ReferenceStore` is the thin interface over the external commit-graph
//! store. Names handed to it are full tag names (including any subproject
//! prefix); the store knows nothing about versions, environments or states.
//!
//! Implementations are async and backend-agnostic. An in-memory fake is
//! provided for testing via the `fakes` module.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Result type for reference store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Opaque identifier for a point in the commit graph.
///
/// Only compared for equality and used to anchor references.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitRef(String);

impl CommitRef {
    pub fn new(id: impl Into<String>) -> Self {
        CommitRef(id.into())
    }

    /// Return the full identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 chars).
    pub fn short(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(12)
            .map(|(i, _)| i)
            .unwrap_or(self.0.len());
        &self.0[..end]
    }
}

impl std::fmt::Display for CommitRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Shared, externally replicated reference store.
///
/// Guarantees:
/// - `resolve` returns `None` for names that do not exist (never an error).
/// - `create_or_move` with `allow_move = false` never rebinds an existing
///   name to a different commit; it fails with `StoreError::AlreadyExists`.
/// - Binding a name to the commit it already points at is a no-op.
/// - `remote_sync` pushes exactly one name; without `force` the remote
///   rejects it with `StoreError::Conflict` if it holds a different binding.
///
/// There is no transaction or compare-and-swap primitive. Two writers
/// racing on the same name see last-write-wins.
#[async_trait]
pub trait ReferenceStore: Send + Sync {
    /// Resolve a reference name or commit-ish to the commit it designates.
    async fn resolve(&self, name: &str) -> StoreResult<Option<CommitRef>>;

    /// Bind `name` to `commit`, returning the commit it was previously bound to.
    ///
    /// Fails with `CommitNotFound` if `commit` is unknown, and with
    /// `AlreadyExists` if the name is bound elsewhere and `allow_move` is false.
    async fn create_or_move(
        &self,
        name: &str,
        commit: &CommitRef,
        allow_move: bool,
    ) -> StoreResult<Option<CommitRef>>;

    /// List reference names starting with `prefix`, sorted by name.
    async fn list_by_prefix(&self, prefix: &str) -> StoreResult<Vec<String>>;

    /// Propagate the local binding of `name` to the remote replica.
    async fn remote_sync(&self, name: &str, force: bool) -> StoreResult<()>;

    /// Fetch the commit the remote replica currently binds `name` to.
    async fn fetch_remote(&self, name: &str) -> StoreResult<Option<CommitRef>>;
}

#[async_trait]
impl<S> ReferenceStore for std::sync::Arc<S>
where
    S: ReferenceStore + ?Sized,
{
    async fn resolve(&self, name: &str) -> StoreResult<Option<CommitRef>> {
        (**self).resolve(name).await
    }

    async fn create_or_move(
        &self,
        name: &str,
        commit: &CommitRef,
        allow_move: bool,
    ) -> StoreResult<Option<CommitRef>> {
        (**self).create_or_move(name, commit, allow_move).await
    }

    async fn list_by_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
        (**self).list_by_prefix(prefix).await
    }

    async fn remote_sync(&self, name: &str, force: bool) -> StoreResult<()> {
        (**self).remote_sync(name, force).await
    }

    async fn fetch_remote(&self, name: &str) -> StoreResult<Option<CommitRef>> {
        (**self).fetch_remote(name).await
    }
}
