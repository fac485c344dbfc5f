//! In-memory fake for the reference store (testing only)
//!
//! `MemoryReferenceStore` keeps a local reference map, a set of known
//! commits and a second map standing in for the remote replica. Tests can
//! play the part of a concurrent writer by editing the remote map directly
//! (`set_remote`) or by queueing sync failures (`fail_next_sync`).

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::error::StoreError;
use crate::reference_store::{CommitRef, ReferenceStore, StoreResult};

#[derive(Debug, Default)]
struct FakeState {
    commits: BTreeSet<CommitRef>,
    head: Option<CommitRef>,
    local: BTreeMap<String, CommitRef>,
    remote: BTreeMap<String, CommitRef>,
    sync_failures: VecDeque<StoreError>,
    mutations: u64,
    syncs: u64,
}

/// In-memory reference store backed by `BTreeMap<name, commit>`.
#[derive(Debug, Default)]
pub struct MemoryReferenceStore {
    state: Mutex<FakeState>,
}

impl MemoryReferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that knows the given commits. The last one becomes `HEAD`.
    pub fn with_commits<I, C>(commits: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<String>,
    {
        let store = Self::new();
        for commit in commits {
            store.add_commit(commit);
        }
        store
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a commit and move `HEAD` to it.
    pub fn add_commit(&self, commit: impl Into<String>) -> CommitRef {
        let commit = CommitRef::new(commit);
        let mut state = self.state();
        state.commits.insert(commit.clone());
        state.head = Some(commit.clone());
        commit
    }

    /// Bind a name on the remote replica only, as another writer would.
    pub fn set_remote(&self, name: &str, commit: impl Into<String>) {
        self.state()
            .remote
            .insert(name.to_string(), CommitRef::new(commit));
    }

    /// Make the next `remote_sync` call fail with `err` before touching the remote.
    pub fn fail_next_sync(&self, err: StoreError) {
        self.state().sync_failures.push_back(err);
    }

    /// Current remote binding of `name`.
    pub fn remote_ref(&self, name: &str) -> Option<CommitRef> {
        self.state().remote.get(name).cloned()
    }

    /// Number of successful local mutations (creates and moves).
    pub fn mutation_count(&self) -> u64 {
        self.state().mutations
    }

    /// Number of `remote_sync` calls, successful or not.
    pub fn sync_count(&self) -> u64 {
        self.state().syncs
    }
}

#[async_trait]
impl ReferenceStore for MemoryReferenceStore {
    async fn resolve(&self, name: &str) -> StoreResult<Option<CommitRef>> {
        let state = self.state();
        if let Some(commit) = state.local.get(name) {
            return Ok(Some(commit.clone()));
        }
        if name == "HEAD" {
            return Ok(state.head.clone());
        }
        Ok(state.commits.get(&CommitRef::new(name)).cloned())
    }

    async fn create_or_move(
        &self,
        name: &str,
        commit: &CommitRef,
        allow_move: bool,
    ) -> StoreResult<Option<CommitRef>> {
        if name.is_empty() || name.starts_with('/') || name.ends_with('/') {
            return Err(StoreError::InvalidName(name.to_string()));
        }
        let mut state = self.state();
        if !state.commits.contains(commit) {
            return Err(StoreError::CommitNotFound {
                commit: commit.to_string(),
            });
        }
        let previous = state.local.get(name).cloned();
        match &previous {
            Some(existing) if existing == commit => return Ok(previous),
            Some(existing) if !allow_move => {
                return Err(StoreError::AlreadyExists {
                    name: name.to_string(),
                    existing: existing.clone(),
                });
            }
            _ => {}
        }
        state.local.insert(name.to_string(), commit.clone());
        state.mutations += 1;
        Ok(previous)
    }

    async fn list_by_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let state = self.state();
        Ok(state
            .local
            .keys()
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn remote_sync(&self, name: &str, force: bool) -> StoreResult<()> {
        let mut state = self.state();
        state.syncs += 1;
        if let Some(err) = state.sync_failures.pop_front() {
            return Err(err);
        }
        let local = state
            .local
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                name: name.to_string(),
            })?;
        match state.remote.get(name) {
            Some(remote) if *remote != local && !force => Err(StoreError::Conflict {
                name: name.to_string(),
            }),
            _ => {
                state.remote.insert(name.to_string(), local);
                Ok(())
            }
        }
    }

    async fn fetch_remote(&self, name: &str) -> StoreResult<Option<CommitRef>> {
        Ok(self.state().remote.get(name).cloned())
    }
}
