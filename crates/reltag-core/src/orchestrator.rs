//! Tag assignment orchestration.
//!
//! Entry point for pipeline steps: resolves the execution mode, validates
//! the request, applies it through the [`TagRepository`] and propagates the
//! result to the remote replica.
//!
//! Remote propagation follows a weak consistency contract. Immutable tags
//! are pushed once and a rejection is a hard `RemoteSyncConflict`: a second
//! writer binding the same version elsewhere is a duplicate release, not a
//! transient race. Environment tags get exactly one retry: re-read the
//! remote, and if it differs from what this run set, overwrite it
//! (last write wins). Deploys to one environment must be serialized
//! upstream if stronger guarantees are needed.

use reltag_store::{CommitRef, ReferenceStore, StoreError};
use serde::Serialize;
use tracing::{debug, Instrument};

use crate::cancel::{run_cancellable, CancellationToken};
use crate::domain::{
    AssignRequest, EnvironmentAllowList, ReltagError, Result, TagKind, TagName, ValidatedRequest,
};
use crate::exec_mode::{ExecutionMode, ExecutionModeConfig};
use crate::obs;
use crate::repository::{ChangeKind, PlannedAction, TagRepository};

/// Operation name used for mode lookup unless overridden.
pub const DEFAULT_OPERATION: &str = "assign-tag";

/// What an assignment did (or would do).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TagAction {
    Created,
    Moved,
    Unchanged,
    WouldCreate,
    WouldMove,
    Simulated,
}

impl TagAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TagAction::Created => "created",
            TagAction::Moved => "moved",
            TagAction::Unchanged => "unchanged",
            TagAction::WouldCreate => "would_create",
            TagAction::WouldMove => "would_move",
            TagAction::Simulated => "simulated",
        }
    }
}

impl From<ChangeKind> for TagAction {
    fn from(change: ChangeKind) -> Self {
        match change {
            ChangeKind::Created => TagAction::Created,
            ChangeKind::Moved => TagAction::Moved,
            ChangeKind::Unchanged => TagAction::Unchanged,
        }
    }
}

/// Structured result of a tag assignment, printed as step outputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagResult {
    pub tag_type: TagKind,
    pub tag_name: String,
    pub commit: String,
    pub prior_commit: Option<String>,
    pub action: TagAction,
    pub mode: ExecutionMode,
}

impl TagResult {
    /// Output pairs in a stable order. `prior_commit` is omitted when absent.
    pub fn key_values(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("tag_type", self.tag_type.to_string()),
            ("tag_name", self.tag_name.clone()),
            ("commit", self.commit.clone()),
        ];
        if let Some(prior) = &self.prior_commit {
            pairs.push(("prior_commit", prior.clone()));
        }
        pairs.push(("action", self.action.as_str().to_string()));
        pairs.push(("mode", self.mode.to_string()));
        pairs
    }

    /// Line-oriented `key=value` rendering.
    pub fn to_output_lines(&self) -> String {
        self.key_values()
            .into_iter()
            .map(|(key, value)| format!("{key}={value}\n"))
            .collect()
    }
}

/// Result of [`TagAssignmentOrchestrator::assign`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignOutcome {
    Completed(TagResult),
    /// `SKIP` mode: nothing done, nothing to report.
    Skipped,
}

impl AssignOutcome {
    pub fn result(&self) -> Option<&TagResult> {
        match self {
            AssignOutcome::Completed(result) => Some(result),
            AssignOutcome::Skipped => None,
        }
    }
}

/// Validates, applies and publishes tag assignment requests.
pub struct TagAssignmentOrchestrator<S> {
    repository: TagRepository<S>,
    modes: ExecutionModeConfig,
    environments: EnvironmentAllowList,
    operation: String,
    remote_sync: bool,
}

impl<S> TagAssignmentOrchestrator<S>
where
    S: ReferenceStore,
{
    pub fn new(store: S, modes: ExecutionModeConfig) -> Self {
        Self {
            repository: TagRepository::new(store),
            modes,
            environments: EnvironmentAllowList::default(),
            operation: DEFAULT_OPERATION.to_string(),
            remote_sync: true,
        }
    }

    pub fn with_environments(mut self, environments: EnvironmentAllowList) -> Self {
        self.environments = environments;
        self
    }

    /// Operation name used for execution mode lookup.
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = operation.into();
        self
    }

    /// Skip remote propagation (repositories without a remote).
    pub fn without_remote_sync(mut self) -> Self {
        self.remote_sync = false;
        self
    }

    pub fn repository(&self) -> &TagRepository<S> {
        &self.repository
    }

    pub fn environments(&self) -> &EnvironmentAllowList {
        &self.environments
    }

    pub async fn assign(
        &self,
        request: &AssignRequest,
        cancel: &CancellationToken,
    ) -> Result<AssignOutcome> {
        let resolved = self.modes.resolve(&self.operation)?;
        obs::emit_mode_resolved(&self.operation, resolved.mode, resolved.scope.as_deref());

        match resolved.mode {
            ExecutionMode::Skip => return Ok(AssignOutcome::Skipped),
            ExecutionMode::SimulatePass => {
                return Ok(AssignOutcome::Completed(TagResult {
                    tag_type: request.kind,
                    tag_name: request.display_name(),
                    commit: request.commitish().to_string(),
                    prior_commit: None,
                    action: TagAction::Simulated,
                    mode: resolved.mode,
                }))
            }
            ExecutionMode::SimulateFail => {
                return Err(ReltagError::SimulatedFailure {
                    operation: self.operation.clone(),
                })
            }
            ExecutionMode::SimulateTimeout => {
                debug!(operation = %self.operation, "blocking until cancelled");
                cancel.cancelled().await;
                return Err(ReltagError::Cancelled);
            }
            ExecutionMode::DryRun | ExecutionMode::Execute => {}
        }

        let validated = request.validate(&self.environments)?;
        let span = obs::assign_span(&validated.tag.to_string(), validated.tag.kind().as_str());
        self.run_validated(validated, resolved.mode, cancel)
            .instrument(span)
            .await
    }

    async fn run_validated(
        &self,
        validated: ValidatedRequest,
        mode: ExecutionMode,
        cancel: &CancellationToken,
    ) -> Result<AssignOutcome> {
        let tag = validated.tag;
        let commit = run_cancellable(cancel, self.resolve_commit(&validated.commitish)).await?;
        let plan = run_cancellable(
            cancel,
            self.repository.plan(&tag, &commit, validated.force_move),
        )
        .await?;

        if mode == ExecutionMode::DryRun {
            let action = match plan.action {
                PlannedAction::Create => TagAction::WouldCreate,
                PlannedAction::Move { .. } => TagAction::WouldMove,
                PlannedAction::Unchanged => TagAction::Unchanged,
            };
            obs::emit_tag_planned(&plan.tag.to_string(), commit.as_str(), action.as_str());
            return Ok(AssignOutcome::Completed(TagResult {
                tag_type: tag.kind(),
                tag_name: tag.to_string(),
                commit: commit.to_string(),
                prior_commit: plan.prior_commit().map(ToString::to_string),
                action,
                mode,
            }));
        }

        let change = run_cancellable(cancel, self.repository.apply(&plan)).await?;
        let action = TagAction::from(change.change);
        obs::emit_tag_assigned(
            &change.tag.to_string(),
            change.commit.as_str(),
            change.prior_commit.as_ref().map(CommitRef::as_str),
            action.as_str(),
        );

        if self.remote_sync {
            run_cancellable(cancel, self.sync(&tag, &commit)).await?;
        }

        Ok(AssignOutcome::Completed(TagResult {
            tag_type: tag.kind(),
            tag_name: tag.to_string(),
            commit: change.commit.to_string(),
            prior_commit: change.prior_commit.map(|c| c.to_string()),
            action,
            mode,
        }))
    }

    async fn resolve_commit(&self, commitish: &str) -> Result<CommitRef> {
        self.repository
            .store()
            .resolve(commitish)
            .await?
            .ok_or_else(|| ReltagError::CommitNotFound(commitish.to_string()))
    }

    /// Push `tag` to the remote, with one re-resolving retry for movable tags.
    async fn sync(&self, tag: &TagName, commit: &CommitRef) -> Result<()> {
        let name = tag.to_string();
        let store = self.repository.store();

        let first = store.remote_sync(&name, false).await;
        let err = match first {
            Ok(()) => return Ok(()),
            Err(StoreError::Conflict { .. }) if tag.is_movable() => {
                let remote = store
                    .fetch_remote(&name)
                    .await
                    .map_err(|e| sync_error(&name, e))?;
                obs::emit_sync_retry(&name, remote.as_ref().map(CommitRef::as_str));
                if remote.as_ref() == Some(commit) {
                    return Ok(());
                }
                match store.remote_sync(&name, true).await {
                    Ok(()) => return Ok(()),
                    Err(e) => sync_error(&name, e),
                }
            }
            Err(e) => sync_error(&name, e),
        };
        obs::emit_sync_failed(&name, &err);
        Err(err)
    }
}

fn sync_error(name: &str, err: StoreError) -> ReltagError {
    match err {
        StoreError::Conflict { .. } => ReltagError::RemoteSyncConflict {
            tag: name.to_string(),
        },
        other => ReltagError::RemoteSyncFailed {
            tag: name.to_string(),
            reason: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec_mode::ModeScope;
    use reltag_store::fakes::MemoryReferenceStore;

    fn orchestrator(mode: Option<&str>) -> TagAssignmentOrchestrator<MemoryReferenceStore> {
        let scopes = mode
            .map(|m| vec![ModeScope::global("global", m)])
            .unwrap_or_default();
        TagAssignmentOrchestrator::new(
            MemoryReferenceStore::with_commits(["c1", "c2"]),
            ExecutionModeConfig::new(scopes),
        )
    }

    #[test]
    fn output_lines_are_ordered_key_values() {
        let result = TagResult {
            tag_type: TagKind::Environment,
            tag_name: "staging".to_string(),
            commit: "c2".to_string(),
            prior_commit: Some("c1".to_string()),
            action: TagAction::Moved,
            mode: ExecutionMode::Execute,
        };
        assert_eq!(
            result.to_output_lines(),
            "tag_type=environment\ntag_name=staging\ncommit=c2\nprior_commit=c1\naction=moved\nmode=EXECUTE\n"
        );
    }

    #[tokio::test]
    async fn execute_defaults_commit_to_head() {
        let orch = orchestrator(None);
        let outcome = orch
            .assign(
                &AssignRequest::version_tag("1.0.0"),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        let result = outcome.result().unwrap();
        assert_eq!(result.tag_name, "v1.0.0");
        assert_eq!(result.commit, "c2");
        assert_eq!(result.action, TagAction::Created);
        assert_eq!(
            orch.repository().store().remote_ref("v1.0.0"),
            Some(CommitRef::new("c2"))
        );
    }

    #[tokio::test]
    async fn skip_does_nothing() {
        let orch = orchestrator(Some("SKIP"));
        let outcome = orch
            .assign(
                &AssignRequest::version_tag("not-a-version"),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(outcome, AssignOutcome::Skipped);
        assert_eq!(orch.repository().store().mutation_count(), 0);
    }

    #[tokio::test]
    async fn unknown_mode_is_reported() {
        let orch = orchestrator(Some("SOMETIMES"));
        let err = orch
            .assign(
                &AssignRequest::version_tag("1.0.0"),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ReltagError::UnknownExecutionMode { .. }));
    }
}
