//! Structured observability hooks for tag lifecycle events.
//!
//! This module provides:
//! - An assignment-scoped tracing span via `assign_span`
//! - Emission functions for mode resolution, tag changes, sync retries and rollback picks
//!
//! Events are emitted at `info!` level (override with `RUST_LOG`) and carry a
//! stable `event` field so log pipelines can filter on it.

use tracing::{info, warn};

use crate::domain::{ReleaseState, Semver};
use crate::exec_mode::ExecutionMode;

/// Span for one tag assignment. Attach it with `Instrument::instrument`
/// so it stays correct across `.await` points.
///
/// # Example
///
/// ```ignore
/// work.instrument(assign_span("svc/v1.2.3", "version")).await
/// // every tracing call inside `work` carries tag = "svc/v1.2.3"
/// ```
pub fn assign_span(tag: &str, kind: &str) -> tracing::Span {
    tracing::info_span!("reltag.assign", tag = %tag, kind = %kind)
}

/// Emit event: execution mode chosen for an operation.
pub fn emit_mode_resolved(operation: &str, mode: ExecutionMode, scope: Option<&str>) {
    info!(
        event = "tag.mode_resolved",
        operation = %operation,
        mode = %mode,
        scope = scope.unwrap_or("default"),
    );
}

/// Emit event: a tag was created, moved or confirmed unchanged.
pub fn emit_tag_assigned(tag: &str, commit: &str, prior_commit: Option<&str>, action: &str) {
    info!(
        event = "tag.assigned",
        tag = %tag,
        commit = %commit,
        prior_commit = prior_commit.unwrap_or(""),
        action = %action,
    );
}

/// Emit event: a rehearsal computed a change without applying it.
pub fn emit_tag_planned(tag: &str, commit: &str, action: &str) {
    info!(event = "tag.planned", tag = %tag, commit = %commit, action = %action);
}

/// Emit event: remote rejected a movable tag; re-resolving before one retry.
pub fn emit_sync_retry(tag: &str, remote_commit: Option<&str>) {
    warn!(
        event = "tag.sync_retry",
        tag = %tag,
        remote_commit = remote_commit.unwrap_or(""),
    );
}

/// Emit event: remote sync gave up (warning level).
pub fn emit_sync_failed(tag: &str, error: &dyn std::fmt::Display) {
    warn!(event = "tag.sync_failed", tag = %tag, error = %error);
}

/// Emit event: rollback target chosen for an environment.
pub fn emit_rollback_resolved(
    environment_tag: &str,
    current: &Semver,
    target: &Semver,
    state: Option<ReleaseState>,
) {
    info!(
        event = "rollback.resolved",
        environment_tag = %environment_tag,
        current = %current,
        target = %target,
        state = state.map(|s| s.as_str()).unwrap_or("none"),
    );
}
