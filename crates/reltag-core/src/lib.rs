//! Reltag Core Library
//!
//! Release lifecycle tracking on top of named references in a commit graph.
//! Three tag families answer the questions a delivery pipeline asks:
//!
//! - version tags (`v1.2.3`): what version is this commit? Immutable.
//! - environment tags (`production`): what is running there? Movable.
//! - state tags (`v1.2.3-stable`): is that version known good? Immutable.
//!
//! All tags may carry a subproject prefix (`services/api/v1.2.3`).

pub mod cancel;
pub mod domain;
pub mod exec_mode;
pub mod obs;
pub mod orchestrator;
pub mod repository;
pub mod rollback;
pub mod telemetry;

pub use cancel::{run_cancellable, CancellationToken};
pub use domain::{
    AssignRequest, EnvironmentAllowList, EnvironmentName, ReleaseState, ReltagError, Result,
    Semver, SubprojectPath, TagKind, TagName, TagTarget, ValidatedRequest,
};
pub use exec_mode::{ExecutionMode, ExecutionModeConfig, ModeScope, ResolvedMode};
pub use orchestrator::{
    AssignOutcome, TagAction, TagAssignmentOrchestrator, TagResult, DEFAULT_OPERATION,
};
pub use repository::{ChangeKind, PlannedAction, TagChange, TagPlan, TagRepository, VersionBinding};
pub use rollback::{RollbackPolicy, RollbackResolver, RollbackTarget};
pub use telemetry::init_tracing;

pub use reltag_store::{CommitRef, GitReferenceStore, ReferenceStore, StoreError};

/// Reltag version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
