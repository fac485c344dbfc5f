//! Domain models for reltag.
//!
//! Canonical definitions for the core entities:
//! - `Semver`: Totally ordered release version
//! - `TagName`: Version, environment and state tag shapes
//! - `AssignRequest`: A pipeline step's request to create or move a tag

pub mod error;
pub mod naming;
pub mod request;
pub mod semver;

pub use error::{ReltagError, Result};
pub use naming::{
    version_prefix, EnvironmentAllowList, EnvironmentName, ReleaseState, SubprojectPath, TagKind,
    TagName, TagTarget,
};
pub use request::{AssignRequest, ValidatedRequest, DEFAULT_COMMITISH};
pub use semver::Semver;
