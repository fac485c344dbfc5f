//! Tag assignment requests as issued by a pipeline step.
//!
//! `AssignRequest` is the loose, attribute-style form (every field optional,
//! as it arrives from the command line). `validate` turns it into a
//! `ValidatedRequest` whose `TagName` can only hold the fields its kind needs.

use serde::{Deserialize, Serialize};

use super::error::{ReltagError, Result};
use super::naming::{
    EnvironmentAllowList, ReleaseState, SubprojectPath, TagKind, TagName, TagTarget,
};
use super::semver::Semver;

/// Commit-ish used when a request does not name one.
pub const DEFAULT_COMMITISH: &str = "HEAD";

/// Unvalidated tag assignment request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignRequest {
    pub kind: TagKind,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub subproject: Option<String>,
    #[serde(default)]
    pub commit: Option<String>,
    #[serde(default)]
    pub force_move: bool,
}

/// A request whose shape, names and version syntax have been checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRequest {
    pub tag: TagName,
    pub commitish: String,
    pub force_move: bool,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

impl AssignRequest {
    pub fn version_tag(version: impl Into<String>) -> Self {
        Self::empty(TagKind::Version).with_version(version)
    }

    pub fn environment_tag(environment: impl Into<String>) -> Self {
        Self {
            environment: Some(environment.into()),
            ..Self::empty(TagKind::Environment)
        }
    }

    pub fn state_tag(version: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            state: Some(state.into()),
            ..Self::empty(TagKind::State).with_version(version)
        }
    }

    fn empty(kind: TagKind) -> Self {
        Self {
            kind,
            version: None,
            environment: None,
            state: None,
            subproject: None,
            commit: None,
            force_move: false,
        }
    }

    fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn in_subproject(mut self, subproject: impl Into<String>) -> Self {
        self.subproject = Some(subproject.into());
        self
    }

    pub fn at_commit(mut self, commit: impl Into<String>) -> Self {
        self.commit = Some(commit.into());
        self
    }

    pub fn force_move(mut self, force: bool) -> Self {
        self.force_move = force;
        self
    }

    /// The commit-ish to resolve, defaulting to the current tip.
    pub fn commitish(&self) -> &str {
        non_empty(&self.commit).unwrap_or(DEFAULT_COMMITISH)
    }

    fn require(&self, value: &Option<String>, field: &'static str) -> Result<String> {
        non_empty(value)
            .map(str::to_string)
            .ok_or_else(|| ReltagError::MissingField {
                kind: self.kind.to_string(),
                field,
            })
    }

    /// Check shape and syntax. Performs no store access.
    pub fn validate(&self, environments: &EnvironmentAllowList) -> Result<ValidatedRequest> {
        let subproject = non_empty(&self.subproject)
            .map(SubprojectPath::parse)
            .transpose()?;

        let target = match self.kind {
            TagKind::Version => {
                TagTarget::Version(Semver::parse(&self.require(&self.version, "version")?)?)
            }
            TagKind::Environment => {
                let name = self.require(&self.environment, "environment")?;
                TagTarget::Environment(environments.check(&name)?)
            }
            TagKind::State => {
                let version = Semver::parse(&self.require(&self.version, "version")?)?;
                let state = self
                    .require(&self.state, "state")?
                    .parse::<ReleaseState>()
                    .map_err(|_| {
                        ReltagError::InvalidTagName(format!(
                            "state must be one of stable, unstable, deprecated (got {})",
                            self.state.as_deref().unwrap_or_default()
                        ))
                    })?;
                TagTarget::State { version, state }
            }
        };

        Ok(ValidatedRequest {
            tag: TagName::compose(subproject, target)?,
            commitish: self.commitish().to_string(),
            force_move: self.force_move,
        })
    }

    /// Best-effort tag name for reporting, without validation.
    pub fn display_name(&self) -> String {
        let leaf = match self.kind {
            TagKind::Version => non_empty(&self.version).unwrap_or_default().to_string(),
            TagKind::Environment => non_empty(&self.environment).unwrap_or_default().to_string(),
            TagKind::State => format!(
                "{}-{}",
                non_empty(&self.version).unwrap_or_default(),
                non_empty(&self.state).unwrap_or_default()
            ),
        };
        let leaf = match self.kind {
            TagKind::Version | TagKind::State if !leaf.starts_with('v') => format!("v{leaf}"),
            _ => leaf,
        };
        match non_empty(&self.subproject) {
            Some(path) => format!("{path}/{leaf}"),
            None => leaf,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allow() -> EnvironmentAllowList {
        EnvironmentAllowList::default()
    }

    #[test]
    fn version_request_validates_to_tag() {
        let req = AssignRequest::version_tag("1.2.3")
            .in_subproject("svc")
            .at_commit("abc");
        let validated = req.validate(&allow()).unwrap();
        assert_eq!(validated.tag.to_string(), "svc/v1.2.3");
        assert_eq!(validated.commitish, "abc");
        assert!(!validated.force_move);
    }

    #[test]
    fn missing_fields_are_reported_per_kind() {
        let mut req = AssignRequest::state_tag("v1.0.0", "stable");
        req.state = None;
        let err = req.validate(&allow()).unwrap_err();
        assert!(matches!(err, ReltagError::MissingField { field: "state", .. }));

        let mut req = AssignRequest::environment_tag("staging");
        req.environment = Some("   ".to_string());
        let err = req.validate(&allow()).unwrap_err();
        assert!(matches!(err, ReltagError::MissingField { field: "environment", .. }));
    }

    #[test]
    fn invalid_inputs_map_to_taxonomy() {
        assert!(matches!(
            AssignRequest::version_tag("one.two").validate(&allow()),
            Err(ReltagError::InvalidSemver(_))
        ));
        assert!(matches!(
            AssignRequest::environment_tag("prod").validate(&allow()),
            Err(ReltagError::InvalidEnvironmentName { .. })
        ));
        assert!(matches!(
            AssignRequest::version_tag("1.0.0")
                .in_subproject("/svc")
                .validate(&allow()),
            Err(ReltagError::InvalidSubprojectPath(_))
        ));
        assert!(matches!(
            AssignRequest::state_tag("1.0.0", "broken").validate(&allow()),
            Err(ReltagError::InvalidTagName(_))
        ));
    }

    #[test]
    fn commit_defaults_to_head() {
        let req = AssignRequest::environment_tag("staging");
        assert_eq!(req.commitish(), "HEAD");
        assert_eq!(req.validate(&allow()).unwrap().commitish, "HEAD");
    }

    #[test]
    fn display_name_without_validation() {
        assert_eq!(
            AssignRequest::state_tag("1.0.0", "stable")
                .in_subproject("svc")
                .display_name(),
            "svc/v1.0.0-stable"
        );
        assert_eq!(
            AssignRequest::environment_tag("anywhere").display_name(),
            "anywhere"
        );
    }

    #[test]
    fn request_deserializes_with_defaults() {
        let req: AssignRequest =
            serde_json::from_str(r#"{"kind":"environment","environment":"canary"}"#).unwrap();
        assert_eq!(req, AssignRequest::environment_tag("canary"));
    }
}
