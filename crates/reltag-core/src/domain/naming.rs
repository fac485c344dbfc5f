//! Tag name shapes.
//!
//! ```text
//! version_tag     := [subproject "/"] "v" major "." minor "." patch ["-" prerelease]
//! environment_tag := [subproject "/"] environment_name
//! state_tag       := [subproject "/"] "v" major "." minor "." patch ["-" prerelease] "-" state
//! ```
//!
//! A prerelease may not end in a state suffix, otherwise `v1.0.0-stable`
//! would read both as a version and as a state tag.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::{ReltagError, Result};
use super::semver::Semver;

/// Kind discriminant of a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagKind {
    Version,
    Environment,
    State,
}

impl TagKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TagKind::Version => "version",
            TagKind::Environment => "environment",
            TagKind::State => "state",
        }
    }

    /// Environment tags move on every deploy; version and state tags never do.
    pub fn is_movable(&self) -> bool {
        matches!(self, TagKind::Environment)
    }
}

impl fmt::Display for TagKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TagKind {
    type Err = ReltagError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "version" => Ok(TagKind::Version),
            "environment" => Ok(TagKind::Environment),
            "state" => Ok(TagKind::State),
            other => Err(ReltagError::InvalidTagName(format!(
                "unknown tag type: {other}"
            ))),
        }
    }
}

/// Lifecycle label attached to a released version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseState {
    Stable,
    Unstable,
    Deprecated,
}

impl ReleaseState {
    /// All states, in the order `state_of` prefers them.
    pub const ALL: [ReleaseState; 3] = [
        ReleaseState::Stable,
        ReleaseState::Unstable,
        ReleaseState::Deprecated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReleaseState::Stable => "stable",
            ReleaseState::Unstable => "unstable",
            ReleaseState::Deprecated => "deprecated",
        }
    }
}

impl fmt::Display for ReleaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReleaseState {
    type Err = ReltagError;

    fn from_str(s: &str) -> Result<Self> {
        ReleaseState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| ReltagError::InvalidTagName(format!("unknown state: {s}")))
    }
}

/// Mono-repo component prefix, e.g. `services/api`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SubprojectPath(String);

impl SubprojectPath {
    pub fn parse(path: &str) -> Result<Self> {
        let invalid = || ReltagError::InvalidSubprojectPath(path.to_string());
        if path.is_empty() || path.starts_with('/') || path.ends_with('/') {
            return Err(invalid());
        }
        let segment_ok = |seg: &str| {
            !seg.is_empty()
                && seg != "."
                && seg != ".."
                && seg
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        };
        if !path.split('/').all(segment_ok) {
            return Err(invalid());
        }
        Ok(SubprojectPath(path.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubprojectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SubprojectPath {
    type Error = ReltagError;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<SubprojectPath> for String {
    fn from(p: SubprojectPath) -> Self {
        p.0
    }
}

/// Syntactically valid environment name. Membership in the allow-list is
/// checked separately by [`EnvironmentAllowList::check`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EnvironmentName(String);

impl EnvironmentName {
    pub fn parse(name: &str) -> Result<Self> {
        let mut chars = name.chars();
        let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
            && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'));
        if !valid {
            return Err(ReltagError::InvalidEnvironmentName {
                name: name.to_string(),
                allowed: "a letter followed by letters, digits, '-' or '_'".to_string(),
            });
        }
        Ok(EnvironmentName(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EnvironmentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for EnvironmentName {
    type Error = ReltagError;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<EnvironmentName> for String {
    fn from(e: EnvironmentName) -> Self {
        e.0
    }
}

/// Environments a pipeline may deploy to. Provided configuration, not policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentAllowList {
    names: Vec<String>,
}

impl EnvironmentAllowList {
    pub const DEFAULT: [&'static str; 5] =
        ["production", "staging", "canary", "sandbox", "performance"];

    pub fn new<I, N>(names: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse a comma-separated list, ignoring blanks.
    pub fn from_csv(csv: &str) -> Self {
        Self::new(
            csv.split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty()),
        )
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|allowed| allowed == name)
    }

    /// Parse `name` and require it to be on the list.
    pub fn check(&self, name: &str) -> Result<EnvironmentName> {
        let env = EnvironmentName::parse(name).map_err(|_| self.rejection(name))?;
        if !self.contains(env.as_str()) {
            return Err(self.rejection(name));
        }
        Ok(env)
    }

    fn rejection(&self, name: &str) -> ReltagError {
        ReltagError::InvalidEnvironmentName {
            name: name.to_string(),
            allowed: self.names.join(", "),
        }
    }
}

impl Default for EnvironmentAllowList {
    fn default() -> Self {
        Self::new(Self::DEFAULT)
    }
}

/// What a tag designates, one variant per kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TagTarget {
    Version(Semver),
    Environment(EnvironmentName),
    State { version: Semver, state: ReleaseState },
}

impl TagTarget {
    pub fn kind(&self) -> TagKind {
        match self {
            TagTarget::Version(_) => TagKind::Version,
            TagTarget::Environment(_) => TagKind::Environment,
            TagTarget::State { .. } => TagKind::State,
        }
    }
}

/// A fully composed tag name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TagName {
    subproject: Option<SubprojectPath>,
    target: TagTarget,
}

/// The state a prerelease label would be mistaken for, if any.
fn state_suffix(prerelease: &str) -> Option<(Option<&str>, ReleaseState)> {
    ReleaseState::ALL.into_iter().find_map(|state| {
        if prerelease == state.as_str() {
            return Some((None, state));
        }
        prerelease
            .strip_suffix(state.as_str())
            .and_then(|rest| rest.strip_suffix('-'))
            .filter(|rest| !rest.is_empty())
            .map(|rest| (Some(rest), state))
    })
}

fn check_unambiguous(version: &Semver) -> Result<()> {
    match version.prerelease.as_deref().and_then(state_suffix) {
        Some((_, state)) => Err(ReltagError::InvalidSemver(format!(
            "{version}: prerelease may not end in state suffix '{state}'"
        ))),
        None => Ok(()),
    }
}

impl TagName {
    /// Compose a tag name. Fails if a version's prerelease collides with a state suffix.
    pub fn compose(subproject: Option<SubprojectPath>, target: TagTarget) -> Result<Self> {
        match &target {
            TagTarget::Version(version) | TagTarget::State { version, .. } => {
                check_unambiguous(version)?;
            }
            TagTarget::Environment(_) => {}
        }
        Ok(Self { subproject, target })
    }

    pub fn version(subproject: Option<&SubprojectPath>, version: &Semver) -> Result<Self> {
        Self::compose(subproject.cloned(), TagTarget::Version(version.clone()))
    }

    pub fn environment(subproject: Option<&SubprojectPath>, environment: &EnvironmentName) -> Self {
        Self {
            subproject: subproject.cloned(),
            target: TagTarget::Environment(environment.clone()),
        }
    }

    pub fn state(
        subproject: Option<&SubprojectPath>,
        version: &Semver,
        state: ReleaseState,
    ) -> Result<Self> {
        Self::compose(
            subproject.cloned(),
            TagTarget::State {
                version: version.clone(),
                state,
            },
        )
    }

    /// Split a tag name back into its parts. Inverse of [`TagName::compose`].
    pub fn decompose(name: &str) -> Result<Self> {
        let (subproject, leaf) = match name.rsplit_once('/') {
            Some((prefix, leaf)) => (
                Some(
                    SubprojectPath::parse(prefix)
                        .map_err(|_| ReltagError::InvalidTagName(name.to_string()))?,
                ),
                leaf,
            ),
            None => (None, name),
        };

        if leaf.starts_with('v') {
            if let Ok(version) = Semver::parse(leaf) {
                let target = match version.prerelease.as_deref().and_then(state_suffix) {
                    Some((rest, state)) => TagTarget::State {
                        version: Semver {
                            prerelease: rest.map(str::to_string),
                            ..version
                        },
                        state,
                    },
                    None => TagTarget::Version(version),
                };
                return Ok(Self { subproject, target });
            }
        }

        let environment = EnvironmentName::parse(leaf)
            .map_err(|_| ReltagError::InvalidTagName(name.to_string()))?;
        Ok(Self {
            subproject,
            target: TagTarget::Environment(environment),
        })
    }

    pub fn kind(&self) -> TagKind {
        self.target.kind()
    }

    pub fn subproject(&self) -> Option<&SubprojectPath> {
        self.subproject.as_ref()
    }

    pub fn target(&self) -> &TagTarget {
        &self.target
    }

    /// The version this tag names or annotates.
    pub fn semver(&self) -> Option<&Semver> {
        match &self.target {
            TagTarget::Version(version) | TagTarget::State { version, .. } => Some(version),
            TagTarget::Environment(_) => None,
        }
    }

    pub fn is_movable(&self) -> bool {
        self.kind().is_movable()
    }

    /// The version tag a state tag annotates.
    pub fn parent(&self) -> Option<TagName> {
        match &self.target {
            TagTarget::State { version, .. } => Some(TagName {
                subproject: self.subproject.clone(),
                target: TagTarget::Version(version.clone()),
            }),
            _ => None,
        }
    }
}

impl fmt::Display for TagName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(path) = &self.subproject {
            write!(f, "{path}/")?;
        }
        match &self.target {
            TagTarget::Version(version) => write!(f, "{version}"),
            TagTarget::Environment(env) => write!(f, "{env}"),
            TagTarget::State { version, state } => write!(f, "{version}-{state}"),
        }
    }
}

/// Name prefix under which all version and state tags of a subproject live.
pub fn version_prefix(subproject: Option<&SubprojectPath>) -> String {
    match subproject {
        Some(path) => format!("{path}/v"),
        None => "v".to_string(),
    }
}
