//! Semantic versions as they appear in release tags.
//!
//! Ordering differs from semver.org on purpose: two prereleases compare as
//! plain strings, so `rc.10 < rc.9`. A release is always greater than any
//! prerelease of the same `major.minor.patch`.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::error::{ReltagError, Result};

fn semver_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^v?([0-9]+)\.([0-9]+)\.([0-9]+)(?:-([A-Za-z0-9.-]+))?$")
            .unwrap_or_else(|e| unreachable!("semver pattern is valid: {e}"))
    })
}

/// A `major.minor.patch[-prerelease]` version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Semver {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub prerelease: Option<String>,
}

impl Semver {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            prerelease: None,
        }
    }

    /// Attach a prerelease label. The label is validated when the version is parsed or composed.
    pub fn with_prerelease(mut self, prerelease: impl Into<String>) -> Self {
        self.prerelease = Some(prerelease.into());
        self
    }

    /// Parse `v?MAJOR.MINOR.PATCH[-prerelease]`.
    pub fn parse(text: &str) -> Result<Self> {
        let caps = semver_regex()
            .captures(text)
            .ok_or_else(|| ReltagError::InvalidSemver(text.to_string()))?;
        let number = |idx: usize| -> Result<u64> {
            caps[idx]
                .parse::<u64>()
                .map_err(|_| ReltagError::InvalidSemver(text.to_string()))
        };
        Ok(Self {
            major: number(1)?,
            minor: number(2)?,
            patch: number(3)?,
            prerelease: caps.get(4).map(|m| m.as_str().to_string()),
        })
    }

    pub fn is_prerelease(&self) -> bool {
        self.prerelease.is_some()
    }

    /// Total order used for sorting and rollback selection.
    pub fn compare(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then(self.minor.cmp(&other.minor))
            .then(self.patch.cmp(&other.patch))
            .then_with(|| match (&self.prerelease, &other.prerelease) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(a), Some(b)) => a.cmp(b),
            })
    }
}

impl Ord for Semver {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

impl PartialOrd for Semver {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Always renders with the `v` prefix, so `format(parse(s))` is the normalized form of `s`.
impl fmt::Display for Semver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(pre) = &self.prerelease {
            write!(f, "-{pre}")?;
        }
        Ok(())
    }
}

impl FromStr for Semver {
    type Err = ReltagError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Semver {
    type Error = ReltagError;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<Semver> for String {
    fn from(v: Semver) -> Self {
        v.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Semver {
        Semver::parse(s).unwrap()
    }

    #[test]
    fn parse_with_and_without_prefix() {
        assert_eq!(v("v1.2.3"), Semver::new(1, 2, 3));
        assert_eq!(v("1.2.3"), Semver::new(1, 2, 3));
        assert_eq!(
            v("v2.0.0-alpha.1"),
            Semver::new(2, 0, 0).with_prerelease("alpha.1")
        );
    }

    #[test]
    fn parse_rejects_malformed_input() {
        for bad in [
            "",
            "v1",
            "v1.2",
            "1.2.3.4",
            "v1.2.3-",
            "v1.2.3+build",
            "V1.2.3",
            "v1.2.3-rc_1",
            " v1.2.3",
            "v99999999999999999999.0.0",
        ] {
            assert!(
                matches!(Semver::parse(bad), Err(ReltagError::InvalidSemver(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn format_normalizes() {
        assert_eq!(v("1.2.3").to_string(), "v1.2.3");
        assert_eq!(v("v01.002.3").to_string(), "v1.2.3");
        assert_eq!(v("v1.0.0-rc.1").to_string(), "v1.0.0-rc.1");
    }

    #[test]
    fn parse_format_round_trip() {
        for s in ["v0.0.0", "v1.2.3", "v10.20.30-beta-2", "v1.0.0-0.3.7"] {
            let parsed = v(s);
            assert_eq!(Semver::parse(&parsed.to_string()).unwrap(), parsed);
        }
    }

    #[test]
    fn ordering_chain() {
        let chain = ["v1.2.3", "v1.2.4", "v2.0.0-alpha", "v2.0.0"];
        for pair in chain.windows(2) {
            assert!(v(pair[0]) < v(pair[1]), "{} < {}", pair[0], pair[1]);
            assert!(v(pair[1]) > v(pair[0]));
        }
        assert!(v("v1.2.3") < v("v2.0.0"));
    }

    #[test]
    fn numeric_components_compare_numerically() {
        assert!(v("v1.10.0") > v("v1.9.0"));
        assert!(v("v1.0.10") > v("v1.0.9"));
    }

    #[test]
    fn prereleases_compare_lexicographically() {
        assert!(v("v1.0.0-alpha") < v("v1.0.0-beta"));
        assert!(v("v1.0.0-rc.10") < v("v1.0.0-rc.9"));
        assert_eq!(v("v1.0.0-rc.1").cmp(&v("1.0.0-rc.1")), Ordering::Equal);
    }

    #[test]
    fn serde_uses_tag_form() {
        let json = serde_json::to_string(&v("1.2.3-rc.1")).unwrap();
        assert_eq!(json, "\"v1.2.3-rc.1\"");
        let back: Semver = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v("v1.2.3-rc.1"));
        assert!(serde_json::from_str::<Semver>("\"latest\"").is_err());
    }
}
