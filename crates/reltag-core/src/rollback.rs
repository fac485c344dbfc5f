//! Rollback target resolution.
//!
//! Picks the version an environment should fall back to: never the one
//! already deployed, never a deprecated one (unless allowed), the newest
//! stable one if any exists, and otherwise simply the newest.

use reltag_store::{CommitRef, ReferenceStore};
use serde::Serialize;

use crate::domain::{
    EnvironmentName, ReleaseState, ReltagError, Result, Semver, SubprojectPath, TagName,
};
use crate::obs;
use crate::repository::TagRepository;

/// Selection flags for [`RollbackResolver::resolve_target`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollbackPolicy {
    /// Return the newest stable candidate before falling back to the newest overall.
    pub prefer_stable: bool,
    /// Drop candidates whose preferred state is `deprecated`.
    pub exclude_deprecated: bool,
}

impl Default for RollbackPolicy {
    fn default() -> Self {
        Self {
            prefer_stable: true,
            exclude_deprecated: true,
        }
    }
}

/// The chosen rollback version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RollbackTarget {
    pub version: Semver,
    pub tag_name: String,
    pub commit: CommitRef,
    pub state: Option<ReleaseState>,
    /// The version currently deployed, which the target replaces.
    pub current: Semver,
}

/// Computes rollback targets from the tags in a [`TagRepository`].
pub struct RollbackResolver<'a, S> {
    repository: &'a TagRepository<S>,
}

impl<'a, S> RollbackResolver<'a, S>
where
    S: ReferenceStore,
{
    pub fn new(repository: &'a TagRepository<S>) -> Self {
        Self { repository }
    }

    pub async fn resolve_target(
        &self,
        environment: &EnvironmentName,
        subproject: Option<&SubprojectPath>,
        policy: RollbackPolicy,
    ) -> Result<RollbackTarget> {
        let env_tag = TagName::environment(subproject, environment).to_string();
        let no_candidate = || ReltagError::NoCandidate {
            tag: env_tag.clone(),
        };

        let deployed = match self
            .repository
            .current_version_of(environment, subproject)
            .await
        {
            Ok(binding) => binding,
            Err(ReltagError::Unbound { .. }) => return Err(no_candidate()),
            Err(err) => return Err(err),
        };
        let current = deployed.version;

        // Bindings come back newest first, which is the tie-break order.
        // Every version on the deployed commit counts as current.
        let mut candidates = Vec::new();
        for binding in self.repository.list_version_bindings(subproject).await? {
            if binding.version == current || binding.commit == deployed.commit {
                continue;
            }
            let state = self
                .repository
                .state_of(&binding.version, subproject)
                .await?;
            if policy.exclude_deprecated && state == Some(ReleaseState::Deprecated) {
                continue;
            }
            candidates.push((binding, state));
        }
        candidates.sort_by(|(a, _), (b, _)| b.version.cmp(&a.version));

        let stable = policy
            .prefer_stable
            .then(|| {
                candidates
                    .iter()
                    .position(|(_, state)| *state == Some(ReleaseState::Stable))
            })
            .flatten();
        let index = match stable {
            Some(index) => index,
            None if candidates.is_empty() => return Err(no_candidate()),
            None => 0,
        };

        let (binding, state) = candidates.swap_remove(index);
        let target = RollbackTarget {
            version: binding.version,
            tag_name: binding.name,
            commit: binding.commit,
            state,
            current,
        };
        obs::emit_rollback_resolved(&env_tag, &target.current, &target.version, target.state);
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reltag_store::fakes::MemoryReferenceStore;

    fn ver(s: &str) -> Semver {
        Semver::parse(s).unwrap()
    }

    async fn setup(
        versions: &[(&str, &str)],
        deployed: &str,
    ) -> TagRepository<MemoryReferenceStore> {
        let store = MemoryReferenceStore::new();
        for (_, commit) in versions {
            store.add_commit(*commit);
        }
        let repo = TagRepository::new(store);
        for (version, commit) in versions {
            repo.create_version_tag(&ver(version), &CommitRef::new(*commit), None)
                .await
                .unwrap();
        }
        let production = EnvironmentName::parse("production").unwrap();
        repo.create_or_move_environment_tag(&production, &CommitRef::new(deployed), None, true)
            .await
            .unwrap();
        repo
    }

    #[tokio::test]
    async fn falls_back_to_newest_without_stable_markers() {
        let repo = setup(&[("v1.0.0", "a"), ("v1.1.0", "b"), ("v1.2.0", "c")], "c").await;
        let target = RollbackResolver::new(&repo)
            .resolve_target(
                &EnvironmentName::parse("production").unwrap(),
                None,
                RollbackPolicy::default(),
            )
            .await
            .unwrap();
        assert_eq!(target.version, ver("v1.1.0"));
        assert_eq!(target.commit, CommitRef::new("b"));
        assert_eq!(target.current, ver("v1.2.0"));
        assert_eq!(target.state, None);
    }

    #[tokio::test]
    async fn deprecated_allowed_when_not_excluded() {
        let repo = setup(&[("v1.0.0", "a"), ("v1.1.0", "b")], "b").await;
        repo.create_state_tag(&ver("v1.0.0"), ReleaseState::Deprecated, &CommitRef::new("a"), None)
            .await
            .unwrap();
        let production = EnvironmentName::parse("production").unwrap();
        let resolver = RollbackResolver::new(&repo);

        let err = resolver
            .resolve_target(&production, None, RollbackPolicy::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ReltagError::NoCandidate { .. }));

        let target = resolver
            .resolve_target(
                &production,
                None,
                RollbackPolicy {
                    prefer_stable: true,
                    exclude_deprecated: false,
                },
            )
            .await
            .unwrap();
        assert_eq!(target.version, ver("v1.0.0"));
        assert_eq!(target.state, Some(ReleaseState::Deprecated));
    }

    #[tokio::test]
    async fn newest_when_stable_not_preferred() {
        let repo = setup(&[("v1.0.0", "a"), ("v1.1.0", "b"), ("v1.2.0", "c")], "c").await;
        repo.create_state_tag(&ver("v1.0.0"), ReleaseState::Stable, &CommitRef::new("a"), None)
            .await
            .unwrap();
        let target = RollbackResolver::new(&repo)
            .resolve_target(
                &EnvironmentName::parse("production").unwrap(),
                None,
                RollbackPolicy {
                    prefer_stable: false,
                    exclude_deprecated: true,
                },
            )
            .await
            .unwrap();
        assert_eq!(target.version, ver("v1.1.0"));
    }
}
