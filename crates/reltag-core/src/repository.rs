//! Typed tag repository over a [`ReferenceStore`].
//!
//! Enforces the mutability policy: version and state tags are bound once
//! and never move; environment tags move on every deploy. Every mutation
//! is split into a read-only [`TagRepository::plan`] and an
//! [`TagRepository::apply`], so rehearsals can report exactly what a real
//! run would do.

use reltag_store::{CommitRef, ReferenceStore, StoreError};
use serde::Serialize;
use tracing::debug;

use crate::domain::{
    version_prefix, EnvironmentName, ReleaseState, ReltagError, Result, Semver, SubprojectPath,
    TagName, TagTarget,
};

/// Planned effect of binding a tag to a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedAction {
    Create,
    Move { from: CommitRef },
    Unchanged,
}

/// Outcome of [`TagRepository::plan`]: every check passed, nothing written yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagPlan {
    pub tag: TagName,
    pub commit: CommitRef,
    pub action: PlannedAction,
}

impl TagPlan {
    pub fn prior_commit(&self) -> Option<&CommitRef> {
        match &self.action {
            PlannedAction::Move { from } => Some(from),
            PlannedAction::Unchanged => Some(&self.commit),
            PlannedAction::Create => None,
        }
    }
}

/// What actually happened to a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Moved,
    Unchanged,
}

/// Outcome of [`TagRepository::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagChange {
    pub tag: TagName,
    pub commit: CommitRef,
    pub prior_commit: Option<CommitRef>,
    pub change: ChangeKind,
}

/// A version tag together with the commit it is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionBinding {
    pub version: Semver,
    pub tag: TagName,
    /// Name as stored. Differs from `tag` when the version was written
    /// non-canonically (`v01.2.3` for `v1.2.3`).
    pub name: String,
    pub commit: CommitRef,
}

/// Typed queries and policy-checked mutations over version, environment and state tags.
pub struct TagRepository<S> {
    store: S,
}

impl<S> TagRepository<S>
where
    S: ReferenceStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Resolve a tag by exact name. Names that only resolve as some other
    /// revision (a branch called `production`, say) do not count.
    pub async fn resolve_tag(&self, tag: &TagName) -> Result<Option<CommitRef>> {
        let name = tag.to_string();
        let listed = self.store.list_by_prefix(&name).await?;
        if !listed.iter().any(|candidate| *candidate == name) {
            return Ok(None);
        }
        Ok(self.store.resolve(&name).await?)
    }

    /// Run every read-only check for binding `tag` to `commit`.
    pub async fn plan(
        &self,
        tag: &TagName,
        commit: &CommitRef,
        force_move: bool,
    ) -> Result<TagPlan> {
        let existing = self.resolve_tag(tag).await?;
        let action = match tag.target() {
            TagTarget::Version(_) => match existing {
                Some(existing) => {
                    return Err(ReltagError::AlreadyImmutable {
                        tag: tag.to_string(),
                        existing,
                    })
                }
                None => PlannedAction::Create,
            },
            TagTarget::State { .. } => {
                let parent = tag
                    .parent()
                    .ok_or_else(|| ReltagError::InvalidTagName(tag.to_string()))?;
                let parent_commit =
                    self.resolve_tag(&parent)
                        .await?
                        .ok_or_else(|| ReltagError::ParentMissing {
                            tag: tag.to_string(),
                            version_tag: parent.to_string(),
                        })?;
                if parent_commit != *commit {
                    return Err(ReltagError::CommitMismatch {
                        tag: tag.to_string(),
                        expected: parent_commit,
                        actual: commit.clone(),
                    });
                }
                if let Some(existing) = existing {
                    return Err(ReltagError::AlreadyImmutable {
                        tag: tag.to_string(),
                        existing,
                    });
                }
                PlannedAction::Create
            }
            TagTarget::Environment(_) => match existing {
                None => PlannedAction::Create,
                Some(current) if current == *commit => PlannedAction::Unchanged,
                Some(current) if force_move => PlannedAction::Move { from: current },
                Some(current) => {
                    return Err(ReltagError::Rejected {
                        tag: tag.to_string(),
                        current,
                        requested: commit.clone(),
                    })
                }
            },
        };
        debug!(tag = %tag, commit = %commit, action = ?action, "planned tag change");
        Ok(TagPlan {
            tag: tag.clone(),
            commit: commit.clone(),
            action,
        })
    }

    /// Perform a planned change. Immutable kinds are written with move permission off,
    /// so a racing writer surfaces as `AlreadyImmutable` rather than an overwrite.
    pub async fn apply(&self, plan: &TagPlan) -> Result<TagChange> {
        if plan.action == PlannedAction::Unchanged {
            return Ok(TagChange {
                tag: plan.tag.clone(),
                commit: plan.commit.clone(),
                prior_commit: Some(plan.commit.clone()),
                change: ChangeKind::Unchanged,
            });
        }

        let name = plan.tag.to_string();
        let prior = self
            .store
            .create_or_move(&name, &plan.commit, plan.tag.is_movable())
            .await
            .map_err(|err| match err {
                StoreError::AlreadyExists { existing, .. } => ReltagError::AlreadyImmutable {
                    tag: name.clone(),
                    existing,
                },
                StoreError::CommitNotFound { commit } => ReltagError::CommitNotFound(commit),
                other => ReltagError::Store(other),
            })?;

        let change = match &prior {
            None => ChangeKind::Created,
            Some(previous) if *previous == plan.commit => ChangeKind::Unchanged,
            Some(_) => ChangeKind::Moved,
        };
        Ok(TagChange {
            tag: plan.tag.clone(),
            commit: plan.commit.clone(),
            prior_commit: prior,
            change,
        })
    }

    /// Create a version tag. Fails with `AlreadyImmutable` if the name is bound at all.
    pub async fn create_version_tag(
        &self,
        version: &Semver,
        commit: &CommitRef,
        subproject: Option<&SubprojectPath>,
    ) -> Result<TagName> {
        let tag = TagName::version(subproject, version)?;
        let plan = self.plan(&tag, commit, false).await?;
        Ok(self.apply(&plan).await?.tag)
    }

    /// Create an environment tag, or move it when `force_move` is set. Idempotent
    /// when it already points at `commit`.
    pub async fn create_or_move_environment_tag(
        &self,
        environment: &EnvironmentName,
        commit: &CommitRef,
        subproject: Option<&SubprojectPath>,
        force_move: bool,
    ) -> Result<TagChange> {
        let tag = TagName::environment(subproject, environment);
        let plan = self.plan(&tag, commit, force_move).await?;
        self.apply(&plan).await
    }

    /// Create a state tag on the exact commit of its version tag.
    pub async fn create_state_tag(
        &self,
        version: &Semver,
        state: ReleaseState,
        commit: &CommitRef,
        subproject: Option<&SubprojectPath>,
    ) -> Result<TagName> {
        let tag = TagName::state(subproject, version, state)?;
        let plan = self.plan(&tag, commit, false).await?;
        Ok(self.apply(&plan).await?.tag)
    }

    /// Stored names under `prefix` that decompose cleanly and belong to `subproject`,
    /// paired with their parsed form.
    async fn tags_under(
        &self,
        prefix: &str,
        subproject: Option<&SubprojectPath>,
    ) -> Result<Vec<(String, TagName)>> {
        let names = self.store.list_by_prefix(prefix).await?;
        Ok(names
            .into_iter()
            .filter_map(|name| match TagName::decompose(&name) {
                Ok(tag) => Some((name, tag)),
                Err(err) => {
                    debug!(name = %name, error = %err, "skipping unrecognised tag");
                    None
                }
            })
            .filter(|(_, tag)| tag.subproject() == subproject)
            .collect())
    }

    /// All released versions of `subproject`, newest first.
    pub async fn list_version_tags(
        &self,
        subproject: Option<&SubprojectPath>,
    ) -> Result<Vec<Semver>> {
        let prefix = version_prefix(subproject);
        let mut versions: Vec<Semver> = self
            .tags_under(&prefix, subproject)
            .await?
            .into_iter()
            .filter_map(|(_, tag)| match tag.target() {
                TagTarget::Version(version) => Some(version.clone()),
                _ => None,
            })
            .collect();
        versions.sort_by(|a, b| b.cmp(a));
        versions.dedup();
        Ok(versions)
    }

    /// All released versions of `subproject` with their commits, newest first.
    pub async fn list_version_bindings(
        &self,
        subproject: Option<&SubprojectPath>,
    ) -> Result<Vec<VersionBinding>> {
        let prefix = version_prefix(subproject);
        let mut bindings = Vec::new();
        for (name, tag) in self.tags_under(&prefix, subproject).await? {
            let TagTarget::Version(version) = tag.target() else {
                continue;
            };
            let version = version.clone();
            match self.store.resolve(&name).await? {
                Some(commit) => bindings.push(VersionBinding {
                    version,
                    tag,
                    name,
                    commit,
                }),
                None => debug!(name = %name, "version tag vanished while listing"),
            }
        }
        // Canonical names sort first within a version so they win the dedup.
        let non_canonical = |binding: &VersionBinding| binding.name != binding.tag.to_string();
        bindings.sort_by(|a, b| {
            b.version
                .cmp(&a.version)
                .then_with(|| non_canonical(a).cmp(&non_canonical(b)))
        });
        bindings.dedup_by(|later, kept| later.version == kept.version);
        Ok(bindings)
    }

    /// The most preferred state marker on `version` (stable, then unstable,
    /// then deprecated), or `None` if it carries no marker.
    pub async fn state_of(
        &self,
        version: &Semver,
        subproject: Option<&SubprojectPath>,
    ) -> Result<Option<ReleaseState>> {
        let prefix = format!("{}-", TagName::version(subproject, version)?);
        let present: Vec<ReleaseState> = self
            .tags_under(&prefix, subproject)
            .await?
            .into_iter()
            .filter_map(|(_, tag)| match tag.target() {
                TagTarget::State { version: v, state } if v == version => Some(*state),
                _ => None,
            })
            .collect();
        Ok(ReleaseState::ALL
            .into_iter()
            .find(|state| present.contains(state)))
    }

    /// The version deployed to `environment`. When several version tags share the
    /// environment's commit, the newest wins.
    pub async fn current_version_of(
        &self,
        environment: &EnvironmentName,
        subproject: Option<&SubprojectPath>,
    ) -> Result<VersionBinding> {
        let env_tag = TagName::environment(subproject, environment);
        let unbound = || ReltagError::Unbound {
            tag: env_tag.to_string(),
        };
        let commit = self.resolve_tag(&env_tag).await?.ok_or_else(unbound)?;
        self.list_version_bindings(subproject)
            .await?
            .into_iter()
            .find(|binding| binding.commit == commit)
            .ok_or_else(unbound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reltag_store::fakes::MemoryReferenceStore;

    fn repo() -> TagRepository<MemoryReferenceStore> {
        TagRepository::new(MemoryReferenceStore::with_commits(["c1", "c2", "c3"]))
    }

    fn ver(s: &str) -> Semver {
        Semver::parse(s).unwrap()
    }

    fn env(name: &str) -> EnvironmentName {
        EnvironmentName::parse(name).unwrap()
    }

    fn c(id: &str) -> CommitRef {
        CommitRef::new(id)
    }

    #[tokio::test]
    async fn plan_does_not_mutate() {
        let repo = repo();
        let tag = TagName::version(None, &ver("v1.0.0")).unwrap();
        let plan = repo.plan(&tag, &c("c1"), false).await.unwrap();
        assert_eq!(plan.action, PlannedAction::Create);
        assert_eq!(repo.store().mutation_count(), 0);
    }

    #[tokio::test]
    async fn environment_plan_requires_force_to_move() {
        let repo = repo();
        let staging = env("staging");
        repo.create_or_move_environment_tag(&staging, &c("c1"), None, false)
            .await
            .unwrap();

        let tag = TagName::environment(None, &staging);
        let err = repo.plan(&tag, &c("c2"), false).await.unwrap_err();
        assert!(matches!(err, ReltagError::Rejected { .. }));

        let plan = repo.plan(&tag, &c("c2"), true).await.unwrap();
        assert_eq!(plan.action, PlannedAction::Move { from: c("c1") });
        assert_eq!(plan.prior_commit(), Some(&c("c1")));
    }

    #[tokio::test]
    async fn state_of_prefers_stable() {
        let repo = repo();
        let v = ver("v1.0.0");
        repo.create_version_tag(&v, &c("c1"), None).await.unwrap();
        assert_eq!(repo.state_of(&v, None).await.unwrap(), None);

        repo.create_state_tag(&v, ReleaseState::Deprecated, &c("c1"), None)
            .await
            .unwrap();
        assert_eq!(
            repo.state_of(&v, None).await.unwrap(),
            Some(ReleaseState::Deprecated)
        );

        repo.create_state_tag(&v, ReleaseState::Stable, &c("c1"), None)
            .await
            .unwrap();
        assert_eq!(
            repo.state_of(&v, None).await.unwrap(),
            Some(ReleaseState::Stable)
        );
    }

    #[tokio::test]
    async fn state_of_ignores_prerelease_siblings() {
        let repo = repo();
        let rc = ver("v1.0.0-rc.1");
        repo.create_version_tag(&rc, &c("c1"), None).await.unwrap();
        repo.create_state_tag(&rc, ReleaseState::Unstable, &c("c1"), None)
            .await
            .unwrap();
        repo.create_version_tag(&ver("v1.0.0"), &c("c2"), None)
            .await
            .unwrap();

        assert_eq!(repo.state_of(&ver("v1.0.0"), None).await.unwrap(), None);
        assert_eq!(
            repo.state_of(&rc, None).await.unwrap(),
            Some(ReleaseState::Unstable)
        );
    }

    #[tokio::test]
    async fn listing_is_scoped_to_subproject() {
        let repo = repo();
        let api = SubprojectPath::parse("api").unwrap();
        repo.create_version_tag(&ver("v1.0.0"), &c("c1"), None)
            .await
            .unwrap();
        repo.create_version_tag(&ver("v2.0.0"), &c("c2"), Some(&api))
            .await
            .unwrap();
        repo.create_version_tag(&ver("v1.5.0"), &c("c1"), Some(&api))
            .await
            .unwrap();

        assert_eq!(
            repo.list_version_tags(None).await.unwrap(),
            vec![ver("v1.0.0")]
        );
        assert_eq!(
            repo.list_version_tags(Some(&api)).await.unwrap(),
            vec![ver("v2.0.0"), ver("v1.5.0")]
        );
    }

    #[tokio::test]
    async fn current_version_picks_newest_sharing_commit() {
        let repo = repo();
        repo.create_version_tag(&ver("v1.0.0"), &c("c2"), None)
            .await
            .unwrap();
        repo.create_version_tag(&ver("v1.0.1"), &c("c2"), None)
            .await
            .unwrap();
        repo.create_or_move_environment_tag(&env("production"), &c("c2"), None, false)
            .await
            .unwrap();

        let current = repo
            .current_version_of(&env("production"), None)
            .await
            .unwrap();
        assert_eq!(current.version, ver("v1.0.1"));
        assert_eq!(current.commit, c("c2"));
    }

    #[tokio::test]
    async fn current_version_unbound_cases() {
        let repo = repo();
        let err = repo
            .current_version_of(&env("production"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ReltagError::Unbound { .. }));

        repo.create_or_move_environment_tag(&env("production"), &c("c3"), None, false)
            .await
            .unwrap();
        let err = repo
            .current_version_of(&env("production"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ReltagError::Unbound { .. }));
    }

    #[tokio::test]
    async fn non_canonical_version_names_are_listed_by_stored_name() {
        let repo = repo();
        repo.store()
            .create_or_move("v01.2.3", &c("c1"), false)
            .await
            .unwrap();
        repo.create_version_tag(&ver("v1.3.0"), &c("c2"), None)
            .await
            .unwrap();

        let bindings = repo.list_version_bindings(None).await.unwrap();
        let names: Vec<&str> = bindings.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["v1.3.0", "v01.2.3"]);
        assert_eq!(bindings[1].version, ver("1.2.3"));
        assert_eq!(bindings[1].commit, c("c1"));

        // The canonical spelling wins when both exist.
        repo.store()
            .create_or_move("v1.2.3", &c("c3"), false)
            .await
            .unwrap();
        let bindings = repo.list_version_bindings(None).await.unwrap();
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[1].name, "v1.2.3");
        assert_eq!(bindings[1].commit, c("c3"));
    }
}
