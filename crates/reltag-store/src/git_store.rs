//! Git-backed reference store.
//!
//! Drives the `git` CLI in a work tree. Tags are lightweight tags under
//! `refs/tags/`; remote propagation pushes a single tag ref. Every
//! subprocess is bounded by a timeout.

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::StoreError;
use crate::reference_store::{CommitRef, ReferenceStore, StoreResult};

/// Default per-command time budget.
pub const DEFAULT_GIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Reference store backed by a local git repository and one remote.
#[derive(Debug, Clone)]
pub struct GitReferenceStore {
    repo_dir: PathBuf,
    remote: String,
    timeout: Duration,
}

impl GitReferenceStore {
    pub fn new(repo_dir: impl Into<PathBuf>, remote: impl Into<String>) -> Self {
        Self {
            repo_dir: repo_dir.into(),
            remote: remote.into(),
            timeout: DEFAULT_GIT_TIMEOUT,
        }
    }

    /// Override the per-command time budget.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    pub fn remote(&self) -> &str {
        &self.remote
    }

    async fn git(&self, operation: &str, args: &[&str]) -> StoreResult<Output> {
        debug!(operation = %operation, args = ?args, "running git");
        let child = Command::new("git")
            .args(args)
            .current_dir(&self.repo_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| StoreError::Timeout {
                operation: operation.to_string(),
                secs: self.timeout.as_secs(),
            })?
            .map_err(StoreError::from)
    }

    async fn rev_parse(&self, rev: &str) -> StoreResult<Option<CommitRef>> {
        let spec = format!("{rev}^{{commit}}");
        let output = self
            .git("rev-parse", &["rev-parse", "--verify", "--quiet", &spec])
            .await?;
        if !output.status.success() {
            return Ok(None);
        }
        let sha = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok((!sha.is_empty()).then(|| CommitRef::new(sha)))
    }

    async fn check_ref_format(&self, name: &str) -> StoreResult<()> {
        let full = tag_ref(name);
        let output = self
            .git("check-ref-format", &["check-ref-format", &full])
            .await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(StoreError::InvalidName(name.to_string()))
        }
    }
}

fn tag_ref(name: &str) -> String {
    format!("refs/tags/{name}")
}

fn stderr_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}

/// Whether a failed `git push` was a rejection by the remote rather than a transport failure.
fn is_push_rejection(stderr: &str) -> bool {
    stderr.contains("[rejected]")
        || stderr.contains("already exists")
        || stderr.contains("non-fast-forward")
        || stderr.contains("stale info")
}

/// Parse `git ls-remote` output for one tag, preferring the peeled commit of annotated tags.
fn parse_ls_remote(stdout: &str, name: &str) -> Option<CommitRef> {
    let full = tag_ref(name);
    let peeled = format!("{full}^{{}}");
    let mut direct = None;
    for line in stdout.lines() {
        let mut parts = line.split_whitespace();
        let (Some(sha), Some(refname)) = (parts.next(), parts.next()) else {
            continue;
        };
        if refname == peeled {
            return Some(CommitRef::new(sha));
        }
        if refname == full {
            direct = Some(CommitRef::new(sha));
        }
    }
    direct
}

#[async_trait]
impl ReferenceStore for GitReferenceStore {
    async fn resolve(&self, name: &str) -> StoreResult<Option<CommitRef>> {
        if let Some(commit) = self.rev_parse(&tag_ref(name)).await? {
            return Ok(Some(commit));
        }
        self.rev_parse(name).await
    }

    async fn create_or_move(
        &self,
        name: &str,
        commit: &CommitRef,
        allow_move: bool,
    ) -> StoreResult<Option<CommitRef>> {
        self.check_ref_format(name).await?;
        if self.rev_parse(commit.as_str()).await?.is_none() {
            return Err(StoreError::CommitNotFound {
                commit: commit.to_string(),
            });
        }

        let previous = self.rev_parse(&tag_ref(name)).await?;
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

        let mut args = vec!["tag"];
        if previous.is_some() {
            args.push("--force");
        }
        args.extend([name, commit.as_str()]);
        let output = self.git("tag", &args).await?;
        if !output.status.success() {
            return Err(StoreError::Command(format!(
                "git tag {name} failed: {}",
                stderr_of(&output)
            )));
        }
        Ok(previous)
    }

    async fn list_by_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let pattern = format!("{prefix}*");
        let output = self.git("tag", &["tag", "--list", &pattern]).await?;
        if !output.status.success() {
            return Err(StoreError::Command(format!(
                "git tag --list failed: {}",
                stderr_of(&output)
            )));
        }
        let mut names: Vec<String> = String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        names.sort();
        Ok(names)
    }

    async fn remote_sync(&self, name: &str, force: bool) -> StoreResult<()> {
        let full = tag_ref(name);
        let refspec = format!("{full}:{full}");
        let mut args = vec!["push"];
        if force {
            args.push("--force");
        }
        args.extend([self.remote.as_str(), refspec.as_str()]);

        let output = self.git("push", &args).await?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = stderr_of(&output);
        if is_push_rejection(&stderr) {
            Err(StoreError::Conflict {
                name: name.to_string(),
            })
        } else {
            Err(StoreError::Network(stderr))
        }
    }

    async fn fetch_remote(&self, name: &str) -> StoreResult<Option<CommitRef>> {
        let full = tag_ref(name);
        let output = self
            .git("ls-remote", &["ls-remote", "--tags", &self.remote, &full])
            .await?;
        if !output.status.success() {
            return Err(StoreError::Network(stderr_of(&output)));
        }
        Ok(parse_ls_remote(
            &String::from_utf8_lossy(&output.stdout),
            name,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_ls_remote_prefers_peeled_commit() {
        let stdout = "1111111111111111111111111111111111111111\trefs/tags/v1.0.0\n\
                      2222222222222222222222222222222222222222\trefs/tags/v1.0.0^{}\n";
        let commit = parse_ls_remote(stdout, "v1.0.0").unwrap();
        assert_eq!(commit.as_str(), "2222222222222222222222222222222222222222");
    }

    #[test]
    fn parse_ls_remote_ignores_other_tags() {
        let stdout = "1111111111111111111111111111111111111111\trefs/tags/v1.0.0-stable\n";
        assert!(parse_ls_remote(stdout, "v1.0.0").is_none());
        assert!(parse_ls_remote("", "v1.0.0").is_none());
    }

    #[test]
    fn push_rejection_is_detected() {
        assert!(is_push_rejection(
            " ! [rejected]        staging -> staging (already exists)"
        ));
        assert!(!is_push_rejection(
            "fatal: unable to access 'https://example.invalid/': Could not resolve host"
        ));
    }

    #[tokio::test]
    #[ignore = "requires a git binary"]
    async fn resolve_outside_repo_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = GitReferenceStore::new(dir.path(), "origin");
        assert!(store.resolve("HEAD").await.unwrap().is_none());
    }
}
