//! Local repositories bound to a single remote origin.
//!
//! A [`RepositoryHandle`] starts empty: creating one runs `git init` and
//! registers `origin` without touching the network. Objects arrive later
//! through fetches issued by the window fetcher or the history loader.
//! Handles created in a temporary directory remove it when dropped.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::TempDir;
use tracing::debug;

use crate::config::Timeouts;
use crate::error::{GitError, Result};
use crate::process::{GitRunner, ProcessOutput};

enum RepoDir {
    Temp(TempDir),
    Fixed(PathBuf),
}

/// A working directory plus its origin, runner and timeout budget.
pub struct RepositoryHandle {
    dir: RepoDir,
    remote_url: String,
    runner: GitRunner,
    timeouts: Timeouts,
}

impl std::fmt::Debug for RepositoryHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryHandle")
            .field("path", &self.path())
            .field("remote_url", &self.remote_url)
            .finish()
    }
}

impl RepositoryHandle {
    /// Initialise an empty repository in a fresh temporary directory.
    ///
    /// `parent` selects where the temporary directory is created; the system
    /// temp dir is used when `None`.
    pub async fn create(
        remote_url: &str,
        runner: GitRunner,
        timeouts: Timeouts,
        parent: Option<&Path>,
    ) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("faultline-");
        let temp = match parent {
            Some(dir) => builder.tempdir_in(dir)?,
            None => builder.tempdir()?,
        };
        let handle = RepositoryHandle {
            dir: RepoDir::Temp(temp),
            remote_url: remote_url.to_string(),
            runner,
            timeouts,
        };
        handle.initialise().await?;
        Ok(handle)
    }

    /// Initialise an empty repository at a caller-owned path (kept on drop).
    pub async fn create_at(
        path: &Path,
        remote_url: &str,
        runner: GitRunner,
        timeouts: Timeouts,
    ) -> Result<Self> {
        tokio::fs::create_dir_all(path).await?;
        let handle = RepositoryHandle {
            dir: RepoDir::Fixed(path.to_path_buf()),
            remote_url: remote_url.to_string(),
            runner,
            timeouts,
        };
        handle.initialise().await?;
        Ok(handle)
    }

    async fn initialise(&self) -> Result<()> {
        self.checked(&["init", "--quiet"]).await?;
        self.checked(&["remote", "add", "origin", &self.remote_url])
            .await?;
        // Blobs arrive lazily from origin once it is a promisor remote.
        self.checked(&["config", "remote.origin.promisor", "true"])
            .await?;
        self.checked(&["config", "remote.origin.partialclonefilter", "blob:none"])
            .await?;
        debug!(path = %self.path().display(), remote = %self.remote_url, "initialised repository");
        Ok(())
    }

    async fn checked(&self, args: &[&str]) -> Result<ProcessOutput> {
        let out = self.query(args).await;
        if out.success() {
            Ok(out)
        } else {
            Err(GitError::command_failed(args, out.status, &out.stderr))
        }
    }

    /// Working directory of this repository.
    pub fn path(&self) -> &Path {
        match &self.dir {
            RepoDir::Temp(temp) => temp.path(),
            RepoDir::Fixed(path) => path,
        }
    }

    /// Address registered as `origin`.
    pub fn remote_url(&self) -> &str {
        &self.remote_url
    }

    /// Timeout budget used by this handle.
    pub fn timeouts(&self) -> &Timeouts {
        &self.timeouts
    }

    /// Run git with an explicit timeout.
    pub async fn git(&self, args: &[&str], timeout: Duration) -> ProcessOutput {
        self.runner.run(self.path(), args, timeout).await
    }

    /// Run a local object-database query.
    pub async fn query(&self, args: &[&str]) -> ProcessOutput {
        self.git(args, self.timeouts.query()).await
    }

    /// Run a depth-bounded network operation.
    pub async fn fetch(&self, args: &[&str]) -> ProcessOutput {
        self.git(args, self.timeouts.fetch()).await
    }

    /// Run a full-history network operation.
    pub async fn deep_fetch(&self, args: &[&str]) -> ProcessOutput {
        self.git(args, self.timeouts.deep_fetch()).await
    }

    /// Full identifier of `rev` if it names a commit present locally.
    pub async fn resolve_commit(&self, rev: &str) -> Option<String> {
        let spec = format!("{rev}^{{commit}}");
        let out = self
            .query(&["rev-parse", "--verify", "--quiet", &spec])
            .await;
        if !out.success() {
            return None;
        }
        let first = out.stdout_lines().next().map(str::to_string);
        first
    }

    /// Whether the local object database has shallow boundaries.
    pub async fn is_shallow(&self) -> bool {
        let out = self
            .query(&["rev-parse", "--is-shallow-repository"])
            .await;
        out.success() && out.stdout.trim() == "true"
    }

    /// Commits whose parents were cut off by a shallow fetch.
    ///
    /// Reading `rev-parse <commit>^1` at one of these fails even though the
    /// commit has parents upstream.
    pub async fn shallow_boundary(&self) -> BTreeSet<String> {
        let path = self.path().join(".git").join("shallow");
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => text
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect(),
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    debug!(path = %path.display(), error = %e, "shallow file unreadable");
                }
                BTreeSet::new()
            }
        }
    }

    /// Whether `ancestor` is reachable from `descendant` (or equal to it).
    pub async fn is_ancestor(&self, ancestor: &str, descendant: &str) -> bool {
        self.query(&["merge-base", "--is-ancestor", ancestor, descendant])
            .await
            .success()
    }
}
