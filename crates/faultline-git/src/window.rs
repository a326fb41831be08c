//! Commit window fetching.
//!
//! A window is a target commit plus up to N first-parent ancestors and up
//! to M descendants, retrieved with blob-free, depth-limited fetches so a
//! multi-decade repository costs a few kilobytes of commit and tree data.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::Timeouts;
use crate::error::{FetchError, GitError};
use crate::history::RevList;
use crate::process::GitRunner;
use crate::remote::RemoteHistoryResolver;
use crate::repo::RepositoryHandle;

/// Default bound on the `rev-list` walk that confirms a descendant.
pub const DEFAULT_REACHABILITY_BOUND: usize = 1000;

/// How large a window to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// First-parent ancestors to include (N)
    pub ancestor_count: usize,
    /// Descendants to include (M)
    pub descendant_count: usize,
    /// Fetch records that have not been verified yet
    pub verification_bypass: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            ancestor_count: 10,
            descendant_count: 10,
            verification_bypass: false,
        }
    }
}

impl FetchConfig {
    pub fn new(ancestor_count: usize, descendant_count: usize) -> Self {
        Self {
            ancestor_count,
            descendant_count,
            ..Self::default()
        }
    }

    pub fn with_verification_bypass(mut self, bypass: bool) -> Self {
        self.verification_bypass = bypass;
        self
    }
}

/// Ordered slice of history around a target commit.
///
/// `ancestors + [target] + descendants` reads oldest to newest. The target
/// never appears in either list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitWindow {
    target: String,
    ancestors: Vec<String>,
    descendants: Vec<String>,
}

impl CommitWindow {
    pub fn new(target: String, ancestors: Vec<String>, descendants: Vec<String>) -> Self {
        let ancestors = ancestors.into_iter().filter(|c| *c != target).collect();
        let descendants = descendants.into_iter().filter(|c| *c != target).collect();
        Self {
            target,
            ancestors,
            descendants,
        }
    }

    /// Full identifier of the target commit.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Oldest to nearest.
    pub fn ancestors(&self) -> &[String] {
        &self.ancestors
    }

    /// Nearest to furthest.
    pub fn descendants(&self) -> &[String] {
        &self.descendants
    }

    /// Every commit in chronological order.
    pub fn all_commits(&self) -> Vec<&str> {
        self.ancestors
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(self.target.as_str()))
            .chain(self.descendants.iter().map(String::as_str))
            .collect()
    }
}

/// Result of [`CommitWindowFetcher::fetch_window`].
///
/// The repository is returned even when the window failed so callers can
/// inspect or reuse whatever was fetched.
#[derive(Debug)]
pub struct WindowFetch {
    pub repo: RepositoryHandle,
    pub window: Result<CommitWindow, FetchError>,
}

/// Fetches commit windows from remote repositories.
#[derive(Clone)]
pub struct CommitWindowFetcher {
    runner: GitRunner,
    resolver: Arc<dyn RemoteHistoryResolver>,
    timeouts: Timeouts,
    reachability_bound: usize,
    work_root: Option<PathBuf>,
}

impl CommitWindowFetcher {
    pub fn new(
        runner: GitRunner,
        resolver: Arc<dyn RemoteHistoryResolver>,
        timeouts: Timeouts,
    ) -> Self {
        Self {
            runner,
            resolver,
            timeouts,
            reachability_bound: DEFAULT_REACHABILITY_BOUND,
            work_root: None,
        }
    }

    /// Override how far back a descendant walk looks for the target.
    pub fn with_reachability_bound(mut self, bound: usize) -> Self {
        self.reachability_bound = bound.max(1);
        self
    }

    /// Create temporary repositories under `root` instead of the system temp dir.
    pub fn with_work_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.work_root = Some(root.into());
        self
    }

    pub fn timeouts(&self) -> &Timeouts {
        &self.timeouts
    }

    /// Empty repository for `repo_url` in a fresh temporary directory.
    pub async fn open(&self, repo_url: &str) -> Result<RepositoryHandle, GitError> {
        RepositoryHandle::create(
            repo_url,
            self.runner.clone(),
            self.timeouts.clone(),
            self.work_root.as_deref(),
        )
        .await
    }

    /// Fetch the window around `target` into a new repository.
    pub async fn fetch_window(
        &self,
        repo_url: &str,
        target: &str,
        config: &FetchConfig,
    ) -> Result<WindowFetch, GitError> {
        let repo = self.open(repo_url).await?;
        let window = self.fetch_window_into(&repo, target, config).await;
        Ok(WindowFetch { repo, window })
    }

    /// Fetch the window around `target` into an existing repository.
    pub async fn fetch_window_into(
        &self,
        repo: &RepositoryHandle,
        target: &str,
        config: &FetchConfig,
    ) -> Result<CommitWindow, FetchError> {
        let depth = config.ancestor_count + 1;
        let depth_arg = format!("--depth={depth}");
        let out = repo
            .fetch(&[
                "fetch",
                "--quiet",
                "--filter=blob:none",
                &depth_arg,
                "origin",
                target,
            ])
            .await;
        if !out.success() {
            warn!(repo = %repo.remote_url(), %target, reason = %out.reason(), "target fetch failed");
            return Err(FetchError::Unreachable {
                repo: repo.remote_url().to_string(),
                commit: target.to_string(),
                reason: out.reason(),
            });
        }

        let history = RevList::from_rev(target)
            .first_parent()
            .max_count(depth)
            .reverse()
            .run(repo)
            .await
            .map_err(|e| {
                debug!(%target, error = %e, "target not listable after fetch");
                FetchError::TargetNotFound {
                    commit: target.to_string(),
                }
            })?;

        let position = history
            .iter()
            .position(|c| c == target || c.starts_with(target))
            .ok_or_else(|| FetchError::TargetNotFound {
                commit: target.to_string(),
            })?;
        let full_target = history[position].clone();
        let ancestors = history[..position].to_vec();

        let descendants = if config.descendant_count > 0 {
            self.confirmed_descendants(repo, &full_target, config)
                .await
        } else {
            Vec::new()
        };

        info!(
            repo = %repo.remote_url(),
            target = %full_target,
            ancestors = ancestors.len(),
            descendants = descendants.len(),
            "window fetched"
        );
        Ok(CommitWindow::new(full_target, ancestors, descendants))
    }

    /// Descendants reported by the resolver that provably contain `target`.
    async fn confirmed_descendants(
        &self,
        repo: &RepositoryHandle,
        target: &str,
        config: &FetchConfig,
    ) -> Vec<String> {
        let candidates: Vec<String> = self
            .resolver
            .descendants(repo.remote_url(), target, config.descendant_count)
            .await
            .into_iter()
            .filter(|c| !c.is_empty() && c != target)
            .take(config.descendant_count)
            .collect();
        let Some(furthest) = candidates.last() else {
            return Vec::new();
        };

        let depth_arg = format!(
            "--depth={}",
            candidates.len() + config.ancestor_count + 2
        );
        let out = repo
            .fetch(&[
                "fetch",
                "--quiet",
                "--filter=blob:none",
                &depth_arg,
                "origin",
                furthest,
            ])
            .await;
        if !out.success() {
            warn!(%furthest, reason = %out.reason(), "descendant fetch failed, window has no descendants");
            return Vec::new();
        }

        let mut confirmed = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let reachable = RevList::from_rev(&candidate)
                .max_count(self.reachability_bound)
                .run(repo)
                .await;
            match reachable {
                Ok(commits) if commits.iter().any(|c| c == target) => confirmed.push(candidate),
                Ok(_) => debug!(%candidate, "descendant does not reach target, dropped"),
                Err(e) => debug!(%candidate, error = %e, "descendant not available, dropped"),
            }
        }
        confirmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn window_never_contains_target_in_neighbours() {
        let window = CommitWindow::new(
            "t".to_string(),
            ids(&["a1", "t", "a2"]),
            ids(&["t", "d1"]),
        );
        assert_eq!(window.ancestors(), ids(&["a1", "a2"]).as_slice());
        assert_eq!(window.descendants(), ids(&["d1"]).as_slice());
        assert_eq!(window.all_commits(), vec!["a1", "a2", "t", "d1"]);
    }

    #[test]
    fn fetch_config_defaults() {
        let config = FetchConfig::default();
        assert_eq!(config.ancestor_count, 10);
        assert_eq!(config.descendant_count, 10);
        assert!(!config.verification_bypass);

        let partial: FetchConfig = serde_json::from_str(r#"{"ancestor_count": 3}"#).unwrap();
        assert_eq!(partial.ancestor_count, 3);
        assert_eq!(partial.descendant_count, 10);
    }

    #[test]
    fn window_serializes_fields() {
        let window = CommitWindow::new("t".to_string(), ids(&["a"]), Vec::new());
        let json = serde_json::to_value(&window).unwrap();
        assert_eq!(json["target"], "t");
        assert_eq!(json["ancestors"][0], "a");
        assert!(json["descendants"].as_array().unwrap().is_empty());
    }
}
