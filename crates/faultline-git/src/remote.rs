//! Descendant discovery through hosting-platform compare APIs.
//!
//! Git has no notion of children, so descendants of a commit are found by
//! asking the host to compare the commit with the default branch tip. This
//! is best effort: unsupported hosts, HTTP failures and malformed responses
//! all produce an empty list.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::{ResolverConfig, Timeouts};
use crate::error::GitError;

/// Source of descendant commits for a (repository, commit) pair.
#[async_trait]
pub trait RemoteHistoryResolver: Send + Sync {
    /// Up to `count` descendants of `commit`, nearest first. Never fails.
    async fn descendants(&self, repo_url: &str, commit: &str, count: usize) -> Vec<String>;
}

/// Resolver that never reports descendants.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDescendants;

#[async_trait]
impl RemoteHistoryResolver for NoDescendants {
    async fn descendants(&self, _repo_url: &str, _commit: &str, _count: usize) -> Vec<String> {
        Vec::new()
    }
}

/// Supported hosting platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostKind {
    GitHub,
    GitLab,
}

/// A repository address recognised as living on a supported host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostedRepo {
    pub kind: HostKind,
    pub host: String,
    /// `owner/repo` (GitLab: full namespace path)
    pub project_path: String,
}

/// Recognise the hosting platform of a clone address.
///
/// Handles `https://host/owner/repo(.git)`, `ssh://git@host/owner/repo` and
/// scp-like `git@host:owner/repo.git`.
pub fn detect_host(repo_url: &str) -> Option<HostedRepo> {
    let (host, path) = if repo_url.contains("://") {
        let url = reqwest::Url::parse(repo_url).ok()?;
        (url.host_str()?.to_ascii_lowercase(), url.path().to_string())
    } else {
        let (authority, path) = repo_url.split_once(':')?;
        let host = authority.rsplit('@').next()?;
        (host.to_ascii_lowercase(), path.to_string())
    };

    let path = path.trim_matches('/');
    let path = path.strip_suffix(".git").unwrap_or(path);
    if !path.contains('/') {
        return None;
    }

    let kind = if host == "github.com" || host == "www.github.com" {
        HostKind::GitHub
    } else if host.contains("gitlab") {
        HostKind::GitLab
    } else {
        return None;
    };

    Some(HostedRepo {
        kind,
        host,
        project_path: path.to_string(),
    })
}

#[derive(Debug, Deserialize)]
struct GitHubCompare {
    #[serde(default)]
    commits: Vec<GitHubCommit>,
}

#[derive(Debug, Deserialize)]
struct GitHubCommit {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct GitLabCompare {
    #[serde(default)]
    commits: Vec<GitLabCommit>,
}

#[derive(Debug, Deserialize)]
struct GitLabCommit {
    id: String,
}

#[derive(Debug, Deserialize)]
struct GitLabProject {
    default_branch: Option<String>,
}

/// First `count` commit SHAs from a GitHub compare response.
pub fn parse_github_compare(body: &str, count: usize) -> serde_json::Result<Vec<String>> {
    let compare: GitHubCompare = serde_json::from_str(body)?;
    Ok(compare
        .commits
        .into_iter()
        .take(count)
        .map(|c| c.sha)
        .collect())
}

/// First `count` commit ids from a GitLab compare response.
pub fn parse_gitlab_compare(body: &str, count: usize) -> serde_json::Result<Vec<String>> {
    let compare: GitLabCompare = serde_json::from_str(body)?;
    Ok(compare
        .commits
        .into_iter()
        .take(count)
        .map(|c| c.id)
        .collect())
}

#[derive(Debug, thiserror::Error)]
enum ResolveError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {0}")]
    Status(u16),

    #[error("malformed response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("project has no default branch")]
    NoDefaultBranch,
}

/// GitHub/GitLab compare-API resolver.
pub struct HostedHistoryResolver {
    config: ResolverConfig,
    api_timeout: Duration,
    http_client: reqwest::Client,
}

impl HostedHistoryResolver {
    /// Create a resolver with its own HTTP client; requests are bounded by
    /// `timeouts.api()`.
    pub fn new(config: ResolverConfig, timeouts: &Timeouts) -> Result<Self, GitError> {
        let api_timeout = timeouts.api();
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("faultline/", env!("CARGO_PKG_VERSION")))
            .timeout(api_timeout)
            .build()
            .map_err(|e| GitError::Http(e.to_string()))?;

        Ok(HostedHistoryResolver {
            config,
            api_timeout,
            http_client,
        })
    }

    /// Resolver configured from environment variables.
    pub fn from_env() -> Result<Self, GitError> {
        Self::new(ResolverConfig::from_env(), &Timeouts::default())
    }

    /// Per-request timeout applied to API calls.
    pub fn api_timeout(&self) -> Duration {
        self.api_timeout
    }

    async fn get_text(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<String, ResolveError> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ResolveError::Status(status.as_u16()));
        }
        Ok(response.text().await?)
    }

    async fn github_descendants(
        &self,
        repo: &HostedRepo,
        commit: &str,
        count: usize,
    ) -> Result<Vec<String>, ResolveError> {
        let url = format!(
            "{}/repos/{}/compare/{}...HEAD",
            self.config.github_api_url.trim_end_matches('/'),
            repo.project_path,
            commit
        );
        let mut request = self
            .http_client
            .get(&url)
            .header(ACCEPT, "application/vnd.github+json");
        if let Some(token) = &self.config.github_token {
            request = request.bearer_auth(token);
        }

        let body = self.get_text(request).await?;
        Ok(parse_github_compare(&body, count)?)
    }

    async fn gitlab_descendants(
        &self,
        repo: &HostedRepo,
        commit: &str,
        count: usize,
    ) -> Result<Vec<String>, ResolveError> {
        let base = self
            .config
            .gitlab_api_url
            .clone()
            .unwrap_or_else(|| format!("https://{}/api/v4", repo.host));
        let base = base.trim_end_matches('/');
        let project = repo.project_path.replace('/', "%2F");

        let mut project_request = self
            .http_client
            .get(format!("{base}/projects/{project}"));
        if let Some(token) = &self.config.gitlab_token {
            project_request = project_request.header("PRIVATE-TOKEN", token);
        }
        let project_body = self.get_text(project_request).await?;
        let info: GitLabProject = serde_json::from_str(&project_body)?;
        let branch = info.default_branch.ok_or(ResolveError::NoDefaultBranch)?;

        let mut compare_request = self
            .http_client
            .get(format!("{base}/projects/{project}/repository/compare"))
            .query(&[("from", commit), ("to", branch.as_str())]);
        if let Some(token) = &self.config.gitlab_token {
            compare_request = compare_request.header("PRIVATE-TOKEN", token);
        }
        let body = self.get_text(compare_request).await?;
        Ok(parse_gitlab_compare(&body, count)?)
    }
}

#[async_trait]
impl RemoteHistoryResolver for HostedHistoryResolver {
    async fn descendants(&self, repo_url: &str, commit: &str, count: usize) -> Vec<String> {
        if count == 0 {
            return Vec::new();
        }
        let Some(repo) = detect_host(repo_url) else {
            warn!(repo = %repo_url, "unsupported host, skipping descendants");
            return Vec::new();
        };

        let result = match repo.kind {
            HostKind::GitHub => self.github_descendants(&repo, commit, count).await,
            HostKind::GitLab => self.gitlab_descendants(&repo, commit, count).await,
        };

        match result {
            Ok(found) => {
                debug!(repo = %repo.project_path, found = found.len(), "descendants resolved");
                found
            }
            Err(e) => {
                warn!(repo = %repo.project_path, error = %e, "descendant lookup failed");
                Vec::new()
            }
        }
    }
}
