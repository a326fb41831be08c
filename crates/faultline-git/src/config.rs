//! Timeouts and remote resolver configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-class process timeouts, in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Local object-database queries (`rev-list`, `rev-parse`, `show -s`)
    pub query_secs: u64,
    /// Depth-bounded network fetches and lazy blob reads
    pub fetch_secs: u64,
    /// Full fetches and unshallowing of historically deep repositories
    pub deep_fetch_secs: u64,
    /// Hosting-platform API calls
    pub api_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Timeouts {
            query_secs: 60,
            fetch_secs: 180,
            deep_fetch_secs: 900,
            api_secs: 30,
        }
    }
}

impl Timeouts {
    pub fn query(&self) -> Duration {
        Duration::from_secs(self.query_secs)
    }

    pub fn fetch(&self) -> Duration {
        Duration::from_secs(self.fetch_secs)
    }

    pub fn deep_fetch(&self) -> Duration {
        Duration::from_secs(self.deep_fetch_secs)
    }

    pub fn api(&self) -> Duration {
        Duration::from_secs(self.api_secs)
    }
}

/// Hosting-platform API configuration for descendant discovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// GitHub REST base URL
    pub github_api_url: String,
    /// GitLab REST base URL; derived from the repository host when unset
    pub gitlab_api_url: Option<String>,
    /// GitHub token (optional for public repositories, raises rate limits)
    #[serde(skip_serializing)]
    pub github_token: Option<String>,
    /// GitLab token
    #[serde(skip_serializing)]
    pub gitlab_token: Option<String>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        ResolverConfig {
            github_api_url: "https://api.github.com".to_string(),
            gitlab_api_url: None,
            github_token: None,
            gitlab_token: None,
        }
    }
}

impl ResolverConfig {
    /// Defaults overlaid with `GITHUB_API_URL`, `GITLAB_API_URL`,
    /// `GITHUB_TOKEN` and `GITLAB_TOKEN`.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply environment overrides on top of an existing configuration.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("GITHUB_API_URL") {
            self.github_api_url = url;
        }
        if let Ok(url) = std::env::var("GITLAB_API_URL") {
            self.gitlab_api_url = Some(url);
        }
        if let Ok(token) = std::env::var("GITHUB_TOKEN") {
            if !token.is_empty() {
                self.github_token = Some(token);
            }
        }
        if let Ok(token) = std::env::var("GITLAB_TOKEN") {
            if !token.is_empty() {
                self.gitlab_token = Some(token);
            }
        }
        self
    }

    /// Set the GitHub API base URL
    pub fn with_github_api_url(mut self, url: &str) -> Self {
        self.github_api_url = url.to_string();
        self
    }

    /// Set the GitLab API base URL
    pub fn with_gitlab_api_url(mut self, url: &str) -> Self {
        self.gitlab_api_url = Some(url.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_default_to_tiered_budgets() {
        let t = Timeouts::default();
        assert!(t.query() < t.fetch());
        assert!(t.fetch() < t.deep_fetch());
        assert_eq!(t.deep_fetch(), Duration::from_secs(900));
    }

    #[test]
    fn partial_timeouts_fill_from_defaults() {
        let t: Timeouts = serde_json::from_str(r#"{"fetch_secs": 42}"#).unwrap();
        assert_eq!(t.fetch_secs, 42);
        assert_eq!(t.query_secs, 60);
    }

    #[test]
    fn resolver_builders_override_urls() {
        let config = ResolverConfig::default()
            .with_github_api_url("http://localhost:1")
            .with_gitlab_api_url("http://localhost:2/api/v4");
        assert_eq!(config.github_api_url, "http://localhost:1");
        assert_eq!(
            config.gitlab_api_url.as_deref(),
            Some("http://localhost:2/api/v4")
        );
    }

    #[test]
    fn tokens_are_never_serialized() {
        let config = ResolverConfig {
            github_token: Some("secret".to_string()),
            ..ResolverConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }
}
