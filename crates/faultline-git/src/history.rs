//! Bounded `rev-list` enumerations over fetched history.

use crate::error::{GitError, Result};
use crate::repo::RepositoryHandle;

/// A `git rev-list` query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RevList {
    revisions: Vec<String>,
    paths: Vec<String>,
    max_count: Option<usize>,
    reverse: bool,
    first_parent: bool,
}

impl RevList {
    /// History reachable from `rev`.
    pub fn from_rev(rev: &str) -> Self {
        Self {
            revisions: vec![rev.to_string()],
            ..Self::default()
        }
    }

    /// Commits reachable from `to` but not from `from`.
    pub fn range(from: &str, to: &str) -> Self {
        Self::from_rev(&format!("{from}..{to}"))
    }

    /// Only commits touching one of `paths`.
    pub fn paths(mut self, paths: &[String]) -> Self {
        self.paths = paths.to_vec();
        self
    }

    /// Stop after `n` commits (applied before `reverse`).
    pub fn max_count(mut self, n: usize) -> Self {
        self.max_count = Some(n);
        self
    }

    /// Oldest first.
    pub fn reverse(mut self) -> Self {
        self.reverse = true;
        self
    }

    /// Follow first parents only.
    pub fn first_parent(mut self) -> Self {
        self.first_parent = true;
        self
    }

    /// Command-line arguments, `rev-list` included.
    pub fn args(&self) -> Vec<String> {
        let mut args = vec!["rev-list".to_string()];
        if self.first_parent {
            args.push("--first-parent".to_string());
        }
        if let Some(n) = self.max_count {
            args.push(format!("--max-count={n}"));
        }
        if self.reverse {
            args.push("--reverse".to_string());
        }
        args.extend(self.revisions.iter().cloned());
        args.push("--".to_string());
        args.extend(self.paths.iter().cloned());
        args
    }

    /// Run the query; most recent first unless `reverse` was requested.
    pub async fn run(&self, repo: &RepositoryHandle) -> Result<Vec<String>> {
        let args = self.args();
        let argv: Vec<&str> = args.iter().map(String::as_str).collect();
        let out = repo.query(&argv).await;
        if !out.success() {
            return Err(GitError::command_failed(&argv, out.status, &out.stderr));
        }
        let commits = out.stdout_lines().map(str::to_string).collect();
        Ok(commits)
    }
}
