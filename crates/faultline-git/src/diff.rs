//! Before/after extraction without a working-tree checkout.
//!
//! All reads go through the object database (`show`, `rev-parse`), so
//! a blobless repository only downloads the blobs actually materialised.
//!
//! Merge commits are diffed against their first parent only. Changes that
//! arrived through the second parent are not visible to the extractor.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{GitError, Result};
use crate::repo::RepositoryHandle;

/// File extensions the downstream analyser can parse.
pub const SOURCE_EXTENSIONS: &[&str] = &[
    "c", "cc", "cpp", "cxx", "h", "hpp", "java", "py", "js", "ts", "go", "rs", "rb",
];

/// Content of one changed file before and after a commit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitDiff {
    /// Content at the first parent; empty for added files and root commits
    pub before: String,
    /// Content at the commit; empty for deleted files
    pub after: String,
    /// Every path touched relative to the first parent
    pub changed_files: Vec<String>,
    /// Path that `before`/`after` were read from
    pub selected_file: Option<String>,
}

impl CommitDiff {
    /// No touched paths (empty or tree-identical commit).
    pub fn is_empty(&self) -> bool {
        self.changed_files.is_empty()
    }

    /// At least one side has text.
    pub fn has_content(&self) -> bool {
        !self.before.is_empty() || !self.after.is_empty()
    }
}

/// Committer date and subject of a commit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitMetadata {
    /// Strict ISO 8601 committer date
    pub date: String,
    /// First line of the message
    pub subject: String,
}

/// Whether `path` has an allow-listed source extension.
pub fn is_source_path(path: &str) -> bool {
    let file = path.rsplit('/').next().unwrap_or(path);
    match file.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => {
            SOURCE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
        }
        _ => false,
    }
}

/// First source path, else the first path.
pub fn select_file(paths: &[String]) -> Option<&str> {
    paths
        .iter()
        .find(|p| is_source_path(p))
        .or_else(|| paths.first())
        .map(String::as_str)
}

/// Paths touched by `commit` relative to its first parent.
pub async fn changed_paths(repo: &RepositoryHandle, commit: &str) -> Result<Vec<String>> {
    let args = [
        "show",
        "--name-only",
        "--format=",
        "--diff-merges=first-parent",
        commit,
    ];
    let out = repo.query(&args).await;
    if !out.success() {
        return Err(GitError::command_failed(&args, out.status, &out.stderr));
    }
    let paths = out.stdout_lines().map(str::to_string).collect();
    Ok(paths)
}

/// First parent of `commit`, `None` for root commits or shallow boundaries.
pub async fn first_parent(repo: &RepositoryHandle, commit: &str) -> Option<String> {
    repo.resolve_commit(&format!("{commit}^1")).await
}

/// Content of `path` at `rev`; empty when the path does not exist there.
pub async fn file_at(repo: &RepositoryHandle, rev: &str, path: &str) -> String {
    let spec = format!("{rev}:{path}");
    // May lazily fetch the blob from the promisor remote.
    let out = repo.fetch(&["show", &spec]).await;
    if out.success() {
        out.stdout
    } else {
        debug!(%spec, reason = %out.reason(), "path not readable at revision");
        String::new()
    }
}

/// Before/after text of the most relevant file changed by `commit`.
pub async fn get_commit_diff(repo: &RepositoryHandle, commit: &str) -> Result<CommitDiff> {
    let changed_files = changed_paths(repo, commit).await?;
    let Some(target) = select_file(&changed_files).map(str::to_string) else {
        return Ok(CommitDiff::default());
    };

    let before = match first_parent(repo, commit).await {
        Some(parent) => file_at(repo, &parent, &target).await,
        None => String::new(),
    };
    let after = file_at(repo, commit, &target).await;

    Ok(CommitDiff {
        before,
        after,
        changed_files,
        selected_file: Some(target),
    })
}

/// Committer date and subject for `commit`.
pub async fn commit_metadata(repo: &RepositoryHandle, commit: &str) -> Result<CommitMetadata> {
    let args = ["show", "-s", "--format=%cI%n%s", commit];
    let out = repo.query(&args).await;
    if !out.success() {
        return Err(GitError::command_failed(&args, out.status, &out.stderr));
    }
    let mut lines = out.stdout.lines();
    Ok(CommitMetadata {
        date: lines.next().unwrap_or("").trim().to_string(),
        subject: lines.next().unwrap_or("").trim().to_string(),
    })
}
