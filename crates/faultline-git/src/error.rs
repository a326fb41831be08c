//! Error types for faultline-git

use thiserror::Error;

/// Errors raised by local git plumbing.
#[derive(Error, Debug)]
pub enum GitError {
    /// git is missing or too old to run any fetch at all
    #[error("git prerequisite not met: {0}")]
    Prerequisite(String),

    /// A git command exited with a non-zero status
    #[error("git {command} failed (status {status}): {stderr}")]
    CommandFailed {
        command: String,
        status: i32,
        stderr: String,
    },

    /// IO error while preparing a working directory
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client could not be constructed
    #[error("HTTP client error: {0}")]
    Http(String),
}

impl GitError {
    /// Build a `CommandFailed` from the first argument and the captured stderr.
    pub(crate) fn command_failed(args: &[&str], status: i32, stderr: &str) -> Self {
        GitError::CommandFailed {
            command: args.first().copied().unwrap_or("<none>").to_string(),
            status,
            stderr: first_line(stderr),
        }
    }
}

/// Errors raised while fetching commit windows or preparing history.
#[derive(Error, Debug)]
pub enum FetchError {
    /// Record has not been verified and the caller did not opt out
    #[error("catastrophe record {0} is not verified (enable verification bypass to fetch it)")]
    Unverified(String),

    /// Remote rejected the fetch, is unreachable, or authentication failed
    #[error("repository {repo} unreachable for {commit}: {reason}")]
    Unreachable {
        repo: String,
        commit: String,
        reason: String,
    },

    /// Fetch succeeded but the target did not appear in the listed history
    #[error("commit {commit} not found in fetched history")]
    TargetNotFound { commit: String },

    /// Every rung of the fetch ladder failed
    #[error("history for {repo} could not be loaded: {reason}")]
    HistoryUnavailable { repo: String, reason: String },

    #[error(transparent)]
    Git(#[from] GitError),
}

/// Result type for local git operations.
pub type Result<T> = std::result::Result<T, GitError>;

/// First non-empty line of a stderr capture, for one-line reasons.
pub(crate) fn first_line(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_failed_keeps_first_stderr_line() {
        let err = GitError::command_failed(
            &["fetch", "origin"],
            128,
            "\nfatal: could not read from remote\nmore detail",
        );
        let msg = err.to_string();
        assert!(msg.contains("git fetch failed"));
        assert!(msg.contains("128"));
        assert!(msg.contains("could not read from remote"));
        assert!(!msg.contains("more detail"));
    }

    #[test]
    fn unreachable_error_names_repo_and_commit() {
        let err = FetchError::Unreachable {
            repo: "https://example.com/a.git".to_string(),
            commit: "abc123".to_string(),
            reason: "timeout".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("example.com/a.git"));
        assert!(msg.contains("abc123"));
    }

    #[test]
    fn unverified_error_mentions_bypass() {
        let err = FetchError::Unverified("heartbleed".to_string());
        assert!(err.to_string().contains("heartbleed"));
        assert!(err.to_string().contains("bypass"));
    }
}
