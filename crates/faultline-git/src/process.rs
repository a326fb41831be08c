//! Git process execution with timeouts.
//!
//! Every invocation returns a [`ProcessOutput`]; non-zero exits, spawn
//! failures and timeouts are reported through the status and stderr fields
//! so callers interpret failure uniformly.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{first_line, GitError, Result};

/// Stderr value reported when a command exceeded its timeout.
pub const TIMEOUT_SENTINEL: &str = "timeout";

/// Oldest git release with `--diff-merges=first-parent` and partial-clone filters.
pub const MIN_GIT_VERSION: GitVersion = GitVersion {
    major: 2,
    minor: 31,
    patch: 0,
};

/// Captured result of one process invocation.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// Captured stdout (lossy UTF-8).
    pub stdout: String,

    /// Captured stderr, or [`TIMEOUT_SENTINEL`] on timeout.
    pub stderr: String,

    /// Exit code; `-1` for timeouts, signals and spawn failures.
    pub status: i32,

    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

impl ProcessOutput {
    fn failed(stderr: String, start: Instant) -> Self {
        Self {
            stdout: String::new(),
            stderr,
            status: -1,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// Whether the command exited with status 0.
    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// Whether the command was killed for exceeding its timeout.
    pub fn timed_out(&self) -> bool {
        self.status == -1 && self.stderr == TIMEOUT_SENTINEL
    }

    /// Non-empty, trimmed stdout lines.
    pub fn stdout_lines(&self) -> impl Iterator<Item = &str> {
        self.stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
    }

    /// One-line failure reason suitable for skip ledgers.
    pub fn reason(&self) -> String {
        let line = first_line(&self.stderr);
        if line.is_empty() {
            format!("exit status {}", self.status)
        } else {
            line
        }
    }
}

/// Parsed `git --version` output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct GitVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl GitVersion {
    /// Parse `git version 2.39.2`, `git version 2.37.1 (Apple Git-137.1)` or
    /// `git version 2.40.0.windows.1`.
    pub fn parse(text: &str) -> Option<Self> {
        let raw = text.trim().strip_prefix("git version ")?;
        let raw = raw.split_whitespace().next()?;
        let mut parts = raw.split('.').map(|p| p.parse::<u32>());
        let major = parts.next()?.ok()?;
        let minor = parts.next().and_then(|p| p.ok()).unwrap_or(0);
        let patch = parts.next().and_then(|p| p.ok()).unwrap_or(0);
        Some(Self {
            major,
            minor,
            patch,
        })
    }
}

impl fmt::Display for GitVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Runs git (or a substitute program) as a child process.
#[derive(Debug, Clone)]
pub struct GitRunner {
    program: PathBuf,
}

impl Default for GitRunner {
    fn default() -> Self {
        Self {
            program: PathBuf::from("git"),
        }
    }
}

impl GitRunner {
    /// Runner for the `git` found on `PATH`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runner for an explicit binary.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Program this runner invokes.
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Execute `args` in `cwd`, killing the child if it outlives `timeout`.
    pub async fn run(&self, cwd: &Path, args: &[&str], timeout: Duration) -> ProcessOutput {
        let start = Instant::now();
        debug!(program = %self.program.display(), ?args, "running");

        let child = Command::new(&self.program)
            .args(args)
            .current_dir(cwd)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(e) => {
                warn!(program = %self.program.display(), error = %e, "spawn failed");
                return ProcessOutput::failed(e.to_string(), start);
            }
        };

        // On timeout the wait future is dropped together with the child,
        // and kill_on_drop terminates the process.
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return ProcessOutput::failed(e.to_string(), start),
            Err(_) => {
                warn!(
                    ?args,
                    timeout_secs = timeout.as_secs(),
                    "git command timed out, killed"
                );
                return ProcessOutput::failed(TIMEOUT_SENTINEL.to_string(), start);
            }
        };

        ProcessOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            status: output.status.code().unwrap_or(-1),
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// Installed git version.
    pub async fn version(&self) -> Result<GitVersion> {
        let out = self
            .run(&std::env::temp_dir(), &["--version"], Duration::from_secs(10))
            .await;
        if !out.success() {
            return Err(GitError::Prerequisite(format!(
                "could not run `{} --version` ({}); install git {} or newer and make sure it is on PATH",
                self.program.display(),
                out.reason(),
                MIN_GIT_VERSION
            )));
        }
        GitVersion::parse(&out.stdout).ok_or_else(|| {
            GitError::Prerequisite(format!(
                "unrecognised git version string: {}",
                out.stdout.trim()
            ))
        })
    }

    /// Fail unless git is installed and at least [`MIN_GIT_VERSION`].
    pub async fn ensure_available(&self) -> Result<GitVersion> {
        let version = self.version().await?;
        if version < MIN_GIT_VERSION {
            return Err(GitError::Prerequisite(format!(
                "git {version} is too old; faultline needs git {MIN_GIT_VERSION} or newer"
            )));
        }
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_version() {
        let v = GitVersion::parse("git version 2.39.2\n").unwrap();
        assert_eq!(
            v,
            GitVersion {
                major: 2,
                minor: 39,
                patch: 2
            }
        );
    }

    #[test]
    fn parses_vendor_suffixes() {
        let apple = GitVersion::parse("git version 2.37.1 (Apple Git-137.1)").unwrap();
        assert_eq!(apple.to_string(), "2.37.1");

        let windows = GitVersion::parse("git version 2.40.0.windows.1").unwrap();
        assert_eq!(windows.to_string(), "2.40.0");
    }

    #[test]
    fn rejects_garbage() {
        assert!(GitVersion::parse("hg 6.1").is_none());
        assert!(GitVersion::parse("").is_none());
    }

    #[test]
    fn version_ordering_matches_semver() {
        let old = GitVersion::parse("git version 2.30.9").unwrap();
        let new = GitVersion::parse("git version 2.31").unwrap();
        assert!(old < MIN_GIT_VERSION);
        assert!(new >= MIN_GIT_VERSION);
    }

    #[test]
    fn reason_falls_back_to_status() {
        let out = ProcessOutput {
            stdout: String::new(),
            stderr: "  \n".to_string(),
            status: 3,
            duration_ms: 0,
        };
        assert_eq!(out.reason(), "exit status 3");
    }

    #[tokio::test]
    async fn missing_binary_reports_failure_instead_of_panicking() {
        let runner = GitRunner::with_program("faultline-no-such-binary");
        let out = runner
            .run(&std::env::temp_dir(), &["status"], Duration::from_secs(5))
            .await;
        assert!(!out.success());
        assert_eq!(out.status, -1);
        assert!(!out.stderr.is_empty());
        assert!(!out.timed_out());
    }

    #[tokio::test]
    async fn missing_binary_fails_prerequisite_check() {
        let runner = GitRunner::with_program("faultline-no-such-binary");
        let err = runner.ensure_available().await.unwrap_err();
        assert!(matches!(err, GitError::Prerequisite(_)));
        assert!(err.to_string().contains("PATH"));
    }

    #[tokio::test]
    async fn slow_command_is_killed_with_sentinel() {
        let runner = GitRunner::with_program("sleep");
        let out = runner
            .run(&std::env::temp_dir(), &["5"], Duration::from_millis(100))
            .await;
        assert!(out.timed_out());
        assert_eq!(out.stderr, TIMEOUT_SENTINEL);
        assert!(out.duration_ms < 5000);
    }

    #[tokio::test]
    async fn installed_git_meets_minimum() {
        let version = GitRunner::new().ensure_available().await.unwrap();
        assert!(version >= MIN_GIT_VERSION);
    }
}
