//! Shared fixtures: local source repositories served over `file://`.

#![allow(dead_code)]

use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use faultline_git::{CommitWindowFetcher, GitRunner, NoDescendants, Timeouts};

pub fn run_git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("git not available");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// Empty source repository that allows blob-filtered and by-id fetches.
pub fn init_source() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    run_git(dir.path(), &["init", "-q", "-b", "main"]);
    run_git(dir.path(), &["config", "user.name", "test-user"]);
    run_git(dir.path(), &["config", "user.email", "test@example.com"]);
    run_git(dir.path(), &["config", "uploadpack.allowFilter", "true"]);
    run_git(dir.path(), &["config", "uploadpack.allowAnySHA1InWant", "true"]);
    dir
}

/// Write `content` to `file` (creating directories) and commit it.
pub fn commit_file(dir: &Path, file: &str, content: &str, message: &str) -> String {
    let path = dir.join(file);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
    run_git(dir, &["add", file]);
    run_git(dir, &["commit", "-q", "-m", message]);
    run_git(dir, &["rev-parse", "HEAD"])
}

pub fn empty_commit(dir: &Path, message: &str) -> String {
    run_git(dir, &["commit", "-q", "--allow-empty", "-m", message]);
    run_git(dir, &["rev-parse", "HEAD"])
}

pub fn file_url(dir: &Path) -> String {
    format!("file://{}", dir.display())
}

pub fn fetcher() -> CommitWindowFetcher {
    CommitWindowFetcher::new(GitRunner::new(), Arc::new(NoDescendants), Timeouts::default())
}

/// Heartbeat history: 22 commits to `ssl/heartbeat.c`, the fix, then three
/// more commits to the same file and one elsewhere.
pub struct HeartbeatRepo {
    pub dir: tempfile::TempDir,
    /// Pre-fix commits, oldest first
    pub history: Vec<String>,
    pub fix: String,
    /// Post-fix commits touching the file, oldest first
    pub after: Vec<String>,
}

pub const HEARTBEAT_FILE: &str = "ssl/heartbeat.c";

pub fn heartbeat_repo() -> HeartbeatRepo {
    let dir = init_source();
    let history = (1..=22)
        .map(|i| {
            commit_file(
                dir.path(),
                HEARTBEAT_FILE,
                &format!("int hb_revision = {i};\nint process_heartbeat(void);\n"),
                &format!("heartbeat revision {i}"),
            )
        })
        .collect();
    let fix = commit_file(
        dir.path(),
        HEARTBEAT_FILE,
        "int hb_revision = 22;\nint process_heartbeat(void);\n/* bounds check payload */\n",
        "Add heartbeat payload bounds check",
    );
    let mut after = Vec::new();
    for i in 1..=3 {
        after.push(commit_file(
            dir.path(),
            HEARTBEAT_FILE,
            &format!("int hb_revision = {};\nint process_heartbeat(void);\n/* bounds check payload */\n", 22 + i),
            &format!("heartbeat follow-up {i}"),
        ));
    }
    commit_file(dir.path(), "README.md", "docs\n", "docs");
    HeartbeatRepo {
        dir,
        history,
        fix,
        after,
    }
}

/// Repository with a known introducing commit and a vulnerable window.
pub struct WindowRepo {
    pub dir: tempfile::TempDir,
    pub first: String,
    pub second: String,
    pub introducing: String,
    /// Other-file commit sharing the component
    pub shared: String,
    /// Other-file commits unrelated to the component
    pub unrelated: Vec<String>,
    /// Same-file commit inside the window
    pub same_file: String,
    /// Other-file commit the oracle cannot analyse
    pub broken: String,
    pub fix: String,
}

pub const PARSER_FILE: &str = "lib/parse.c";

pub fn window_repo() -> WindowRepo {
    let dir = init_source();
    let d = dir.path();
    let first = commit_file(d, PARSER_FILE, "SHARED int parse_v1;\n", "parser v1");
    let second = commit_file(d, PARSER_FILE, "SHARED int parse_v2;\n", "parser v2");
    let introducing = commit_file(d, PARSER_FILE, "SHARED int parse_v3; /* unchecked */\n", "parser v3");
    let shared = commit_file(d, "lib/util.c", "SHARED int util;\n", "util shares parser state");
    let net = commit_file(d, "net/socket.c", "int socket_open;\n", "socket");
    let same_file = commit_file(d, PARSER_FILE, "SHARED int parse_v4; /* unchecked */\n", "parser v4");
    let io = commit_file(d, "io/read.c", "int read_all;\n", "reader");
    let broken = commit_file(d, "gen/table.c", "BROKEN generated table\n", "generated table");
    let fix = commit_file(d, PARSER_FILE, "SHARED int parse_v5; /* checked */\n", "Fix parser bounds");
    WindowRepo {
        dir,
        first,
        second,
        introducing,
        shared,
        unrelated: vec![net, io],
        same_file,
        broken,
        fix,
    }
}
