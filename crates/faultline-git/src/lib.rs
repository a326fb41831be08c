//! Faultline Git Library
//!
//! Minimal-bandwidth access to remote git history: commit windows fetched
//! without blobs, before/after extraction without a checkout, descendant
//! discovery through hosting APIs and a fetch ladder for deeper history.

pub mod config;
pub mod diff;
pub mod error;
pub mod history;
pub mod ladder;
pub mod process;
pub mod remote;
pub mod repo;
pub mod window;

pub use config::{ResolverConfig, Timeouts};
pub use diff::{
    changed_paths, commit_metadata, first_parent, get_commit_diff, is_source_path, CommitDiff,
    CommitMetadata, SOURCE_EXTENSIONS,
};
pub use error::{FetchError, GitError, Result};
pub use history::RevList;
pub use ladder::{
    initial_action, transition, FetchState, HistoryLoader, LadderAction, LadderEvent,
    LoadedHistory, TIP_REF,
};
pub use process::{GitRunner, GitVersion, ProcessOutput, MIN_GIT_VERSION, TIMEOUT_SENTINEL};
pub use remote::{
    detect_host, HostKind, HostedHistoryResolver, HostedRepo, NoDescendants,
    RemoteHistoryResolver,
};
pub use repo::RepositoryHandle;
pub use window::{
    CommitWindow, CommitWindowFetcher, FetchConfig, WindowFetch, DEFAULT_REACHABILITY_BOUND,
};
