//! Error taxonomy for sampling, configuration and oracle failures.

use std::path::PathBuf;

use faultline_git::{FetchError, GitError};

/// Errors produced by a component oracle.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("nothing to analyse: before and after are both empty")]
    Empty,

    #[error("component extraction failed: {0}")]
    Extraction(String),
}

/// Errors that abort sampling for one catastrophe.
#[derive(Debug, thiserror::Error)]
pub enum SampleError {
    #[error("catastrophe record {0} is not verified (enable verification bypass to sample it)")]
    Unverified(String),

    #[error("catastrophe record {0} has no usable fixing commit")]
    MissingFixCommit(String),

    #[error("baseline component unavailable: {0}")]
    Baseline(#[source] OracleError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Git(#[from] GitError),
}

/// Errors loading configuration or catastrophe catalogs.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid catalog: {0}")]
    Catalog(#[from] serde_json::Error),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(key: &str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type for sampling operations.
pub type Result<T> = std::result::Result<T, SampleError>;
