//! Commit windows for every commit of a catastrophe record.

use faultline_git::{
    CommitWindow, CommitWindowFetcher, FetchConfig, FetchError, RepositoryHandle,
};
use tracing::{info, warn};

use crate::domain::CatastropheRecord;

/// Windows fetched for one record, sharing a single repository.
#[derive(Debug)]
pub struct RecordWindows {
    pub repo: RepositoryHandle,
    /// One window per commit that could be fetched, breaking commits first
    pub windows: Vec<CommitWindow>,
    /// `(commit, reason)` for each commit that could not
    pub failures: Vec<(String, String)>,
}

/// Fetch a window around every breaking and fixing commit of `record`.
///
/// Unverified records are refused unless `config.verification_bypass` is set.
pub async fn fetch_record_windows(
    fetcher: &CommitWindowFetcher,
    record: &CatastropheRecord,
    config: &FetchConfig,
) -> Result<RecordWindows, FetchError> {
    if !record.is_usable(config.verification_bypass) {
        return Err(FetchError::Unverified(record.id.clone()));
    }

    let repo = fetcher.open(&record.repo_url).await?;
    let mut windows = Vec::new();
    let mut failures = Vec::new();
    for commit in record.all_commits() {
        match fetcher.fetch_window_into(&repo, commit, config).await {
            Ok(window) => windows.push(window),
            Err(e) => {
                warn!(catastrophe = %record.id, %commit, error = %e, "window skipped");
                failures.push((commit.to_string(), e.to_string()));
            }
        }
    }

    info!(
        catastrophe = %record.id,
        windows = windows.len(),
        failed = failures.len(),
        "record windows fetched"
    );
    Ok(RecordWindows {
        repo,
        windows,
        failures,
    })
}
