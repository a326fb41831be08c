//! Verification runs: can each record's fix commit actually be fetched?
//!
//! Records under verification are not verified yet, so fetching always runs
//! in bypass mode with a small window.

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{info, warn};

use faultline_git::{get_commit_diff, CommitWindowFetcher, FetchConfig};

use crate::domain::CatastropheRecord;

/// Files listed per verification result.
const MAX_LISTED_FILES: usize = 5;

/// Outcome of verifying one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationResult {
    pub id: String,
    pub name: String,
    pub cve: Option<String>,
    pub success: bool,
    pub ancestors: usize,
    pub descendants: usize,
    pub files_changed: Vec<String>,
    pub error: Option<String>,
}

impl VerificationResult {
    fn pending(record: &CatastropheRecord) -> Self {
        Self {
            id: record.id.clone(),
            name: record.name.clone(),
            cve: record.cve.clone(),
            success: false,
            ancestors: 0,
            descendants: 0,
            files_changed: Vec::new(),
            error: None,
        }
    }

    fn failed(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// One-line note written back into the catalog.
    pub fn notes(&self, date: &str) -> String {
        format!(
            "Verified via window fetch on {date}. {} ancestors found.",
            self.ancestors
        )
    }
}

/// Fetches a small window per record to confirm its commits exist.
pub struct Verifier {
    fetcher: CommitWindowFetcher,
    config: FetchConfig,
    concurrency: usize,
}

impl Verifier {
    pub fn new(fetcher: CommitWindowFetcher) -> Self {
        Self {
            fetcher,
            config: FetchConfig::new(3, 2).with_verification_bypass(true),
            concurrency: 1,
        }
    }

    /// Verify this many records at once (results keep input order).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Verify one record; never fails, failures are reported in the result.
    pub async fn verify(&self, record: &CatastropheRecord) -> VerificationResult {
        let result = VerificationResult::pending(record);
        let Some(fix) = record.primary_fix_commit() else {
            return result.failed("no fixing commit specified");
        };

        let fetch = match self
            .fetcher
            .fetch_window(&record.repo_url, fix, &self.config)
            .await
        {
            Ok(fetch) => fetch,
            Err(e) => return result.failed(e.to_string()),
        };
        let window = match fetch.window {
            Ok(window) => window,
            Err(e) => {
                warn!(catastrophe = %record.id, error = %e, "verification failed");
                return result.failed(e.to_string());
            }
        };

        let mut result = VerificationResult {
            success: true,
            ancestors: window.ancestors().len(),
            descendants: window.descendants().len(),
            ..result
        };
        match get_commit_diff(&fetch.repo, window.target()).await {
            Ok(diff) => {
                result.files_changed = diff
                    .changed_files
                    .into_iter()
                    .take(MAX_LISTED_FILES)
                    .collect();
            }
            Err(e) => warn!(catastrophe = %record.id, error = %e, "fix diff unavailable"),
        }

        info!(
            catastrophe = %record.id,
            ancestors = result.ancestors,
            descendants = result.descendants,
            "verified"
        );
        result
    }

    /// Verify every record, in input order.
    pub async fn verify_all(&self, records: &[CatastropheRecord]) -> Vec<VerificationResult> {
        stream::iter(records)
            .map(|record| self.verify(record))
            .buffered(self.concurrency)
            .collect()
            .await
    }
}
