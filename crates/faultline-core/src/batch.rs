//! Batch collection across many catastrophes.
//!
//! Each catastrophe is sampled independently with bounded concurrency. A
//! failing catastrophe is skipped with a one-line reason; the run always
//! returns whatever was collected.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::Instrument;
use uuid::Uuid;

use crate::component::ComponentOracle;
use crate::config::BatchConfig;
use crate::domain::{CatastropheRecord, Stratum};
use crate::obs;
use crate::sampler::{ComponentAwareSampler, SampleOutcome};

/// Per-catastrophe summary in a dataset report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatastropheEntry {
    pub id: String,
    pub name: String,
    pub cve: Option<String>,
    pub fix_commit: String,
    pub same_component_skipped: bool,
    /// Stratum label → accepted commit ids
    pub safe_commits: BTreeMap<Stratum, Vec<String>>,
}

/// One accepted safe commit in a dataset report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafeCommitRow {
    pub commit_hash: String,
    pub category: Stratum,
    pub catastrophe_id: String,
    pub component_overlap: f64,
    pub files: Vec<String>,
    pub date: String,
    pub message: String,
}

/// A catastrophe that produced no data, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedCatastrophe {
    pub id: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub k_hops: u32,
    pub overlap_threshold: f64,
    pub total_catastrophes: usize,
    pub total_skipped: usize,
    pub total_safe_commits: usize,
    /// SHA-256 of the serialized `catastrophes` and `safe_commits` sections
    pub digest: String,
}

/// Persisted output of a batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetReport {
    pub catastrophes: Vec<CatastropheEntry>,
    pub safe_commits: Vec<SafeCommitRow>,
    pub skipped: Vec<SkippedCatastrophe>,
    pub metadata: ReportMetadata,
}

impl DatasetReport {
    /// Assemble a report from per-catastrophe results in input order.
    pub fn build(
        results: Vec<(CatastropheRecord, SampleOutcome)>,
        skipped: Vec<SkippedCatastrophe>,
        k_hops: u32,
        overlap_threshold: f64,
    ) -> Self {
        let mut catastrophes = Vec::with_capacity(results.len());
        let mut safe_commits = Vec::new();

        for (record, outcome) in &results {
            let mut ids = BTreeMap::new();
            for stratum in Stratum::ALL {
                let commits = outcome.commits(stratum);
                ids.insert(
                    stratum,
                    commits.iter().map(|c| c.commit_id().to_string()).collect(),
                );
                safe_commits.extend(commits.iter().map(|c| SafeCommitRow {
                    commit_hash: c.commit_id().to_string(),
                    category: stratum,
                    catastrophe_id: record.id.clone(),
                    component_overlap: c.component_overlap(),
                    files: c.changed_files().to_vec(),
                    date: c.commit_date().to_string(),
                    message: c.commit_message().to_string(),
                }));
            }
            catastrophes.push(CatastropheEntry {
                id: record.id.clone(),
                name: record.name.clone(),
                cve: record.cve.clone(),
                fix_commit: outcome.fix_commit().to_string(),
                same_component_skipped: outcome.same_component_skipped(),
                safe_commits: ids,
            });
        }

        let digest = content_digest(&catastrophes, &safe_commits);
        let metadata = ReportMetadata {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            k_hops,
            overlap_threshold,
            total_catastrophes: catastrophes.len(),
            total_skipped: skipped.len(),
            total_safe_commits: safe_commits.len(),
            digest,
        };
        Self {
            catastrophes,
            safe_commits,
            skipped,
            metadata,
        }
    }

    pub fn succeeded(&self) -> usize {
        self.catastrophes.len()
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    /// Whether the digest still matches the report's content.
    pub fn verify_digest(&self) -> bool {
        content_digest(&self.catastrophes, &self.safe_commits) == self.metadata.digest
    }
}

fn content_digest(catastrophes: &[CatastropheEntry], safe_commits: &[SafeCommitRow]) -> String {
    let mut hasher = Sha256::new();
    // Vec/struct serialization cannot fail for these types.
    hasher.update(serde_json::to_vec(catastrophes).unwrap_or_default());
    hasher.update(serde_json::to_vec(safe_commits).unwrap_or_default());
    hex::encode(hasher.finalize())
}

/// Runs the sampler over many records with bounded concurrency.
pub struct BatchCollector<O: ComponentOracle> {
    sampler: ComponentAwareSampler<O>,
    config: BatchConfig,
}

impl<O: ComponentOracle> BatchCollector<O> {
    pub fn new(sampler: ComponentAwareSampler<O>, config: BatchConfig) -> Self {
        Self { sampler, config }
    }

    pub fn sampler(&self) -> &ComponentAwareSampler<O> {
        &self.sampler
    }

    /// Sample every record; failures become skip entries.
    pub async fn run(&self, records: &[CatastropheRecord]) -> DatasetReport {
        let concurrency = self.config.concurrency.max(1);
        let mut finished: Vec<(usize, Result<SampleOutcome, String>)> =
            stream::iter(records.iter().enumerate())
                .map(|(index, record)| async move {
                    let result = self
                        .sampler
                        .collect_for_record(record)
                        .instrument(obs::catastrophe_span(&record.id))
                        .await
                        .map_err(|e| e.to_string());
                    (index, result)
                })
                .buffer_unordered(concurrency)
                .collect()
                .await;
        finished.sort_by_key(|(index, _)| *index);

        let mut results = Vec::new();
        let mut skipped = Vec::new();
        for (index, result) in finished {
            let record = &records[index];
            match result {
                Ok(outcome) => results.push((record.clone(), outcome)),
                Err(reason) => {
                    obs::emit_catastrophe_skipped(&record.id, &reason);
                    skipped.push(SkippedCatastrophe {
                        id: record.id.clone(),
                        reason,
                    });
                }
            }
        }

        let sampler_config = self.sampler.config();
        let report = DatasetReport::build(
            results,
            skipped,
            sampler_config.k_hops,
            sampler_config.overlap_threshold,
        );
        obs::emit_batch_finished(
            &report.metadata.run_id.to_string(),
            report.succeeded(),
            report.skipped_count(),
            report.metadata.total_safe_commits,
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_report() -> DatasetReport {
        DatasetReport::build(
            Vec::new(),
            vec![SkippedCatastrophe {
                id: "x".to_string(),
                reason: "catastrophe record x is not verified".to_string(),
            }],
            3,
            0.1,
        )
    }

    #[test]
    fn test_report_counts_and_digest() {
        let report = empty_report();
        assert_eq!(report.succeeded(), 0);
        assert_eq!(report.skipped_count(), 1);
        assert_eq!(report.metadata.total_skipped, 1);
        assert_eq!(report.metadata.digest.len(), 64);
        assert!(report.verify_digest());
    }

    #[test]
    fn test_digest_ignores_run_identity() {
        let a = empty_report();
        let b = empty_report();
        assert_ne!(a.metadata.run_id, b.metadata.run_id);
        assert_eq!(a.metadata.digest, b.metadata.digest);
    }

    #[test]
    fn test_tampered_report_fails_digest() {
        let mut report = empty_report();
        report.safe_commits.push(SafeCommitRow {
            commit_hash: "abc".to_string(),
            category: Stratum::SafeAfter,
            catastrophe_id: "x".to_string(),
            component_overlap: 0.5,
            files: Vec::new(),
            date: String::new(),
            message: String::new(),
        });
        assert!(!report.verify_digest());
    }

    #[test]
    fn test_report_serializes_shape() {
        let json = serde_json::to_value(empty_report()).unwrap();
        assert!(json["catastrophes"].is_array());
        assert!(json["safe_commits"].is_array());
        assert_eq!(json["skipped"][0]["id"], "x");
        assert_eq!(json["metadata"]["k_hops"], 3);
    }
}
