//! Integration tests for batch collection, verification runs and record
//! windows.

mod common;

use common::*;
use faultline_core::fakes::FixtureOracle;
use faultline_core::{
    fetch_record_windows, BatchCollector, BatchConfig, Catalog, CatastropheRecord,
    ComponentAwareSampler, SamplerConfig, Stratum, Verifier,
};
use faultline_git::{FetchConfig, FetchError};

fn verified_record(id: &str, url: &str, fix: &str, files: &[&str]) -> CatastropheRecord {
    let mut record = CatastropheRecord::new(id, id, url);
    record.fixing_commits = vec![fix.to_string()];
    record.affected_files = files.iter().map(|f| f.to_string()).collect();
    record.verified = true;
    record
}

/// Test: failures are skipped with a reason while other records still report
#[tokio::test]
async fn test_batch_partial_results_keep_input_order() {
    let repo = heartbeat_repo();
    let url = file_url(repo.dir.path());
    let missing = tempfile::tempdir().unwrap();

    let good = verified_record("heartbleed", &url, &repo.fix, &[HEARTBEAT_FILE]);
    let mut unverified = verified_record("pending", &url, &repo.fix, &[HEARTBEAT_FILE]);
    unverified.verified = false;
    let unreachable = verified_record(
        "gone",
        &file_url(&missing.path().join("gone")),
        "0123456789abcdef0123456789abcdef01234567",
        &["a.c"],
    );
    let mut no_fix = verified_record("nofix", &url, "see advisory", &[]);
    no_fix.fixing_commits = vec!["see advisory".to_string()];

    let sampler = ComponentAwareSampler::new(
        FixtureOracle::new(0.5),
        fetcher(),
        SamplerConfig::default(),
    );
    let collector = BatchCollector::new(sampler, BatchConfig { concurrency: 2 });
    let report = collector
        .run(&[good, unverified, unreachable, no_fix])
        .await;

    assert_eq!(report.succeeded(), 1);
    assert_eq!(report.catastrophes[0].id, "heartbleed");
    assert_eq!(report.catastrophes[0].safe_commits[&Stratum::SafeBefore].len(), 20);

    let skipped: Vec<&str> = report.skipped.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(skipped, vec!["pending", "gone", "nofix"]);
    assert!(report.skipped.iter().all(|s| !s.reason.is_empty()));
    assert!(report.skipped[0].reason.contains("not verified"));

    // 20 before + 3 after, nothing during.
    assert_eq!(report.metadata.total_safe_commits, 23);
    assert_eq!(report.safe_commits.len(), 23);
    assert!(report
        .safe_commits
        .iter()
        .all(|row| row.catastrophe_id == "heartbleed"));
    assert!(report.verify_digest());
}

/// Test: verification fetches a small window and feeds catalog write-back
#[tokio::test]
async fn test_verification_marks_catalog_records() {
    let repo = heartbeat_repo();
    let url = file_url(repo.dir.path());
    let text = serde_json::json!({
        "metadata": {"version": "1.0", "curator": "faultline"},
        "catastrophes": [
            {
                "id": "heartbleed",
                "name": "Heartbleed",
                "cve": "CVE-2014-0160",
                "repo_url": url,
                "fixing_commits": [repo.fix],
                "affected_files": [HEARTBEAT_FILE],
                "source_notes": "kept verbatim"
            },
            {
                "id": "typo",
                "name": "Typo",
                "repo_url": url,
                "fixing_commits": ["0123456789abcdef0123456789abcdef01234567"]
            }
        ]
    })
    .to_string();
    let mut catalog = Catalog::parse(&text).unwrap();

    let verifier = Verifier::new(fetcher()).with_concurrency(2);
    let results = verifier.verify_all(catalog.records()).await;
    assert_eq!(results.len(), 2);

    let ok = &results[0];
    assert!(ok.success, "error: {:?}", ok.error);
    assert_eq!(ok.ancestors, 3);
    assert_eq!(ok.descendants, 0);
    assert_eq!(ok.files_changed, vec![HEARTBEAT_FILE.to_string()]);
    assert!(!results[1].success);
    assert!(results[1].error.is_some());

    for result in results.iter().filter(|r| r.success) {
        assert!(catalog.mark_verified(&result.id, &result.notes("2026-10-16")));
    }
    catalog.set_last_verified("2026-10-16");

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("catalog.json");
    catalog.save(&path).unwrap();
    let reloaded = Catalog::load(&path).unwrap();
    assert!(reloaded.find("heartbleed").unwrap().verified);
    assert!(!reloaded.find("typo").unwrap().verified);

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(raw["catastrophes"][0]["source_notes"], "kept verbatim");
    assert!(raw["catastrophes"][0]["verification_notes"]
        .as_str()
        .unwrap()
        .contains("3 ancestors"));
}

/// Test: record windows cover breaking and fixing commits in one repository
#[tokio::test]
async fn test_record_windows_share_repository() {
    let repo = window_repo();
    let url = file_url(repo.dir.path());
    let mut record = verified_record("parser", &url, &repo.fix, &[PARSER_FILE]);
    record.breaking_commits = vec![repo.introducing.clone()];

    let config = FetchConfig::new(2, 2);
    let windows = fetch_record_windows(&fetcher(), &record, &config)
        .await
        .unwrap();
    assert!(windows.failures.is_empty());
    assert_eq!(windows.windows.len(), 2);
    assert_eq!(windows.windows[0].target(), repo.introducing);
    assert_eq!(windows.windows[0].ancestors(), &[repo.first.clone(), repo.second.clone()]);
    assert_eq!(windows.windows[1].target(), repo.fix);
    assert_eq!(windows.windows[1].ancestors().len(), 2);
}

/// Test: unverified records get no windows unless bypassed
#[tokio::test]
async fn test_record_windows_require_verification() {
    let repo = window_repo();
    let url = file_url(repo.dir.path());
    let mut record = verified_record("parser", &url, &repo.fix, &[PARSER_FILE]);
    record.verified = false;

    let err = fetch_record_windows(&fetcher(), &record, &FetchConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Unverified(id) if id == "parser"));

    let bypass = FetchConfig::new(1, 1).with_verification_bypass(true);
    let windows = fetch_record_windows(&fetcher(), &record, &bypass)
        .await
        .unwrap();
    assert_eq!(windows.windows.len(), 1);
}
