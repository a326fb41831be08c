//! Catastrophe records: the curated source of truth for collection.

use serde::{Deserialize, Serialize};

/// How a catastrophe came to exist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatastropheKind {
    /// One commit introduced the defect
    #[default]
    Sudden,
    /// Architectural flaw present since the code was written
    Systemic,
    /// Accumulated over many changes
    Gradual,
    /// Malicious code injected upstream
    SupplyChain,
}

/// Real-world impact, used for prioritisation only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Impact {
    pub deaths: u64,
    pub financial_loss_usd: u64,
    /// 1 (minor) to 10 (catastrophic)
    pub severity_score: u8,
}

impl Default for Impact {
    fn default() -> Self {
        Self {
            deaths: 0,
            financial_loss_usd: 0,
            severity_score: 5,
        }
    }
}

/// A known catastrophic change with its git coordinates.
///
/// Records are read-only to the core. Commits must be confirmed by a
/// verification run (`verified`) before they are fetched or sampled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatastropheRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub cve: Option<String>,

    pub repo_url: String,
    /// Commits that introduced the defect, earliest first
    #[serde(default)]
    pub breaking_commits: Vec<String>,
    /// Commits that fixed the defect
    #[serde(default)]
    pub fixing_commits: Vec<String>,

    #[serde(default, rename = "catastrophe_type")]
    pub kind: CatastropheKind,
    #[serde(default)]
    pub is_systemic: bool,
    #[serde(default)]
    pub latency_years: Option<f64>,

    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub affected_files: Vec<String>,

    #[serde(flatten)]
    pub impact: Impact,

    #[serde(default = "default_year")]
    pub year: i32,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub verified: bool,
}

fn default_language() -> String {
    "c".to_string()
}

fn default_year() -> i32 {
    2020
}

/// Whether `value` is shaped like a (possibly abbreviated) commit id.
pub fn looks_like_commit(value: &str) -> bool {
    let value = value.trim();
    (7..=64).contains(&value.len()) && value.chars().all(|c| c.is_ascii_hexdigit())
}

impl CatastropheRecord {
    /// Minimal record, mostly for tests and ad-hoc runs.
    pub fn new(id: &str, name: &str, repo_url: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            cve: None,
            repo_url: repo_url.to_string(),
            breaking_commits: Vec::new(),
            fixing_commits: Vec::new(),
            kind: CatastropheKind::default(),
            is_systemic: false,
            latency_years: None,
            language: default_language(),
            affected_files: Vec::new(),
            impact: Impact::default(),
            year: default_year(),
            description: String::new(),
            verified: false,
        }
    }

    /// First fixing commit that is a commit id rather than a free-text note.
    pub fn primary_fix_commit(&self) -> Option<&str> {
        self.fixing_commits
            .iter()
            .map(|c| c.trim())
            .find(|c| looks_like_commit(c))
    }

    /// Earliest breaking commit, if one is recorded.
    pub fn introducing_commit(&self) -> Option<&str> {
        self.breaking_commits
            .iter()
            .map(|c| c.trim())
            .find(|c| looks_like_commit(c))
    }

    /// Every commit id worth fetching: breaking commits first, then fixes.
    pub fn all_commits(&self) -> Vec<&str> {
        self.breaking_commits
            .iter()
            .chain(self.fixing_commits.iter())
            .map(|c| c.trim())
            .filter(|c| looks_like_commit(c))
            .collect()
    }

    /// Whether the record may be fetched, given the caller's bypass choice.
    pub fn is_usable(&self, verification_bypass: bool) -> bool {
        self.verified || verification_bypass
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_deserializes_flat_impact_and_defaults() {
        let json = r#"{
            "id": "heartbleed",
            "name": "Heartbleed",
            "cve": "CVE-2014-0160",
            "repo_url": "https://github.com/openssl/openssl",
            "breaking_commits": ["4817504d069b4c5082161b02a22116ad75f822b1"],
            "fixing_commits": ["96db9023b881d7cd9f379b0c154650d6c108e9a3"],
            "catastrophe_type": "sudden",
            "affected_files": ["ssl/d1_both.c", "ssl/t1_lib.c"],
            "severity_score": 10,
            "financial_loss_usd": 500000000,
            "verified": true,
            "verification_notes": "kept by the catalog, ignored here"
        }"#;
        let record: CatastropheRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.kind, CatastropheKind::Sudden);
        assert_eq!(record.impact.severity_score, 10);
        assert_eq!(record.impact.deaths, 0);
        assert_eq!(record.language, "c");
        assert_eq!(record.year, 2020);
        assert!(record.verified);
        assert_eq!(
            record.primary_fix_commit(),
            Some("96db9023b881d7cd9f379b0c154650d6c108e9a3")
        );
    }

    #[test]
    fn test_supply_chain_kind_label() {
        let kind: CatastropheKind = serde_json::from_str(r#""supply_chain""#).unwrap();
        assert_eq!(kind, CatastropheKind::SupplyChain);
    }

    #[test]
    fn test_free_text_commits_are_ignored() {
        let mut record = CatastropheRecord::new("x", "X", "https://example.com/x.git");
        record.fixing_commits = vec!["tried several, none matched".to_string()];
        assert!(record.primary_fix_commit().is_none());

        record.fixing_commits.push("abc1234".to_string());
        assert_eq!(record.primary_fix_commit(), Some("abc1234"));
    }

    #[test]
    fn test_all_commits_orders_breaking_first() {
        let mut record = CatastropheRecord::new("x", "X", "https://example.com/x.git");
        record.breaking_commits = vec!["aaaaaaa".to_string()];
        record.fixing_commits = vec!["bbbbbbb".to_string(), "n/a".to_string()];
        assert_eq!(record.all_commits(), vec!["aaaaaaa", "bbbbbbb"]);
        assert_eq!(record.introducing_commit(), Some("aaaaaaa"));
    }

    #[test]
    fn test_usable_requires_verification_or_bypass() {
        let record = CatastropheRecord::new("x", "X", "https://example.com/x.git");
        assert!(!record.is_usable(false));
        assert!(record.is_usable(true));
    }
}
