//! Strata and the safe commits collected into them.

use std::fmt;

use faultline_git::{CommitDiff, CommitMetadata};
use serde::{Deserialize, Serialize};

/// Where a safe commit sits relative to a catastrophe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stratum {
    /// Same component, before the defect was introduced
    SafeBefore,
    /// Same component, after the fix
    SafeAfter,
    /// Unrelated component, while the defect was live
    SafeDuring,
    /// Unrelated repository; supplied externally
    SafeRandom,
}

impl Stratum {
    pub const ALL: [Stratum; 4] = [
        Stratum::SafeBefore,
        Stratum::SafeAfter,
        Stratum::SafeDuring,
        Stratum::SafeRandom,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Stratum::SafeBefore => "SAFE_BEFORE",
            Stratum::SafeAfter => "SAFE_AFTER",
            Stratum::SafeDuring => "SAFE_DURING",
            Stratum::SafeRandom => "SAFE_RANDOM",
        }
    }

    /// Acceptance rule for a candidate with the given component overlap.
    ///
    /// Same-component strata need `overlap >= threshold`, `SafeDuring` needs
    /// `overlap < threshold`.
    pub fn admits(&self, overlap: f64, threshold: f64) -> bool {
        match self {
            Stratum::SafeBefore | Stratum::SafeAfter => overlap >= threshold,
            Stratum::SafeDuring => overlap < threshold,
            Stratum::SafeRandom => true,
        }
    }
}

impl fmt::Display for Stratum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A commit accepted into a stratum, with the code needed for training.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SafeCommit {
    commit_id: String,
    stratum: Stratum,
    before_code: String,
    after_code: String,
    language: String,
    changed_files: Vec<String>,
    commit_date: String,
    commit_message: String,
    component_overlap: f64,
}

impl SafeCommit {
    pub fn new(
        commit_id: String,
        stratum: Stratum,
        diff: CommitDiff,
        metadata: CommitMetadata,
        language: &str,
        component_overlap: f64,
    ) -> Self {
        Self {
            commit_id,
            stratum,
            before_code: diff.before,
            after_code: diff.after,
            language: language.to_string(),
            changed_files: diff.changed_files,
            commit_date: metadata.date,
            commit_message: metadata.subject,
            component_overlap,
        }
    }

    pub fn commit_id(&self) -> &str {
        &self.commit_id
    }

    pub fn stratum(&self) -> Stratum {
        self.stratum
    }

    pub fn before_code(&self) -> &str {
        &self.before_code
    }

    pub fn after_code(&self) -> &str {
        &self.after_code
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn changed_files(&self) -> &[String] {
        &self.changed_files
    }

    pub fn commit_date(&self) -> &str {
        &self.commit_date
    }

    pub fn commit_message(&self) -> &str {
        &self.commit_message
    }

    pub fn component_overlap(&self) -> f64 {
        self.component_overlap
    }
}
