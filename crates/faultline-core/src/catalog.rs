//! Catastrophe catalogs: `{ "catastrophes": [ ... ] }` JSON documents.
//!
//! The raw document is kept alongside the parsed records so a verification
//! run can write results back without dropping fields the records do not
//! model.

use std::path::Path;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::CatastropheRecord;
use crate::error::ConfigError;

/// An entry that could not be turned into a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedEntry {
    pub id: String,
    pub reason: String,
}

/// A parsed catalog plus its source document.
#[derive(Debug, Clone)]
pub struct Catalog {
    raw: Value,
    records: Vec<CatastropheRecord>,
    rejected: Vec<RejectedEntry>,
}

impl Catalog {
    /// Parse a catalog document. Malformed entries are rejected individually.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let raw: Value = serde_json::from_str(text)?;
        let entries = raw
            .get("catastrophes")
            .and_then(Value::as_array)
            .ok_or_else(|| ConfigError::invalid("catastrophes", "expected an array"))?;

        let mut records = Vec::with_capacity(entries.len());
        let mut rejected = Vec::new();
        for (index, entry) in entries.iter().enumerate() {
            let id = entry
                .get("id")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("#{index}"));
            match serde_json::from_value::<CatastropheRecord>(entry.clone()) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(%id, error = %e, "rejected catalog entry");
                    rejected.push(RejectedEntry {
                        id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        debug!(records = records.len(), rejected = rejected.len(), "catalog parsed");
        Ok(Self {
            raw,
            records,
            rejected,
        })
    }

    /// Read and parse a catalog file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    pub fn records(&self) -> &[CatastropheRecord] {
        &self.records
    }

    pub fn rejected(&self) -> &[RejectedEntry] {
        &self.rejected
    }

    pub fn find(&self, id: &str) -> Option<&CatastropheRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    /// Set `verified` and `verification_notes` on the raw entry for `id`.
    ///
    /// Returns `false` when no entry has that id.
    pub fn mark_verified(&mut self, id: &str, notes: &str) -> bool {
        let Some(entries) = self
            .raw
            .get_mut("catastrophes")
            .and_then(Value::as_array_mut)
        else {
            return false;
        };
        let Some(entry) = entries
            .iter_mut()
            .find(|e| e.get("id").and_then(Value::as_str) == Some(id))
        else {
            return false;
        };
        if let Some(object) = entry.as_object_mut() {
            object.insert("verified".to_string(), Value::Bool(true));
            object.insert(
                "verification_notes".to_string(),
                Value::String(notes.to_string()),
            );
        }
        if let Some(record) = self.records.iter_mut().find(|r| r.id == id) {
            record.verified = true;
        }
        true
    }

    /// Record when the catalog was last verified (top-level `last_verified`).
    pub fn set_last_verified(&mut self, date: &str) {
        if let Some(object) = self.raw.as_object_mut() {
            object.insert("last_verified".to_string(), Value::String(date.to_string()));
        }
    }

    /// The document with any updates applied, pretty-printed.
    pub fn to_json_pretty(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(&self.raw)?)
    }

    /// Write the document back to `path`.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let text = self.to_json_pretty()?;
        std::fs::write(path, text + "\n").map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"{
        "version": 2,
        "catastrophes": [
            {
                "id": "heartbleed",
                "name": "Heartbleed",
                "repo_url": "https://github.com/openssl/openssl",
                "fixing_commits": ["96db9023b881d7cd9f379b0c154650d6c108e9a3"],
                "sources": ["https://heartbleed.com"]
            },
            { "id": "broken", "name": 42 }
        ]
    }"#;

    #[test]
    fn test_parse_rejects_bad_entries_individually() {
        let catalog = Catalog::parse(CATALOG).unwrap();
        assert_eq!(catalog.records().len(), 1);
        assert_eq!(catalog.rejected().len(), 1);
        assert_eq!(catalog.rejected()[0].id, "broken");
        assert!(catalog.find("heartbleed").is_some());
    }

    #[test]
    fn test_missing_array_is_an_error() {
        assert!(Catalog::parse(r#"{"items": []}"#).is_err());
        assert!(Catalog::parse("not json").is_err());
    }

    #[test]
    fn test_mark_verified_preserves_unknown_fields() {
        let mut catalog = Catalog::parse(CATALOG).unwrap();
        assert!(catalog.mark_verified("heartbleed", "3 ancestors found"));
        assert!(!catalog.mark_verified("nope", ""));
        catalog.set_last_verified("2026-10-16");

        let out: Value = serde_json::from_str(&catalog.to_json_pretty().unwrap()).unwrap();
        let entry = &out["catastrophes"][0];
        assert_eq!(entry["verified"], true);
        assert_eq!(entry["verification_notes"], "3 ancestors found");
        assert_eq!(entry["sources"][0], "https://heartbleed.com");
        assert_eq!(out["version"], 2);
        assert_eq!(out["last_verified"], "2026-10-16");
        assert!(catalog.find("heartbleed").unwrap().verified);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        let catalog = Catalog::parse(CATALOG).unwrap();
        catalog.save(&path).unwrap();
        let reloaded = Catalog::load(&path).unwrap();
        assert_eq!(reloaded.records(), catalog.records());
    }
}
