//! Deterministic component oracle (testing only)
//!
//! `FixtureOracle` decides overlaps from marker substrings in the code it
//! is given, so tests can script which commits land in which stratum.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::component::{Component, ComponentOracle};
use crate::error::OracleError;

/// Component carrying a pre-decided overlap value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixtureComponent {
    overlap: f64,
}

impl FixtureComponent {
    pub fn new(overlap: f64) -> Self {
        Self { overlap }
    }

    pub fn overlap(&self) -> f64 {
        self.overlap
    }
}

impl Component for FixtureComponent {
    /// The overlap scripted for `other`; the baseline side is ignored.
    fn overlap_ratio(&self, other: &Self) -> f64 {
        other.overlap
    }
}

/// Oracle whose overlaps are driven by markers in the code.
#[derive(Debug, Default)]
pub struct FixtureOracle {
    default_overlap: f64,
    rules: Vec<(String, f64)>,
    failing_markers: Vec<String>,
    calls: AtomicUsize,
}

impl FixtureOracle {
    /// Every component overlaps the baseline by `default_overlap`.
    pub fn new(default_overlap: f64) -> Self {
        Self {
            default_overlap,
            ..Self::default()
        }
    }

    /// Code containing `marker` overlaps by `overlap` (first matching rule wins).
    pub fn with_rule(mut self, marker: &str, overlap: f64) -> Self {
        self.rules.push((marker.to_string(), overlap));
        self
    }

    /// Code containing `marker` fails extraction.
    pub fn failing_on(mut self, marker: &str) -> Self {
        self.failing_markers.push(marker.to_string());
        self
    }

    /// Number of `extract_component` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ComponentOracle for FixtureOracle {
    type Component = FixtureComponent;

    fn extract_component(
        &self,
        before: &str,
        after: &str,
        _language: &str,
        _hops: u32,
    ) -> Result<Self::Component, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if before.is_empty() && after.is_empty() {
            return Err(OracleError::Empty);
        }
        let contains = |marker: &str| before.contains(marker) || after.contains(marker);

        if let Some(marker) = self.failing_markers.iter().find(|m| contains(m)) {
            return Err(OracleError::Extraction(format!("scripted failure on {marker}")));
        }
        let overlap = self
            .rules
            .iter()
            .find(|(marker, _)| contains(marker))
            .map(|(_, overlap)| *overlap)
            .unwrap_or(self.default_overlap);
        Ok(FixtureComponent::new(overlap))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rules_and_failures() {
        let oracle = FixtureOracle::new(0.5)
            .with_rule("SHARED", 0.9)
            .failing_on("BROKEN");
        let baseline = oracle.extract_component("a", "b", "c", 3).unwrap();

        let shared = oracle.extract_component("", "x SHARED y", "c", 3).unwrap();
        assert_eq!(baseline.overlap_ratio(&shared), 0.9);

        let plain = oracle.extract_component("", "x", "c", 3).unwrap();
        assert_eq!(baseline.overlap_ratio(&plain), 0.5);

        assert!(oracle.extract_component("BROKEN", "", "c", 3).is_err());
        assert!(matches!(
            oracle.extract_component("", "", "c", 3),
            Err(OracleError::Empty)
        ));
        assert_eq!(oracle.calls(), 5);
    }
}
