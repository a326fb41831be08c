//! Run configuration: defaults, optional TOML file, environment overrides.
//!
//! ```toml
//! [sampler]
//! k_hops = 3
//! overlap_threshold = 0.1
//!
//! [sampler.targets]
//! safe_before = 20
//!
//! [window]
//! ancestor_count = 10
//!
//! [timeouts]
//! deep_fetch_secs = 1800
//! ```

use std::path::{Path, PathBuf};

use faultline_git::{FetchConfig, ResolverConfig, Timeouts, DEFAULT_REACHABILITY_BOUND};
use serde::{Deserialize, Serialize};

use crate::domain::Stratum;
use crate::error::ConfigError;

/// Per-stratum collection targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrataTargets {
    pub safe_before: usize,
    pub safe_after: usize,
    pub safe_during: usize,
    pub safe_random: usize,
}

impl Default for StrataTargets {
    fn default() -> Self {
        Self {
            safe_before: 20,
            safe_after: 20,
            safe_during: 10,
            safe_random: 10,
        }
    }
}

impl StrataTargets {
    pub fn target(&self, stratum: Stratum) -> usize {
        match stratum {
            Stratum::SafeBefore => self.safe_before,
            Stratum::SafeAfter => self.safe_after,
            Stratum::SafeDuring => self.safe_during,
            Stratum::SafeRandom => self.safe_random,
        }
    }
}

/// Component-aware sampling parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Hop radius passed to the component oracle
    pub k_hops: u32,
    /// Overlap separating same-component from unrelated commits
    pub overlap_threshold: f64,
    pub targets: StrataTargets,
    /// Candidates examined for SAFE_BEFORE and SAFE_AFTER
    pub candidate_cap: usize,
    /// Candidates examined for SAFE_DURING
    pub during_candidate_cap: usize,
    /// Depth of the first history fetch before escalating
    pub shallow_depth: u32,
    /// Sample records that have not been verified
    pub verification_bypass: bool,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            k_hops: 3,
            overlap_threshold: 0.1,
            targets: StrataTargets::default(),
            candidate_cap: 100,
            during_candidate_cap: 50,
            shallow_depth: 100,
            verification_bypass: false,
        }
    }
}

/// Batch collection parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Catastrophes processed at once
    pub concurrency: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { concurrency: 4 }
    }
}

/// Everything a faultline run needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FaultlineConfig {
    pub sampler: SamplerConfig,
    pub window: FetchConfig,
    pub resolver: ResolverConfig,
    pub timeouts: Timeouts,
    pub batch: BatchConfig,
    /// Commits walked when confirming a descendant reaches its target
    pub reachability_bound: usize,
    /// Parent directory for temporary repositories
    pub work_root: Option<PathBuf>,
}

impl Default for FaultlineConfig {
    fn default() -> Self {
        Self {
            sampler: SamplerConfig::default(),
            window: FetchConfig::default(),
            resolver: ResolverConfig::default(),
            timeouts: Timeouts::default(),
            batch: BatchConfig::default(),
            reachability_bound: DEFAULT_REACHABILITY_BOUND,
            work_root: None,
        }
    }
}

impl FaultlineConfig {
    /// Parse a TOML document; missing sections keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Read a TOML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Defaults, overlaid by `path` when given, then by the environment,
    /// then validated.
    pub fn resolve(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        let config = config.with_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `FAULTLINE_K_HOPS`, `FAULTLINE_OVERLAP_THRESHOLD` and the
    /// resolver's API URL and token variables.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    fn with_overrides_from(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(raw) = lookup("FAULTLINE_K_HOPS") {
            self.sampler.k_hops = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::invalid("FAULTLINE_K_HOPS", format!("not an integer: {raw}")))?;
        }
        if let Some(raw) = lookup("FAULTLINE_OVERLAP_THRESHOLD") {
            self.sampler.overlap_threshold = raw.trim().parse().map_err(|_| {
                ConfigError::invalid("FAULTLINE_OVERLAP_THRESHOLD", format!("not a number: {raw}"))
            })?;
        }
        self.resolver = self.resolver.with_env_overrides();
        Ok(self)
    }

    /// Reject values that would make a run meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let threshold = self.sampler.overlap_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::invalid(
                "overlap_threshold",
                format!("{threshold} is outside [0, 1]"),
            ));
        }
        if self.batch.concurrency == 0 {
            return Err(ConfigError::invalid("concurrency", "must be at least 1"));
        }
        if self.sampler.shallow_depth == 0 {
            return Err(ConfigError::invalid("shallow_depth", "must be at least 1"));
        }
        if self.reachability_bound == 0 {
            return Err(ConfigError::invalid("reachability_bound", "must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = FaultlineConfig::default();
        assert_eq!(config.sampler.k_hops, 3);
        assert_eq!(config.sampler.overlap_threshold, 0.1);
        assert_eq!(config.sampler.targets.target(Stratum::SafeBefore), 20);
        assert_eq!(config.sampler.targets.target(Stratum::SafeDuring), 10);
        assert_eq!(config.batch.concurrency, 4);
        assert_eq!(config.reachability_bound, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = FaultlineConfig::from_toml_str(
            r#"
            reachability_bound = 250

            [sampler]
            overlap_threshold = 0.25

            [sampler.targets]
            safe_before = 5

            [timeouts]
            deep_fetch_secs = 1800
            "#,
        )
        .unwrap();
        assert_eq!(config.sampler.overlap_threshold, 0.25);
        assert_eq!(config.sampler.k_hops, 3);
        assert_eq!(config.sampler.targets.safe_before, 5);
        assert_eq!(config.sampler.targets.safe_after, 20);
        assert_eq!(config.timeouts.deep_fetch_secs, 1800);
        assert_eq!(config.timeouts.query_secs, 60);
        assert_eq!(config.reachability_bound, 250);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("FAULTLINE_K_HOPS", "5"),
            ("FAULTLINE_OVERLAP_THRESHOLD", "0.3"),
        ]
        .into_iter()
        .collect();
        let config = FaultlineConfig::default()
            .with_overrides_from(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.sampler.k_hops, 5);
        assert_eq!(config.sampler.overlap_threshold, 0.3);
    }

    #[test]
    fn test_bad_env_value_is_an_error() {
        let result = FaultlineConfig::default()
            .with_overrides_from(|k| (k == "FAULTLINE_K_HOPS").then(|| "three".to_string()));
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_validate_rejects_out_of_range_threshold() {
        let mut config = FaultlineConfig::default();
        config.sampler.overlap_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = FaultlineConfig::default();
        config.batch.concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("faultline.toml");
        std::fs::write(&path, "[batch]\nconcurrency = 2\n").unwrap();
        let config = FaultlineConfig::load(&path).unwrap();
        assert_eq!(config.batch.concurrency, 2);

        let missing = FaultlineConfig::load(&dir.path().join("nope.toml"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }
}
