//! Faultline Core Library
//!
//! Component-aware sampling of "safe" commits around known catastrophic
//! changes, plus the batch and verification runs built on top of it.

pub mod batch;
pub mod catalog;
pub mod component;
pub mod config;
pub mod domain;
pub mod error;
pub mod fakes;
pub mod identifiers;
pub mod obs;
pub mod sampler;
pub mod telemetry;
pub mod verify;
pub mod windows;

pub use batch::{
    BatchCollector, CatastropheEntry, DatasetReport, ReportMetadata, SafeCommitRow,
    SkippedCatastrophe,
};
pub use catalog::{Catalog, RejectedEntry};
pub use component::{clamp_overlap, Component, ComponentOracle};
pub use config::{BatchConfig, FaultlineConfig, SamplerConfig, StrataTargets};
pub use domain::{CatastropheKind, CatastropheRecord, Impact, SafeCommit, Stratum};
pub use error::{ConfigError, OracleError, Result, SampleError};
pub use identifiers::{IdentifierComponent, IdentifierOracle};
pub use sampler::{BaselineSource, CollectRequest, ComponentAwareSampler, SampleOutcome};
pub use verify::{VerificationResult, Verifier};
pub use windows::{fetch_record_windows, RecordWindows};
