//! Domain models for faultline.
//!
//! - `CatastropheRecord`: a known catastrophic change and its commits
//! - `Stratum`: the temporal/component class of a safe commit
//! - `SafeCommit`: an accepted safe commit with its code

pub mod record;
pub mod safe_commit;

pub use record::{looks_like_commit, CatastropheKind, CatastropheRecord, Impact};
pub use safe_commit::{SafeCommit, Stratum};
