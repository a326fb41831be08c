//! Structured lifecycle events for catastrophe processing.
//!
//! Every event carries an `event` field (`catastrophe.started`,
//! `stratum.collected`, `catastrophe.skipped`, `catastrophe.finished`,
//! `batch.finished`) so log pipelines can filter on it.

use tracing::{info, warn, Span};

use crate::domain::Stratum;

/// Span tagging everything logged while one catastrophe is processed.
///
/// ```ignore
/// sampler.collect_for_record(&record)
///     .instrument(catastrophe_span(&record.id))
///     .await
/// ```
pub fn catastrophe_span(catastrophe_id: &str) -> Span {
    tracing::info_span!("faultline.catastrophe", catastrophe_id = %catastrophe_id)
}

pub fn emit_catastrophe_started(catastrophe_id: &str, repo_url: &str) {
    info!(event = "catastrophe.started", catastrophe_id = %catastrophe_id, repo = %repo_url);
}

/// Emit event: one stratum finished with `accepted` of `examined` candidates.
pub fn emit_stratum_collected(
    catastrophe_id: &str,
    stratum: Stratum,
    accepted: usize,
    examined: usize,
) {
    info!(
        event = "stratum.collected",
        catastrophe_id = %catastrophe_id,
        stratum = %stratum,
        accepted = accepted,
        examined = examined,
    );
}

pub fn emit_catastrophe_finished(catastrophe_id: &str, safe_commits: usize, duration_ms: u64) {
    info!(
        event = "catastrophe.finished",
        catastrophe_id = %catastrophe_id,
        safe_commits = safe_commits,
        duration_ms = duration_ms,
    );
}

/// Emit event: catastrophe skipped (warning level).
pub fn emit_catastrophe_skipped(catastrophe_id: &str, reason: &dyn std::fmt::Display) {
    warn!(event = "catastrophe.skipped", catastrophe_id = %catastrophe_id, reason = %reason);
}

pub fn emit_batch_finished(run_id: &str, succeeded: usize, skipped: usize, safe_commits: usize) {
    info!(
        event = "batch.finished",
        run_id = %run_id,
        succeeded = succeeded,
        skipped = skipped,
        safe_commits = safe_commits,
    );
}
