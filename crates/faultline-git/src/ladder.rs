//! History loading as an explicit fallback ladder.
//!
//! Sampling needs more history than a commit window: the fix commit, the
//! introducing commit, their same-file predecessors and the default branch
//! tip. Loading escalates shallow → full → unshallow. The transitions are
//! pure functions so the retry policy can be checked without a network.
//!
//! ```text
//!  NotFetched ──ShallowFetched──▶ ShallowOk ──CommitsMissing──▶ (Unshallow)
//!      │                             │                              │
//!  ShallowFailed                CommitsPresent               UnshallowFetched
//!      ▼                             ▼                              ▼
//!  (FullFetch) ──FullFetched──▶ Unshallowed ◀────────────────────────┘
//!      │                             │
//!  FullFailed                  CommitsMissing
//!      ▼                             ▼
//!    Failed ◀────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::FetchError;
use crate::repo::RepositoryHandle;

/// Ref the default branch tip is stored under.
pub const TIP_REF: &str = "refs/faultline/tip";

/// How much history the local repository holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchState {
    NotFetched,
    ShallowOk,
    Unshallowed,
    Failed,
}

/// Outcome of performing one [`LadderAction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LadderEvent {
    ShallowFetched,
    ShallowFailed,
    FullFetched,
    FullFailed,
    CommitsPresent,
    CommitsMissing,
    UnshallowFetched,
    UnshallowFailed,
}

/// Work the driver performs next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LadderAction {
    ShallowFetch,
    FullFetch,
    Unshallow,
    VerifyCommits,
}

/// First action for a repository in `NotFetched`.
pub const fn initial_action() -> LadderAction {
    LadderAction::ShallowFetch
}

/// Next state and follow-up action after `event` in `state`.
///
/// A `None` action means the ladder has settled: on `Failed` the history is
/// unusable, on any other state the required commits are present. Events
/// that cannot occur in a state fail the ladder.
pub fn transition(state: FetchState, event: LadderEvent) -> (FetchState, Option<LadderAction>) {
    use FetchState::*;
    use LadderAction::*;
    use LadderEvent::*;

    match (state, event) {
        (NotFetched, ShallowFetched) => (ShallowOk, Some(VerifyCommits)),
        (NotFetched, ShallowFailed) => (NotFetched, Some(FullFetch)),
        (NotFetched, FullFetched) => (Unshallowed, Some(VerifyCommits)),
        (NotFetched, FullFailed) => (Failed, None),

        (ShallowOk, CommitsPresent) => (ShallowOk, None),
        (ShallowOk, CommitsMissing) => (ShallowOk, Some(Unshallow)),
        (ShallowOk, UnshallowFetched) => (Unshallowed, Some(VerifyCommits)),
        (ShallowOk, UnshallowFailed) => (Failed, None),

        (Unshallowed, CommitsPresent) => (Unshallowed, None),
        (Unshallowed, CommitsMissing) => (Failed, None),

        (Failed, _) => (Failed, None),
        _ => (Failed, None),
    }
}

/// History loaded for sampling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedHistory {
    /// Settled ladder state (`ShallowOk` or `Unshallowed`)
    pub state: FetchState,
    /// Default branch tip, when the remote advertised one
    pub tip: Option<String>,
}

/// Drives the ladder against a repository handle.
pub struct HistoryLoader<'a> {
    repo: &'a RepositoryHandle,
    shallow_depth: u32,
}

impl<'a> HistoryLoader<'a> {
    pub fn new(repo: &'a RepositoryHandle, shallow_depth: u32) -> Self {
        Self {
            repo,
            shallow_depth: shallow_depth.max(1),
        }
    }

    /// Load enough history that every commit in `required` resolves locally.
    pub async fn load(&self, required: &[&str]) -> Result<LoadedHistory, FetchError> {
        self.drive(FetchState::NotFetched, initial_action(), required, String::new())
            .await
    }

    /// Climb the ladder from `state` because loaded history proved too short.
    ///
    /// Callers use this when a query over the loaded history runs into the
    /// shallow boundary; `reason` is reported if the ladder then fails.
    pub async fn escalate(
        &self,
        state: FetchState,
        required: &[&str],
        reason: &str,
    ) -> Result<LoadedHistory, FetchError> {
        let (next_state, next_action) = transition(state, LadderEvent::CommitsMissing);
        debug!(?state, ?next_state, %reason, "history escalation requested");
        match next_action {
            Some(action) => {
                self.drive(next_state, action, required, reason.to_string())
                    .await
            }
            None => self.settle(next_state, reason.to_string()).await,
        }
    }

    async fn drive(
        &self,
        mut state: FetchState,
        mut action: LadderAction,
        required: &[&str],
        mut last_reason: String,
    ) -> Result<LoadedHistory, FetchError> {
        loop {
            let event = self.perform(state, action, required, &mut last_reason).await;
            let (next_state, next_action) = transition(state, event);
            debug!(?state, ?action, ?event, ?next_state, "ladder step");
            state = next_state;
            match next_action {
                Some(next) => action = next,
                None => break,
            }
        }
        self.settle(state, last_reason).await
    }

    async fn settle(
        &self,
        state: FetchState,
        last_reason: String,
    ) -> Result<LoadedHistory, FetchError> {
        if state == FetchState::Failed {
            warn!(repo = %self.repo.remote_url(), reason = %last_reason, "history unavailable");
            return Err(FetchError::HistoryUnavailable {
                repo: self.repo.remote_url().to_string(),
                reason: last_reason,
            });
        }

        let tip = self.repo.resolve_commit(TIP_REF).await;
        info!(repo = %self.repo.remote_url(), ?state, has_tip = tip.is_some(), "history loaded");
        Ok(LoadedHistory { state, tip })
    }

    async fn perform(
        &self,
        state: FetchState,
        action: LadderAction,
        required: &[&str],
        last_reason: &mut String,
    ) -> LadderEvent {
        match action {
            LadderAction::ShallowFetch => {
                let depth = format!("--depth={}", self.shallow_depth);
                let tip_spec = format!("+HEAD:{TIP_REF}");
                let mut args = vec![
                    "fetch",
                    "--quiet",
                    "--filter=blob:none",
                    depth.as_str(),
                    "origin",
                    tip_spec.as_str(),
                ];
                args.extend_from_slice(required);
                let out = self.repo.fetch(&args).await;
                if out.success() {
                    LadderEvent::ShallowFetched
                } else {
                    *last_reason = out.reason();
                    debug!(reason = %last_reason, "shallow fetch failed, escalating");
                    LadderEvent::ShallowFailed
                }
            }
            LadderAction::FullFetch => {
                let tip_spec = format!("+HEAD:{TIP_REF}");
                let out = self
                    .repo
                    .deep_fetch(&[
                        "fetch",
                        "--quiet",
                        "--filter=blob:none",
                        "--tags",
                        "origin",
                        "+refs/heads/*:refs/remotes/origin/*",
                        tip_spec.as_str(),
                    ])
                    .await;
                if !out.success() {
                    *last_reason = out.reason();
                    return LadderEvent::FullFailed;
                }
                // Commits outside every branch may still be fetchable by id.
                let mut args = vec!["fetch", "--quiet", "--filter=blob:none", "origin"];
                args.extend_from_slice(required);
                let extra = self.repo.deep_fetch(&args).await;
                if !extra.success() {
                    debug!(reason = %extra.reason(), "direct fetch of required commits failed");
                }
                LadderEvent::FullFetched
            }
            LadderAction::Unshallow => {
                if !self.repo.is_shallow().await {
                    return LadderEvent::UnshallowFetched;
                }
                let tip_spec = format!("+HEAD:{TIP_REF}");
                let mut args = vec![
                    "fetch",
                    "--quiet",
                    "--filter=blob:none",
                    "--unshallow",
                    "origin",
                    tip_spec.as_str(),
                ];
                args.extend_from_slice(required);
                let out = self.repo.deep_fetch(&args).await;
                if out.success() {
                    LadderEvent::UnshallowFetched
                } else {
                    *last_reason = out.reason();
                    LadderEvent::UnshallowFailed
                }
            }
            LadderAction::VerifyCommits => {
                match self.missing_commit(state, required).await {
                    None => LadderEvent::CommitsPresent,
                    Some(reason) => {
                        *last_reason = reason;
                        LadderEvent::CommitsMissing
                    }
                }
            }
        }
    }

    /// Why the loaded history is insufficient, if it is.
    ///
    /// Under shallow history each required commit must also be reachable
    /// from the tip, otherwise ranges such as `fix..tip` are truncated.
    async fn missing_commit(&self, state: FetchState, required: &[&str]) -> Option<String> {
        for commit in required {
            if self.repo.resolve_commit(commit).await.is_none() {
                return Some(format!("commit {commit} not found"));
            }
        }
        if state != FetchState::ShallowOk {
            return None;
        }
        let Some(tip) = self.repo.resolve_commit(TIP_REF).await else {
            return None;
        };
        let out = self.repo.query(&["rev-list", &tip]).await;
        if !out.success() {
            return Some(out.reason());
        }
        let reachable: Vec<&str> = out.stdout_lines().collect();
        for commit in required {
            let found = reachable.iter().any(|c| c.starts_with(commit));
            if !found {
                return Some(format!("commit {commit} not connected to tip in shallow history"));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use FetchState::*;
    use LadderAction::*;
    use LadderEvent::*;

    fn run(events: &[LadderEvent]) -> (FetchState, Vec<LadderAction>) {
        let mut state = NotFetched;
        let mut actions = vec![initial_action()];
        for event in events {
            let (next, action) = transition(state, *event);
            state = next;
            match action {
                Some(a) => actions.push(a),
                None => break,
            }
        }
        (state, actions)
    }

    #[test]
    fn shallow_success_with_commits_settles_immediately() {
        let (state, actions) = run(&[ShallowFetched, CommitsPresent]);
        assert_eq!(state, ShallowOk);
        assert_eq!(actions, vec![ShallowFetch, VerifyCommits]);
    }

    #[test]
    fn shallow_failure_escalates_to_full_fetch() {
        let (state, actions) = run(&[ShallowFailed, FullFetched, CommitsPresent]);
        assert_eq!(state, Unshallowed);
        assert_eq!(actions, vec![ShallowFetch, FullFetch, VerifyCommits]);
    }

    #[test]
    fn missing_commits_after_shallow_escalate_to_unshallow() {
        let (state, actions) = run(&[ShallowFetched, CommitsMissing, UnshallowFetched, CommitsPresent]);
        assert_eq!(state, Unshallowed);
        assert_eq!(actions, vec![ShallowFetch, VerifyCommits, Unshallow, VerifyCommits]);
    }

    #[test]
    fn exhausted_ladder_fails() {
        assert_eq!(run(&[ShallowFailed, FullFailed]).0, Failed);
        assert_eq!(run(&[ShallowFetched, CommitsMissing, UnshallowFailed]).0, Failed);
        assert_eq!(
            run(&[ShallowFetched, CommitsMissing, UnshallowFetched, CommitsMissing]).0,
            Failed
        );
    }

    #[test]
    fn reported_truncation_unshallows_or_fails() {
        assert_eq!(transition(ShallowOk, CommitsMissing), (ShallowOk, Some(Unshallow)));
        assert_eq!(transition(Unshallowed, CommitsMissing), (Failed, None));
    }

    #[test]
    fn failed_is_absorbing() {
        for event in [
            ShallowFetched,
            ShallowFailed,
            FullFetched,
            FullFailed,
            CommitsPresent,
            CommitsMissing,
            UnshallowFetched,
            UnshallowFailed,
        ] {
            assert_eq!(transition(Failed, event), (Failed, None));
        }
    }

    #[test]
    fn impossible_events_fail_the_ladder() {
        assert_eq!(transition(NotFetched, CommitsPresent), (Failed, None));
        assert_eq!(transition(Unshallowed, ShallowFetched), (Failed, None));
        assert_eq!(transition(ShallowOk, FullFetched), (Failed, None));
    }
}
