//! Component-aware sampling of safe commits around a catastrophe.
//!
//! For one catastrophe the sampler loads enough history, computes the
//! component touched by the fix, and classifies nearby commits:
//!
//! - `SAFE_BEFORE`: same files, before the vulnerable window, overlapping
//!   component (`overlap >= threshold`)
//! - `SAFE_AFTER`: same files, after the fix, overlapping component
//! - `SAFE_DURING`: other files, inside the vulnerable window, unrelated
//!   component (`overlap < threshold`)
//!
//! `SAFE_RANDOM` comes from unrelated repositories and is always empty here.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use faultline_git::{
    changed_paths, commit_metadata, first_parent, get_commit_diff, CommitMetadata,
    CommitWindowFetcher, FetchState, GitError, HistoryLoader, LoadedHistory, RepositoryHandle,
    RevList,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::component::{clamp_overlap, Component, ComponentOracle};
use crate::config::SamplerConfig;
use crate::domain::{CatastropheRecord, SafeCommit, Stratum};
use crate::error::{Result, SampleError};
use crate::obs;

/// Everything needed to sample one catastrophe.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectRequest {
    pub catastrophe_id: String,
    pub repo_url: String,
    pub fix_commit: String,
    pub introducing_commit: Option<String>,
    pub affected_files: Vec<String>,
    pub language: String,
    /// Fallback code used when the fix diff has no content
    pub catastrophe_before: String,
    pub catastrophe_after: String,
}

impl CollectRequest {
    /// Request for a record: first fixing commit, earliest breaking commit.
    pub fn from_record(record: &CatastropheRecord) -> Result<Self> {
        let fix_commit = record
            .primary_fix_commit()
            .ok_or_else(|| SampleError::MissingFixCommit(record.id.clone()))?;
        Ok(Self {
            catastrophe_id: record.id.clone(),
            repo_url: record.repo_url.clone(),
            fix_commit: fix_commit.to_string(),
            introducing_commit: record.introducing_commit().map(str::to_string),
            affected_files: record.affected_files.clone(),
            language: record.language.clone(),
            catastrophe_before: String::new(),
            catastrophe_after: String::new(),
        })
    }

    /// Use `before`/`after` when the fix commit yields no code.
    pub fn with_snippets(mut self, before: &str, after: &str) -> Self {
        self.catastrophe_before = before.to_string();
        self.catastrophe_after = after.to_string();
        self
    }
}

/// Where the catastrophe's baseline code came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselineSource {
    FixDiff,
    SuppliedSnippet,
}

/// Safe commits collected for one catastrophe.
#[derive(Debug, Clone, Serialize)]
pub struct SampleOutcome {
    catastrophe_id: String,
    fix_commit: String,
    strata: BTreeMap<Stratum, Vec<SafeCommit>>,
    same_component_skipped: bool,
    baseline_source: BaselineSource,
    window_start: Option<String>,
    history_state: FetchState,
}

impl SampleOutcome {
    pub fn catastrophe_id(&self) -> &str {
        &self.catastrophe_id
    }

    /// Full identifier of the fix commit.
    pub fn fix_commit(&self) -> &str {
        &self.fix_commit
    }

    /// Accepted commits of `stratum`, in acceptance order.
    pub fn commits(&self, stratum: Stratum) -> &[SafeCommit] {
        self.strata.get(&stratum).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn strata(&self) -> &BTreeMap<Stratum, Vec<SafeCommit>> {
        &self.strata
    }

    /// True when no affected files were known, so only temporal strata ran.
    pub fn same_component_skipped(&self) -> bool {
        self.same_component_skipped
    }

    pub fn baseline_source(&self) -> BaselineSource {
        self.baseline_source
    }

    /// First commit before the vulnerable window.
    pub fn window_start(&self) -> Option<&str> {
        self.window_start.as_deref()
    }

    pub fn history_state(&self) -> FetchState {
        self.history_state
    }

    pub fn total(&self) -> usize {
        self.strata.values().map(Vec::len).sum()
    }
}

/// Collects stratified safe commits using an injected component oracle.
pub struct ComponentAwareSampler<O: ComponentOracle> {
    oracle: O,
    fetcher: CommitWindowFetcher,
    config: SamplerConfig,
}

impl<O: ComponentOracle> ComponentAwareSampler<O> {
    /// `fetcher` supplies the runner, timeouts and work directory for the
    /// private repository each catastrophe is sampled in.
    pub fn new(oracle: O, fetcher: CommitWindowFetcher, config: SamplerConfig) -> Self {
        Self {
            oracle,
            fetcher,
            config,
        }
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Sample a catalog record, refusing unverified records unless bypassed.
    pub async fn collect_for_record(&self, record: &CatastropheRecord) -> Result<SampleOutcome> {
        if !record.is_usable(self.config.verification_bypass) {
            return Err(SampleError::Unverified(record.id.clone()));
        }
        let request = CollectRequest::from_record(record)?;
        self.collect_safe_commits(&request).await
    }

    /// Collect every in-scope stratum for one catastrophe.
    ///
    /// The repository lives in a temporary directory that is removed when
    /// this returns, successfully or not.
    pub async fn collect_safe_commits(&self, request: &CollectRequest) -> Result<SampleOutcome> {
        let started = Instant::now();
        obs::emit_catastrophe_started(&request.catastrophe_id, &request.repo_url);

        let repo = self.fetcher.open(&request.repo_url).await?;
        let mut history = self.load_history(&repo, request).await?;

        let fix = repo
            .resolve_commit(&request.fix_commit)
            .await
            .ok_or_else(|| faultline_git::FetchError::TargetNotFound {
                commit: request.fix_commit.clone(),
            })?;

        let mut anchors = WindowAnchors::resolve(&repo, &fix, request).await;
        if history.state == FetchState::ShallowOk {
            if let Some(reason) = self.history_truncation(&repo, &fix, &anchors, request).await {
                info!(
                    catastrophe = %request.catastrophe_id,
                    %reason,
                    "candidate history reaches the shallow boundary, deepening"
                );
                let mut required = vec![fix.as_str()];
                if let Some(introducing) = &anchors.introducing {
                    required.push(introducing.as_str());
                }
                history = HistoryLoader::new(&repo, self.config.shallow_depth)
                    .escalate(history.state, &required, &reason)
                    .await?;
                anchors = WindowAnchors::resolve(&repo, &fix, request).await;
            }
        }
        let boundary = repo.shallow_boundary().await;
        let WindowAnchors {
            introducing,
            start: window_start,
        } = anchors;

        let (before, after, baseline_source) = self.baseline_code(&repo, &fix, request).await;
        let baseline = self
            .oracle
            .extract_component(&before, &after, &request.language, self.config.k_hops)
            .map_err(SampleError::Baseline)?;

        let same_component_skipped = request.affected_files.is_empty();
        if same_component_skipped {
            warn!(
                catastrophe = %request.catastrophe_id,
                "no affected files recorded, same-component strata skipped"
            );
        }

        let ctx = StratumContext {
            repo: &repo,
            baseline: &baseline,
            boundary: &boundary,
            language: &request.language,
            catastrophe_id: &request.catastrophe_id,
        };
        let (safe_before, safe_after, safe_during) = tokio::join!(
            async {
                match (&window_start, same_component_skipped) {
                    (Some(start), false) => {
                        self.safe_before(&ctx, start, &request.affected_files).await
                    }
                    _ => Vec::new(),
                }
            },
            async {
                match (&history.tip, same_component_skipped) {
                    (Some(tip), false) => {
                        self.safe_after(&ctx, &fix, tip, &request.affected_files)
                            .await
                    }
                    _ => Vec::new(),
                }
            },
            async {
                match &window_start {
                    Some(start) => {
                        self.safe_during(
                            &ctx,
                            start,
                            &fix,
                            introducing.as_deref(),
                            &request.affected_files,
                        )
                        .await
                    }
                    None => Vec::new(),
                }
            },
        );

        let mut strata = BTreeMap::new();
        strata.insert(Stratum::SafeBefore, safe_before);
        strata.insert(Stratum::SafeAfter, safe_after);
        strata.insert(Stratum::SafeDuring, safe_during);
        strata.insert(Stratum::SafeRandom, Vec::new());

        let outcome = SampleOutcome {
            catastrophe_id: request.catastrophe_id.clone(),
            fix_commit: fix,
            strata,
            same_component_skipped,
            baseline_source,
            window_start,
            history_state: history.state,
        };
        obs::emit_catastrophe_finished(
            &request.catastrophe_id,
            outcome.total(),
            started.elapsed().as_millis() as u64,
        );
        Ok(outcome)
    }

    /// Run the fetch ladder for the fix and introducing commits.
    ///
    /// An introducing commit that cannot be fetched is dropped rather than
    /// failing the catastrophe.
    async fn load_history(
        &self,
        repo: &RepositoryHandle,
        request: &CollectRequest,
    ) -> Result<LoadedHistory> {
        let loader = HistoryLoader::new(repo, self.config.shallow_depth);
        let mut required = vec![request.fix_commit.as_str()];
        if let Some(introducing) = &request.introducing_commit {
            required.push(introducing.as_str());
        }

        match loader.load(&required).await {
            Ok(history) => Ok(history),
            Err(e) if required.len() > 1 => {
                warn!(
                    catastrophe = %request.catastrophe_id,
                    error = %e,
                    "introducing commit unavailable, sampling from the fix alone"
                );
                Ok(loader.load(&required[..1]).await?)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Why shallow history cannot serve this catastrophe's candidate ranges.
    ///
    /// History is too short when an anchor commit sits on the shallow
    /// boundary (its parent is unknown locally), or when the same-file walk
    /// before the window runs into the boundary before reaching its cap.
    async fn history_truncation(
        &self,
        repo: &RepositoryHandle,
        fix: &str,
        anchors: &WindowAnchors,
        request: &CollectRequest,
    ) -> Option<String> {
        let boundary = repo.shallow_boundary().await;
        if boundary.is_empty() {
            return None;
        }
        if boundary.contains(fix) {
            return Some(format!("fix commit {fix} is a shallow boundary commit"));
        }
        if let Some(introducing) = anchors.introducing.as_deref() {
            if boundary.contains(introducing) {
                return Some(format!(
                    "introducing commit {introducing} is a shallow boundary commit"
                ));
            }
        }
        let start = anchors.start.as_deref()?;
        if boundary.contains(start) {
            return Some(format!("window start {start} is a shallow boundary commit"));
        }
        if request.affected_files.is_empty() {
            return None;
        }

        let listed = self
            .before_candidates(repo, start, &request.affected_files)
            .await;
        if let Some(commit) = listed.iter().find(|c| boundary.contains(c.as_str())) {
            return Some(format!("same-file history reaches shallow boundary at {commit}"));
        }
        if listed.len() < self.config.candidate_cap {
            for commit in &boundary {
                if repo.is_ancestor(commit, start).await {
                    return Some(format!(
                        "same-file history before {start} is cut off at {commit}"
                    ));
                }
            }
        }
        None
    }

    /// Before/after code for the baseline component.
    async fn baseline_code(
        &self,
        repo: &RepositoryHandle,
        fix: &str,
        request: &CollectRequest,
    ) -> (String, String, BaselineSource) {
        match get_commit_diff(repo, fix).await {
            Ok(diff) if diff.has_content() => (diff.before, diff.after, BaselineSource::FixDiff),
            Ok(_) => (
                request.catastrophe_before.clone(),
                request.catastrophe_after.clone(),
                BaselineSource::SuppliedSnippet,
            ),
            Err(e) => {
                warn!(%fix, error = %e, "fix diff unavailable, using supplied snippets");
                (
                    request.catastrophe_before.clone(),
                    request.catastrophe_after.clone(),
                    BaselineSource::SuppliedSnippet,
                )
            }
        }
    }

    async fn safe_before(
        &self,
        ctx: &StratumContext<'_, O::Component>,
        start: &str,
        files: &[String],
    ) -> Vec<SafeCommit> {
        let candidates = self.before_candidates(ctx.repo, start, files).await;
        self.collect_stratum(ctx, Stratum::SafeBefore, candidates)
            .await
    }

    /// Same-file commits strictly before `start`, most recent first.
    async fn before_candidates(
        &self,
        repo: &RepositoryHandle,
        start: &str,
        files: &[String],
    ) -> Vec<String> {
        let query = RevList::from_rev(&format!("{start}^"))
            .paths(files)
            .max_count(self.config.candidate_cap);
        match query.run(repo).await {
            Ok(candidates) => candidates,
            Err(e) => {
                debug!(%start, error = %e, "no history before window start");
                Vec::new()
            }
        }
    }

    async fn safe_after(
        &self,
        ctx: &StratumContext<'_, O::Component>,
        fix: &str,
        tip: &str,
        files: &[String],
    ) -> Vec<SafeCommit> {
        let query = RevList::range(fix, tip).paths(files).reverse();
        let mut candidates = match query.run(ctx.repo).await {
            Ok(candidates) => candidates,
            Err(e) => {
                debug!(%fix, %tip, error = %e, "no history after fix");
                Vec::new()
            }
        };
        candidates.truncate(self.config.candidate_cap);
        self.collect_stratum(ctx, Stratum::SafeAfter, candidates)
            .await
    }

    async fn safe_during(
        &self,
        ctx: &StratumContext<'_, O::Component>,
        start: &str,
        fix: &str,
        introducing: Option<&str>,
        files: &[String],
    ) -> Vec<SafeCommit> {
        let query = RevList::range(start, fix).max_count(self.config.during_candidate_cap);
        let listed = match query.run(ctx.repo).await {
            Ok(listed) => listed,
            Err(e) => {
                debug!(%start, %fix, error = %e, "vulnerable window not listable");
                Vec::new()
            }
        };

        let excluded: BTreeSet<&str> = files.iter().map(String::as_str).collect();
        let mut candidates = Vec::with_capacity(listed.len());
        for commit in listed {
            if commit == fix || Some(commit.as_str()) == introducing {
                continue;
            }
            if !excluded.is_empty() {
                match changed_paths(ctx.repo, &commit).await {
                    Ok(paths) if paths.iter().any(|p| excluded.contains(p.as_str())) => continue,
                    Ok(_) => {}
                    Err(e) => {
                        debug!(%commit, error = %e, "changed paths unavailable, skipped");
                        continue;
                    }
                }
            }
            candidates.push(commit);
        }
        self.collect_stratum(ctx, Stratum::SafeDuring, candidates)
            .await
    }

    /// Score `candidates` in order until the stratum target is met.
    async fn collect_stratum(
        &self,
        ctx: &StratumContext<'_, O::Component>,
        stratum: Stratum,
        candidates: Vec<String>,
    ) -> Vec<SafeCommit> {
        let target = self.config.targets.target(stratum);
        let threshold = self.config.overlap_threshold;
        let mut accepted = Vec::new();
        let mut examined = 0usize;

        for commit in candidates {
            if accepted.len() >= target {
                break;
            }
            // Parents of boundary commits are not local; their diffs would be wrong.
            if ctx.boundary.contains(&commit) {
                debug!(%commit, %stratum, "shallow boundary commit, skipped");
                continue;
            }
            examined += 1;

            let diff = match get_commit_diff(ctx.repo, &commit).await {
                Ok(diff) if !diff.is_empty() && diff.has_content() => diff,
                Ok(_) => {
                    debug!(%commit, %stratum, "empty diff, skipped");
                    continue;
                }
                Err(e) => {
                    debug!(%commit, %stratum, error = %e, "diff extraction failed, skipped");
                    continue;
                }
            };
            let component = match self.oracle.extract_component(
                &diff.before,
                &diff.after,
                ctx.language,
                self.config.k_hops,
            ) {
                Ok(component) => component,
                Err(e) => {
                    debug!(%commit, %stratum, error = %e, "component extraction failed, skipped");
                    continue;
                }
            };
            let overlap = clamp_overlap(ctx.baseline.overlap_ratio(&component));
            if !stratum.admits(overlap, threshold) {
                continue;
            }

            let Some(metadata) =
                usable_metadata(commit_metadata(ctx.repo, &commit).await, &commit, stratum)
            else {
                continue;
            };
            accepted.push(SafeCommit::new(
                commit,
                stratum,
                diff,
                metadata,
                ctx.language,
                overlap,
            ));
        }

        obs::emit_stratum_collected(ctx.catastrophe_id, stratum, accepted.len(), examined);
        accepted
    }
}

/// Metadata for an accepted candidate; a failed query rejects the candidate.
fn usable_metadata(
    result: std::result::Result<CommitMetadata, GitError>,
    commit: &str,
    stratum: Stratum,
) -> Option<CommitMetadata> {
    match result {
        Ok(metadata) => Some(metadata),
        Err(e) => {
            warn!(%commit, %stratum, error = %e, "commit metadata unavailable, skipped");
            None
        }
    }
}

/// Commits that bound the catastrophe's vulnerable window.
struct WindowAnchors {
    /// Introducing commit, when known and present locally
    introducing: Option<String>,
    /// First parent of the introducing commit, else of the fix
    start: Option<String>,
}

impl WindowAnchors {
    async fn resolve(repo: &RepositoryHandle, fix: &str, request: &CollectRequest) -> Self {
        let introducing = match &request.introducing_commit {
            Some(commit) => repo.resolve_commit(commit).await,
            None => None,
        };
        let start = match &introducing {
            Some(commit) => first_parent(repo, commit).await,
            None => first_parent(repo, fix).await,
        };
        Self { introducing, start }
    }
}

/// Shared, read-only inputs of the per-stratum collectors.
struct StratumContext<'a, C> {
    repo: &'a RepositoryHandle,
    baseline: &'a C,
    /// Shallow boundary commits of the loaded history
    boundary: &'a BTreeSet<String>,
    language: &'a str,
    catastrophe_id: &'a str,
}
