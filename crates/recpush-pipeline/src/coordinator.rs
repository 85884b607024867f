//! The three-stage profile → recommendation → push workflow.
//!
//! Stages run strictly one after another; inside a stage users are processed
//! in parallel through the bounded executor. A failure for one user is
//! counted and logged, never propagated to the rest of the run.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use recpush_core::{AppConfig, Profile, ProfileAttributes, RecommendationItem};
use serde::Serialize;

use crate::aggregate::{aggregate, search_by_keywords};
use crate::error::{PipelineError, PortError};
use crate::executor::{bounded_map_reduce, run_bounded, ItemOutcome, Panicked, RunStats};
use crate::heuristic::heuristic_profile;
use crate::merge::{backfill_consistency, merge_profiles, normalize_keywords};
use crate::ports::{
    ActivitySource, BroadcastSource, KnowledgeSearch, ProfileInference, ProfileStore, Pusher,
    Recipient, RecommendationStore, SourceData,
};
use crate::scheduler::{ScheduledWorkflow, TaskKind};
use crate::text::sanitize_text;

/// Every external capability the workflow needs.
#[derive(Clone)]
pub struct Collaborators {
    pub activity: Arc<dyn ActivitySource>,
    /// `None` disables inference; profiles then come from the heuristic builder.
    pub inference: Option<Arc<dyn ProfileInference>>,
    pub profiles: Arc<dyn ProfileStore>,
    pub knowledge: Arc<dyn KnowledgeSearch>,
    pub recommendations: Arc<dyn RecommendationStore>,
    pub pusher: Arc<dyn Pusher>,
    pub broadcast: Arc<dyn BroadcastSource>,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub lookback_days: u32,
    pub profile_concurrency: usize,
    pub recommendation_concurrency: usize,
    pub push_concurrency: usize,
    pub top_k: usize,
    /// Upper bound on any single collaborator call.
    pub call_timeout: Duration,
    pub topic_lexicon: Vec<String>,
}

impl PipelineSettings {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            lookback_days: config.lookback_days,
            profile_concurrency: config.profile_concurrency,
            recommendation_concurrency: config.recommendation_concurrency,
            push_concurrency: config.push_concurrency,
            top_k: config.rag.top_k,
            call_timeout: Duration::from_secs(config.call_timeout_secs),
            topic_lexicon: config.topic_lexicon.clone(),
        }
    }
}

/// Result of regenerating one user's profile.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "profile", rename_all = "snake_case")]
pub enum ProfileOutcome {
    /// A stored profile exists and no newer activity was found.
    Unchanged,
    /// The user has no activity to build a profile from.
    NoData,
    Regenerated(Profile),
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfileStageReport {
    pub stats: RunStats,
    pub regenerated: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastOutcome {
    Delivered,
    Rejected,
    NoContent,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct PushStageReport {
    pub users: RunStats,
    pub broadcast: BroadcastOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowReport {
    pub candidates: usize,
    pub profile: RunStats,
    pub regenerated: usize,
    pub recommendation: RunStats,
    pub push: PushStageReport,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PushOutcome {
    Delivered { items: usize },
    NothingToPush,
}

#[derive(Clone)]
pub struct PipelineCoordinator {
    deps: Collaborators,
    settings: Arc<PipelineSettings>,
}

impl PipelineCoordinator {
    #[must_use]
    pub fn new(deps: Collaborators, settings: PipelineSettings) -> Self {
        Self {
            deps,
            settings: Arc::new(settings),
        }
    }

    #[must_use]
    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Run all three stages once over a fresh candidate set.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::CandidateListing`] when the candidate set
    /// cannot be obtained. Per-user failures only show up in the report.
    pub async fn run_full_workflow(&self) -> Result<WorkflowReport, PipelineError> {
        let started = Instant::now();
        tracing::info!("pipeline: workflow starting");

        let candidates = self
            .guarded(
                "list_candidates",
                self.deps.activity.list_candidates(self.settings.lookback_days),
            )
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "pipeline: failed to list candidates, run aborted");
                PipelineError::CandidateListing(e)
            })?;
        let candidates = dedup_preserving_order(candidates);
        let candidate_count = candidates.len();

        let profile = self.run_profile_stage(candidates).await;
        let recommendation = self.run_recommendation_stage(&profile.regenerated).await;
        let push = self.run_push_stage().await;

        let report = WorkflowReport {
            candidates: candidate_count,
            profile: profile.stats,
            regenerated: profile.regenerated.len(),
            recommendation,
            push,
            elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        };
        tracing::info!(
            candidates = report.candidates,
            regenerated = report.regenerated,
            profile_failed = report.profile.failed,
            recommendation_succeeded = report.recommendation.succeeded,
            recommendation_failed = report.recommendation.failed,
            pushed = report.push.users.succeeded,
            push_failed = report.push.users.failed,
            broadcast = ?report.push.broadcast,
            elapsed_ms = report.elapsed_ms,
            "pipeline: workflow complete"
        );
        Ok(report)
    }

    // ------------------------------------------------------------------
    // Stage 1: profiles
    // ------------------------------------------------------------------

    /// Regenerate profiles for every candidate with newer activity.
    pub async fn run_profile_stage(&self, candidates: Vec<String>) -> ProfileStageReport {
        tracing::info!(candidates = candidates.len(), "pipeline: profile stage starting");
        let this = self.clone();

        let report: ProfileStageReport = bounded_map_reduce(
            candidates,
            self.settings.profile_concurrency,
            move |cid: String| {
                let this = this.clone();
                async move {
                    let outcome = this.generate_profile_for_user(&cid).await;
                    (cid, outcome)
                }
            },
            |report: &mut ProfileStageReport, result| match result {
                Ok((cid, Ok(ProfileOutcome::Regenerated(_)))) => {
                    report.stats.record_success();
                    report.regenerated.push(cid);
                }
                Ok((cid, Ok(outcome))) => {
                    tracing::debug!(cid = %cid, ?outcome, "pipeline: profile skipped");
                    report.stats.record_skip();
                }
                Ok((cid, Err(e))) => {
                    tracing::error!(cid = %cid, error = %e, "pipeline: profile generation failed");
                    report.stats.record_failure();
                }
                Err(Panicked) => {
                    tracing::error!("pipeline: profile generation panicked");
                    report.stats.record_failure();
                }
            },
        )
        .await;

        tracing::info!(
            processed = report.stats.processed,
            regenerated = report.regenerated.len(),
            skipped = report.stats.skipped,
            failed = report.stats.failed,
            "pipeline: profile stage complete"
        );
        report
    }

    /// Rebuild one user's profile if newer activity exists.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidCid`] for an empty cid, or the first
    /// storage/source failure encountered. Inference failures are absorbed by
    /// the heuristic fallback.
    pub async fn generate_profile_for_user(
        &self,
        cid: &str,
    ) -> Result<ProfileOutcome, PipelineError> {
        validate_cid(cid)?;

        let existing = self
            .guarded("load_profile", self.deps.profiles.load_profile(cid))
            .await?;

        if let Some(profile) = &existing {
            let newer = self
                .guarded(
                    "has_newer_source_data_than",
                    self.deps
                        .activity
                        .has_newer_source_data_than(cid, profile.updated_at),
                )
                .await?;
            if !newer {
                return Ok(ProfileOutcome::Unchanged);
            }
        }

        let data = self
            .guarded(
                "compute_raw_profile_signals",
                self.deps.activity.compute_raw_profile_signals(
                    cid,
                    self.settings.lookback_days,
                    existing.as_ref().map(|p| p.updated_at),
                ),
            )
            .await?;
        if data.is_empty() {
            return Ok(ProfileOutcome::NoData);
        }

        let inferred = self.infer_or_fallback(&data).await;
        let now = Utc::now();
        let attributes = merge_profiles(existing.as_ref().map(|p| &p.attributes), inferred, now);
        let profile = Profile {
            cid: cid.to_string(),
            attributes,
            updated_at: now,
        };

        self.guarded("save_profile", self.deps.profiles.save_profile(&profile))
            .await?;
        tracing::info!(
            cid,
            keywords = profile.attributes.weighted_keywords.len(),
            merged = existing.is_some(),
            "pipeline: profile regenerated"
        );
        Ok(ProfileOutcome::Regenerated(profile))
    }

    async fn infer_or_fallback(&self, data: &SourceData) -> ProfileAttributes {
        if let Some(inference) = &self.deps.inference {
            match self
                .guarded("infer_profile", inference.infer_profile(data))
                .await
            {
                Ok(mut attrs) if !attrs.is_empty() => {
                    normalize_keywords(&mut attrs);
                    backfill_consistency(&mut attrs);
                    return attrs;
                }
                Ok(_) => tracing::warn!(
                    cid = %data.cid,
                    "pipeline: inference returned an empty profile, using heuristic profile"
                ),
                Err(e) => tracing::warn!(
                    cid = %data.cid,
                    error = %e,
                    "pipeline: inference failed, using heuristic profile"
                ),
            }
        }
        heuristic_profile(data, &self.settings.topic_lexicon)
    }

    // ------------------------------------------------------------------
    // Stage 2: recommendations
    // ------------------------------------------------------------------

    /// Build snapshots for users regenerated this run and users that have a
    /// profile but no snapshot yet. Everyone else keeps their cached snapshot.
    pub async fn run_recommendation_stage(&self, regenerated: &[String]) -> RunStats {
        let with_profiles = match self
            .guarded(
                "list_users_with_profiles",
                self.deps.profiles.list_users_with_profiles(),
            )
            .await
        {
            Ok(users) => users,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    "pipeline: failed to list users with profiles, recommendation stage aborted"
                );
                return RunStats::default();
            }
        };

        let cached: HashSet<String> = match self
            .guarded(
                "list_users_with_recommendations",
                self.deps.recommendations.list_users_with_recommendations(),
            )
            .await
        {
            Ok(users) => users.into_iter().collect(),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "pipeline: failed to list cached snapshots, limiting stage to regenerated users"
                );
                with_profiles.iter().cloned().collect()
            }
        };

        let targets = dedup_preserving_order(
            regenerated
                .iter()
                .cloned()
                .chain(with_profiles.into_iter().filter(|cid| !cached.contains(cid)))
                .collect(),
        );
        tracing::info!(
            targets = targets.len(),
            regenerated = regenerated.len(),
            "pipeline: recommendation stage starting"
        );

        let this = self.clone();
        let stats = run_bounded(
            "recommendation",
            targets,
            self.settings.recommendation_concurrency,
            move |cid: String| {
                let this = this.clone();
                async move { this.recommend_for_user(&cid).await }
            },
        )
        .await;

        tracing::info!(
            processed = stats.processed,
            succeeded = stats.succeeded,
            skipped = stats.skipped,
            failed = stats.failed,
            "pipeline: recommendation stage complete"
        );
        stats
    }

    async fn recommend_for_user(&self, cid: &str) -> Result<ItemOutcome, PipelineError> {
        let profile = self
            .guarded("load_profile", self.deps.profiles.load_profile(cid))
            .await?
            .ok_or_else(|| PipelineError::NoProfile(cid.to_string()))?;

        Ok(match self.build_recommendations(&profile).await? {
            Some(_) => ItemOutcome::Succeeded,
            None => ItemOutcome::Skipped,
        })
    }

    /// Search the knowledge base with the profile's keywords and persist the
    /// snapshot. Returns `None` without saving when nothing was found, so a
    /// previous snapshot survives.
    async fn build_recommendations(
        &self,
        profile: &Profile,
    ) -> Result<Option<Vec<RecommendationItem>>, PipelineError> {
        let cid = profile.cid.as_str();
        let keywords = profile.attributes.ordered_keywords();
        if keywords.is_empty() {
            tracing::debug!(cid, "pipeline: profile has no keywords");
            return Ok(None);
        }

        let search = GuardedSearch {
            inner: Arc::clone(&self.deps.knowledge),
            timeout: self.settings.call_timeout,
        };
        let items = search_by_keywords(&search, &keywords, self.settings.top_k).await;

        if items.is_empty() {
            tracing::info!(cid, "pipeline: no recommendations found, keeping existing snapshot");
            return Ok(None);
        }

        self.guarded(
            "save_recommendations",
            self.deps
                .recommendations
                .save_recommendations(cid, &items, profile),
        )
        .await?;
        tracing::debug!(cid, count = items.len(), "pipeline: recommendations saved");
        Ok(Some(items))
    }

    /// Regenerate the profile if needed, then rebuild the snapshot regardless
    /// of what is cached.
    ///
    /// When the search finds nothing, the existing snapshot (if any) is
    /// returned untouched.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NoProfile`] when the user has neither a stored
    /// profile nor activity to build one from.
    pub async fn refresh_user_recommendations(
        &self,
        cid: &str,
    ) -> Result<Vec<RecommendationItem>, PipelineError> {
        let profile = match self.generate_profile_for_user(cid).await? {
            ProfileOutcome::Regenerated(profile) => profile,
            ProfileOutcome::Unchanged | ProfileOutcome::NoData => self
                .guarded("load_profile", self.deps.profiles.load_profile(cid))
                .await?
                .ok_or_else(|| PipelineError::NoProfile(cid.to_string()))?,
        };

        if let Some(items) = self.build_recommendations(&profile).await? {
            return Ok(items);
        }
        Ok(self
            .guarded(
                "load_cached_recommendations",
                self.deps.recommendations.load_cached_recommendations(cid),
            )
            .await?
            .unwrap_or_default())
    }

    // ------------------------------------------------------------------
    // Stage 3: push
    // ------------------------------------------------------------------

    /// Push every cached snapshot, then one broadcast of fallback content.
    pub async fn run_push_stage(&self) -> PushStageReport {
        let users = match self
            .guarded(
                "list_users_with_recommendations",
                self.deps.recommendations.list_users_with_recommendations(),
            )
            .await
        {
            Ok(users) => {
                tracing::info!(users = users.len(), "pipeline: push stage starting");
                let this = self.clone();
                run_bounded(
                    "push",
                    users,
                    self.settings.push_concurrency,
                    move |cid: String| {
                        let this = this.clone();
                        async move {
                            this.push_for_user(&cid).await.map(|outcome| match outcome {
                                PushOutcome::Delivered { .. } => ItemOutcome::Succeeded,
                                PushOutcome::NothingToPush => ItemOutcome::Skipped,
                            })
                        }
                    },
                )
                .await
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    "pipeline: failed to list cached snapshots, per-user push skipped"
                );
                RunStats::default()
            }
        };

        let broadcast = self.push_broadcast().await;
        tracing::info!(
            pushed = users.succeeded,
            skipped = users.skipped,
            failed = users.failed,
            ?broadcast,
            "pipeline: push stage complete"
        );
        PushStageReport { users, broadcast }
    }

    /// Alias of the push stage for on-demand triggers.
    pub async fn push_all(&self) -> PushStageReport {
        self.run_push_stage().await
    }

    /// Push one user's cached snapshot, capped at top-K items.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::PushRejected`] when the channel refuses the
    /// message, or a storage error when the snapshot cannot be loaded.
    pub async fn push_for_user(&self, cid: &str) -> Result<PushOutcome, PipelineError> {
        validate_cid(cid)?;

        let Some(mut items) = self
            .guarded(
                "load_cached_recommendations",
                self.deps.recommendations.load_cached_recommendations(cid),
            )
            .await?
        else {
            return Ok(PushOutcome::NothingToPush);
        };
        if items.is_empty() {
            return Ok(PushOutcome::NothingToPush);
        }
        items.truncate(self.settings.top_k);

        if self.push_to(&Recipient::User(cid.to_string()), &items).await {
            Ok(PushOutcome::Delivered { items: items.len() })
        } else {
            Err(PipelineError::PushRejected(cid.to_string()))
        }
    }

    async fn push_broadcast(&self) -> BroadcastOutcome {
        let content = match self
            .guarded(
                "broadcast_fallback_content",
                self.deps.broadcast.broadcast_fallback_content(),
            )
            .await
        {
            Ok(content) => content,
            Err(e) => {
                tracing::error!(error = %e, "pipeline: failed to load broadcast content");
                return BroadcastOutcome::Failed;
            }
        };

        let items = aggregate(content, Vec::new(), self.settings.top_k);
        if items.is_empty() {
            tracing::info!("pipeline: no broadcast content available");
            return BroadcastOutcome::NoContent;
        }

        if self.push_to(&Recipient::Broadcast, &items).await {
            BroadcastOutcome::Delivered
        } else {
            BroadcastOutcome::Rejected
        }
    }

    async fn push_to(&self, recipient: &Recipient, items: &[RecommendationItem]) -> bool {
        let push = self.deps.pusher.push_to_recipient(recipient, items);
        if let Ok(delivered) = tokio::time::timeout(self.settings.call_timeout, push).await {
            delivered
        } else {
            tracing::warn!(%recipient, "pipeline: push timed out");
            false
        }
    }

    async fn guarded<T, F>(&self, operation: &'static str, call: F) -> Result<T, PortError>
    where
        F: Future<Output = Result<T, PortError>>,
    {
        with_timeout(operation, self.settings.call_timeout, call).await
    }
}

async fn with_timeout<T, F>(
    operation: &'static str,
    timeout: Duration,
    call: F,
) -> Result<T, PortError>
where
    F: Future<Output = Result<T, PortError>>,
{
    tokio::time::timeout(timeout, call)
        .await
        .unwrap_or(Err(PortError::Timeout {
            operation,
            timeout_secs: timeout.as_secs(),
        }))
}

/// Knowledge search with the per-call timeout applied, so a slow keyword is
/// skipped like a failed one. Results are sanitised before they count toward
/// the top-K total.
struct GuardedSearch {
    inner: Arc<dyn KnowledgeSearch>,
    timeout: Duration,
}

#[async_trait]
impl KnowledgeSearch for GuardedSearch {
    async fn search_knowledge_base(
        &self,
        keyword: &str,
        top_k: usize,
    ) -> Result<Vec<RecommendationItem>, PortError> {
        let items = with_timeout(
            "search_knowledge_base",
            self.timeout,
            self.inner.search_knowledge_base(keyword, top_k),
        )
        .await?;
        Ok(items.into_iter().filter_map(sanitize_item).collect())
    }
}

#[async_trait]
impl ScheduledWorkflow for PipelineCoordinator {
    async fn run(&self, kind: TaskKind) {
        if let Err(e) = self.run_full_workflow().await {
            tracing::error!(task = %kind, error = %e, "pipeline: scheduled workflow aborted");
        }
    }
}

fn validate_cid(cid: &str) -> Result<(), PipelineError> {
    if cid.trim().is_empty() {
        return Err(PipelineError::InvalidCid);
    }
    Ok(())
}

fn sanitize_item(mut item: RecommendationItem) -> Option<RecommendationItem> {
    item.title = sanitize_text(&item.title).trim().to_string();
    item.content = sanitize_text(&item.content).trim().to_string();
    (!item.title.is_empty() || !item.content.is_empty()).then_some(item)
}

fn dedup_preserving_order(ids: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.into_iter()
        .filter(|id| !id.is_empty() && seen.insert(id.clone()))
        .collect()
}
