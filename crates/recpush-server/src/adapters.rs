//! Postgres-backed implementations of the pipeline's storage ports.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Local, Utc};
use recpush_core::{Profile, RecommendationItem, RecommendationSource};
use recpush_db::{activity::GroupMessageRow, HotTopic};
use recpush_pipeline::{
    text::strip_markdown_headers, ActivitySource, BroadcastSource, PortError, ProfileStore,
    RecommendationStore, SourceData,
};
use sqlx::PgPool;

const HOT_TOPIC_SCORE: f64 = 1.0;

#[derive(Clone)]
pub struct PgActivity {
    pool: PgPool,
}

impl PgActivity {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ActivitySource for PgActivity {
    async fn list_candidates(&self, lookback_days: u32) -> Result<Vec<String>, PortError> {
        recpush_db::list_active_cids(&self.pool, lookback_days)
            .await
            .map_err(PortError::storage)
    }

    async fn has_newer_source_data_than(
        &self,
        cid: &str,
        since: DateTime<Utc>,
    ) -> Result<bool, PortError> {
        recpush_db::has_activity_since(&self.pool, cid, since)
            .await
            .map_err(PortError::storage)
    }

    async fn compute_raw_profile_signals(
        &self,
        cid: &str,
        lookback_days: u32,
        since: Option<DateTime<Utc>>,
    ) -> Result<SourceData, PortError> {
        let activity = recpush_db::load_user_activity(&self.pool, cid, lookback_days, since)
            .await
            .map_err(PortError::storage)?;

        Ok(SourceData {
            cid: cid.to_string(),
            active_groups: activity.active_groups(),
            group_messages: activity.messages.iter().map(message_text).collect(),
            community_posts: activity.posts,
        })
    }
}

fn message_text(row: &GroupMessageRow) -> String {
    let title = row.title.trim();
    if title.is_empty() {
        row.content.clone()
    } else {
        format!("{title}: {}", row.content)
    }
}

#[derive(Clone)]
pub struct PgProfiles {
    pool: PgPool,
}

impl PgProfiles {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProfileStore for PgProfiles {
    async fn load_profile(&self, cid: &str) -> Result<Option<Profile>, PortError> {
        let row = recpush_db::get_user_profile(&self.pool, cid)
            .await
            .map_err(PortError::storage)?;
        row.map(recpush_db::UserProfileRow::into_profile)
            .transpose()
            .map_err(PortError::storage)
    }

    async fn save_profile(&self, profile: &Profile) -> Result<(), PortError> {
        recpush_db::upsert_user_profile(&self.pool, profile)
            .await
            .map_err(PortError::storage)
    }

    async fn list_users_with_profiles(&self) -> Result<Vec<String>, PortError> {
        recpush_db::list_profile_cids(&self.pool)
            .await
            .map_err(PortError::storage)
    }
}

#[derive(Clone)]
pub struct PgRecommendations {
    pool: PgPool,
}

impl PgRecommendations {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecommendationStore for PgRecommendations {
    async fn load_cached_recommendations(
        &self,
        cid: &str,
    ) -> Result<Option<Vec<RecommendationItem>>, PortError> {
        let row = recpush_db::get_recommendation_snapshot(&self.pool, cid)
            .await
            .map_err(PortError::storage)?;
        row.map(|row| row.items())
            .transpose()
            .map_err(PortError::storage)
    }

    async fn save_recommendations(
        &self,
        cid: &str,
        items: &[RecommendationItem],
        profile: &Profile,
    ) -> Result<(), PortError> {
        recpush_db::save_recommendation_snapshot(&self.pool, cid, items, profile)
            .await
            .map_err(PortError::storage)
    }

    async fn list_users_with_recommendations(&self) -> Result<Vec<String>, PortError> {
        recpush_db::list_snapshot_cids(&self.pool)
            .await
            .map_err(PortError::storage)
    }
}

/// Yesterday's group-summary hot topics, used as broadcast content.
#[derive(Clone)]
pub struct PgHotTopics {
    pool: PgPool,
}

impl PgHotTopics {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BroadcastSource for PgHotTopics {
    async fn broadcast_fallback_content(&self) -> Result<Vec<RecommendationItem>, PortError> {
        let yesterday = Local::now().date_naive() - Duration::days(1);
        let topics = recpush_db::list_hot_topics_for_date(&self.pool, yesterday)
            .await
            .map_err(PortError::storage)?;
        tracing::debug!(%yesterday, topics = topics.len(), "broadcast: hot topics loaded");
        Ok(topics.into_iter().filter_map(hot_topic_item).collect())
    }
}

fn hot_topic_item(topic: HotTopic) -> Option<RecommendationItem> {
    let title = strip_markdown_headers(&topic.title);
    if title.is_empty() {
        return None;
    }
    let content = strip_markdown_headers(&topic.content);
    Some(
        RecommendationItem::new(RecommendationSource::GroupSummary, title, content)
            .with_score(HOT_TOPIC_SCORE),
    )
}
