use chrono::{DateTime, Utc};
use recpush_core::{Profile, RecommendationItem};
use sqlx::PgPool;

use crate::DbError;

/// Recorded with every snapshot so later rankers can be told apart.
pub const ALGORITHM_PROFILE_KEYWORDS: &str = "profile_keywords";

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RecommendationCacheRow {
    pub cid: String,
    pub recommendations: serde_json::Value,
    pub item_count: i32,
    pub user_profile: serde_json::Value,
    pub algorithm: String,
    pub generated_at: DateTime<Utc>,
}

impl RecommendationCacheRow {
    /// Decode the stored item list.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Json`] if the stored list does not hold
    /// recommendation items.
    pub fn items(&self) -> Result<Vec<RecommendationItem>, DbError> {
        serde_json::from_value(self.recommendations.clone()).map_err(|source| DbError::Json {
            column: "recommendation_cache.recommendations",
            source,
        })
    }
}

/// Replace the snapshot for `cid` with `items`, recording the profile they
/// were derived from.
///
/// # Errors
///
/// Returns [`DbError::Json`] if serialization fails, or [`DbError::Sqlx`] on
/// database failure.
pub async fn save_recommendation_snapshot(
    pool: &PgPool,
    cid: &str,
    items: &[RecommendationItem],
    profile: &Profile,
) -> Result<(), DbError> {
    let recommendations = serde_json::to_value(items).map_err(|source| DbError::Json {
        column: "recommendation_cache.recommendations",
        source,
    })?;
    let user_profile = serde_json::to_value(&profile.attributes).map_err(|source| DbError::Json {
        column: "recommendation_cache.user_profile",
        source,
    })?;
    let item_count = i32::try_from(items.len()).unwrap_or(i32::MAX);

    sqlx::query(
        "INSERT INTO recommendation_cache \
             (cid, recommendations, item_count, user_profile, algorithm, generated_at) \
         VALUES ($1, $2, $3, $4, $5, NOW()) \
         ON CONFLICT (cid) DO UPDATE SET \
             recommendations = EXCLUDED.recommendations, \
             item_count = EXCLUDED.item_count, \
             user_profile = EXCLUDED.user_profile, \
             algorithm = EXCLUDED.algorithm, \
             generated_at = EXCLUDED.generated_at",
    )
    .bind(cid)
    .bind(&recommendations)
    .bind(item_count)
    .bind(&user_profile)
    .bind(ALGORITHM_PROFILE_KEYWORDS)
    .execute(pool)
    .await?;

    Ok(())
}

/// Fetch the latest snapshot for a user.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on database failure.
pub async fn get_recommendation_snapshot(
    pool: &PgPool,
    cid: &str,
) -> Result<Option<RecommendationCacheRow>, DbError> {
    let row = sqlx::query_as::<_, RecommendationCacheRow>(
        "SELECT cid, recommendations, item_count, user_profile, algorithm, generated_at \
         FROM recommendation_cache \
         WHERE cid = $1",
    )
    .bind(cid)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Users whose snapshot holds at least one item.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on database failure.
pub async fn list_snapshot_cids(pool: &PgPool) -> Result<Vec<String>, DbError> {
    let cids = sqlx::query_scalar::<_, String>(
        "SELECT cid FROM recommendation_cache WHERE item_count > 0 ORDER BY cid",
    )
    .fetch_all(pool)
    .await?;

    Ok(cids)
}
