use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::DbError;

/// One entry of a group summary's `hot_topics` array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotTopic {
    pub title: String,
    #[serde(default)]
    pub content: String,
}

/// Parse a `hot_topics` column value.
///
/// Entries that are not `{title, content}` objects, or whose title is blank,
/// are dropped. A value that is not an array yields nothing.
#[must_use]
pub fn parse_hot_topics(value: &serde_json::Value) -> Vec<HotTopic> {
    let Some(entries) = value.as_array() else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| serde_json::from_value::<HotTopic>(entry.clone()).ok())
        .filter(|topic| !topic.title.trim().is_empty())
        .collect()
}

/// Hot topics from every group summary written on `date` (server time zone),
/// newest summary first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on database failure.
pub async fn list_hot_topics_for_date(
    pool: &PgPool,
    date: NaiveDate,
) -> Result<Vec<HotTopic>, DbError> {
    let columns = sqlx::query_scalar::<_, serde_json::Value>(
        "SELECT hot_topics FROM group_chat_summaries \
         WHERE hot_topics IS NOT NULL \
           AND created_at::date = $1 \
         ORDER BY created_at DESC",
    )
    .bind(date)
    .fetch_all(pool)
    .await?;

    Ok(columns.iter().flat_map(parse_hot_topics).collect())
}
