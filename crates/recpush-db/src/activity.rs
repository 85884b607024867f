//! Read-only queries over raw community and group-chat activity.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::{days_param, DbError};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct GroupMessageRow {
    pub group_name: String,
    pub title: String,
    pub content: String,
}

/// Everything a user produced inside the lookback window.
#[derive(Debug, Clone, Default)]
pub struct UserActivity {
    pub posts: Vec<String>,
    pub messages: Vec<GroupMessageRow>,
}

impl UserActivity {
    /// Distinct non-empty group names in first-seen order.
    #[must_use]
    pub fn active_groups(&self) -> Vec<String> {
        let mut groups: Vec<String> = Vec::new();
        for message in &self.messages {
            let name = message.group_name.trim();
            if !name.is_empty() && !groups.iter().any(|g| g == name) {
                groups.push(name.to_string());
            }
        }
        groups
    }
}

/// Users with any post or group message in the last `lookback_days` days.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on database failure.
pub async fn list_active_cids(pool: &PgPool, lookback_days: u32) -> Result<Vec<String>, DbError> {
    let cids = sqlx::query_scalar::<_, String>(
        "SELECT cid FROM ( \
             SELECT sender_cid AS cid FROM group_chat_messages \
             WHERE sent_at >= NOW() - make_interval(days => $1) \
             UNION \
             SELECT cid FROM community_posts \
             WHERE created_at >= NOW() - make_interval(days => $1) \
         ) active \
         WHERE cid <> '' \
         ORDER BY cid",
    )
    .bind(days_param(lookback_days))
    .fetch_all(pool)
    .await?;

    Ok(cids)
}

/// Whether the user produced anything strictly after `since`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on database failure.
pub async fn has_activity_since(
    pool: &PgPool,
    cid: &str,
    since: DateTime<Utc>,
) -> Result<bool, DbError> {
    let newer = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS ( \
             SELECT 1 FROM group_chat_messages WHERE sender_cid = $1 AND sent_at > $2 \
         ) OR EXISTS ( \
             SELECT 1 FROM community_posts WHERE cid = $1 AND created_at > $2 \
         )",
    )
    .bind(cid)
    .bind(since)
    .fetch_one(pool)
    .await?;

    Ok(newer)
}

/// Load a user's posts and group messages, newest first.
///
/// Rows must fall inside the lookback window and, when `since` is given,
/// strictly after it.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on database failure.
pub async fn load_user_activity(
    pool: &PgPool,
    cid: &str,
    lookback_days: u32,
    since: Option<DateTime<Utc>>,
) -> Result<UserActivity, DbError> {
    let days = days_param(lookback_days);

    let posts = sqlx::query_scalar::<_, String>(
        "SELECT article_text FROM community_posts \
         WHERE cid = $1 \
           AND created_at >= NOW() - make_interval(days => $2) \
           AND ($3::timestamptz IS NULL OR created_at > $3) \
           AND article_text <> '' \
         ORDER BY created_at DESC",
    )
    .bind(cid)
    .bind(days)
    .bind(since)
    .fetch_all(pool)
    .await?;

    let messages = sqlx::query_as::<_, GroupMessageRow>(
        "SELECT group_name, title, content FROM group_chat_messages \
         WHERE sender_cid = $1 \
           AND sent_at >= NOW() - make_interval(days => $2) \
           AND ($3::timestamptz IS NULL OR sent_at > $3) \
           AND content <> '' \
         ORDER BY sent_at DESC",
    )
    .bind(cid)
    .bind(days)
    .bind(since)
    .fetch_all(pool)
    .await?;

    Ok(UserActivity { posts, messages })
}
