use chrono::{DateTime, Utc};
use recpush_core::{Profile, ProfileAttributes};
use sqlx::PgPool;

use crate::DbError;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserProfileRow {
    pub cid: String,
    pub profile: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserProfileRow {
    /// Decode the stored JSON document into a typed [`Profile`].
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Json`] if the stored document is not a profile object.
    pub fn into_profile(self) -> Result<Profile, DbError> {
        let attributes: ProfileAttributes =
            serde_json::from_value(self.profile).map_err(|source| DbError::Json {
                column: "user_profiles.profile",
                source,
            })?;
        Ok(Profile {
            cid: self.cid,
            attributes,
            updated_at: self.updated_at,
        })
    }
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// Fetch the stored profile row for a user.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on database failure.
pub async fn get_user_profile(pool: &PgPool, cid: &str) -> Result<Option<UserProfileRow>, DbError> {
    let row = sqlx::query_as::<_, UserProfileRow>(
        "SELECT cid, profile, created_at, updated_at \
         FROM user_profiles \
         WHERE cid = $1",
    )
    .bind(cid)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Every user that has a stored profile, in stable order.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on database failure.
pub async fn list_profile_cids(pool: &PgPool) -> Result<Vec<String>, DbError> {
    let cids = sqlx::query_scalar::<_, String>("SELECT cid FROM user_profiles ORDER BY cid")
        .fetch_all(pool)
        .await?;

    Ok(cids)
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

/// Insert or replace the profile for `profile.cid`.
///
/// `updated_at` is taken from the profile so the stored timestamp matches the
/// value later compared against new activity.
///
/// # Errors
///
/// Returns [`DbError::Json`] if the attributes cannot be serialized, or
/// [`DbError::Sqlx`] on database failure.
pub async fn upsert_user_profile(pool: &PgPool, profile: &Profile) -> Result<(), DbError> {
    let document = serde_json::to_value(&profile.attributes).map_err(|source| DbError::Json {
        column: "user_profiles.profile",
        source,
    })?;

    sqlx::query(
        "INSERT INTO user_profiles (cid, profile, updated_at) \
         VALUES ($1, $2, $3) \
         ON CONFLICT (cid) DO UPDATE SET \
             profile = EXCLUDED.profile, \
             updated_at = EXCLUDED.updated_at",
    )
    .bind(&profile.cid)
    .bind(&document)
    .bind(profile.updated_at)
    .execute(pool)
    .await?;

    Ok(())
}
