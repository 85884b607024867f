//! Capabilities the pipeline consumes but does not implement.
//!
//! Storage and HTTP adapters live in other crates; tests provide in-memory
//! implementations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use recpush_core::{Profile, ProfileAttributes, RecommendationItem};
use serde::{Deserialize, Serialize};

use crate::error::PortError;

/// Raw activity gathered for one user, the input to profile inference.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceData {
    pub cid: String,
    pub community_posts: Vec<String>,
    pub group_messages: Vec<String>,
    pub active_groups: Vec<String>,
}

impl SourceData {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.community_posts.is_empty()
            && self.group_messages.is_empty()
            && self.active_groups.is_empty()
    }

    /// Number of distinct signals used to classify activity level.
    #[must_use]
    pub fn activity_count(&self) -> usize {
        self.community_posts.len() + self.group_messages.len() + self.active_groups.len()
    }
}

/// Destination of a push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    User(String),
    Broadcast,
}

impl std::fmt::Display for Recipient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Recipient::User(cid) => f.write_str(cid),
            Recipient::Broadcast => f.write_str("broadcast"),
        }
    }
}

#[async_trait]
pub trait ActivitySource: Send + Sync {
    /// Users with any activity inside the lookback window, without duplicates.
    async fn list_candidates(&self, lookback_days: u32) -> Result<Vec<String>, PortError>;

    async fn has_newer_source_data_than(
        &self,
        cid: &str,
        since: DateTime<Utc>,
    ) -> Result<bool, PortError>;

    /// Activity inside the lookback window, restricted to rows newer than
    /// `since` when a previous profile exists.
    async fn compute_raw_profile_signals(
        &self,
        cid: &str,
        lookback_days: u32,
        since: Option<DateTime<Utc>>,
    ) -> Result<SourceData, PortError>;
}

#[async_trait]
pub trait ProfileInference: Send + Sync {
    async fn infer_profile(&self, data: &SourceData) -> Result<ProfileAttributes, PortError>;
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn load_profile(&self, cid: &str) -> Result<Option<Profile>, PortError>;

    async fn save_profile(&self, profile: &Profile) -> Result<(), PortError>;

    async fn list_users_with_profiles(&self) -> Result<Vec<String>, PortError>;
}

#[async_trait]
pub trait KnowledgeSearch: Send + Sync {
    async fn search_knowledge_base(
        &self,
        keyword: &str,
        top_k: usize,
    ) -> Result<Vec<RecommendationItem>, PortError>;
}

#[async_trait]
pub trait RecommendationStore: Send + Sync {
    async fn load_cached_recommendations(
        &self,
        cid: &str,
    ) -> Result<Option<Vec<RecommendationItem>>, PortError>;

    /// Replace the snapshot for `cid`, recording the profile it came from.
    async fn save_recommendations(
        &self,
        cid: &str,
        items: &[RecommendationItem],
        profile: &Profile,
    ) -> Result<(), PortError>;

    async fn list_users_with_recommendations(&self) -> Result<Vec<String>, PortError>;
}

#[async_trait]
pub trait Pusher: Send + Sync {
    /// Deliver once; `false` means the channel did not accept the message.
    async fn push_to_recipient(&self, recipient: &Recipient, items: &[RecommendationItem])
        -> bool;
}

#[async_trait]
pub trait BroadcastSource: Send + Sync {
    async fn broadcast_fallback_content(&self) -> Result<Vec<RecommendationItem>, PortError>;
}
