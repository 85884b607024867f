//! In-memory collaborators for driving the coordinator in tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use recpush_core::{
    Profile, ProfileAttributes, RecommendationItem, RecommendationSource, WeightedKeyword,
};
use recpush_pipeline::{
    ActivitySource, BroadcastSource, Collaborators, KnowledgeSearch, PipelineCoordinator,
    PipelineSettings, PortError, ProfileInference, ProfileStore, Pusher, Recipient,
    RecommendationStore, SourceData,
};

#[derive(Default)]
pub struct FakeActivity {
    pub candidates: Mutex<Vec<String>>,
    pub fail_listing: Mutex<bool>,
    /// Users reported as having activity newer than their profile.
    pub newer: Mutex<HashSet<String>>,
    pub data: Mutex<HashMap<String, SourceData>>,
}

impl FakeActivity {
    pub fn add_user(&self, cid: &str, posts: &[&str]) {
        self.candidates.lock().unwrap().push(cid.to_string());
        self.newer.lock().unwrap().insert(cid.to_string());
        self.data.lock().unwrap().insert(
            cid.to_string(),
            SourceData {
                cid: cid.to_string(),
                community_posts: posts.iter().map(|p| (*p).to_string()).collect(),
                ..SourceData::default()
            },
        );
    }

    pub fn mark_unchanged(&self, cid: &str) {
        self.newer.lock().unwrap().remove(cid);
    }
}

#[async_trait]
impl ActivitySource for FakeActivity {
    async fn list_candidates(&self, _lookback_days: u32) -> Result<Vec<String>, PortError> {
        if *self.fail_listing.lock().unwrap() {
            return Err(PortError::storage("activity tables unavailable"));
        }
        Ok(self.candidates.lock().unwrap().clone())
    }

    async fn has_newer_source_data_than(
        &self,
        cid: &str,
        _since: DateTime<Utc>,
    ) -> Result<bool, PortError> {
        Ok(self.newer.lock().unwrap().contains(cid))
    }

    async fn compute_raw_profile_signals(
        &self,
        cid: &str,
        _lookback_days: u32,
        _since: Option<DateTime<Utc>>,
    ) -> Result<SourceData, PortError> {
        Ok(self
            .data
            .lock()
            .unwrap()
            .get(cid)
            .cloned()
            .unwrap_or_default())
    }
}

#[derive(Default)]
pub enum InferenceMode {
    #[default]
    Echo,
    Fail,
    Hang,
}

/// Returns `result` (or fails / hangs) and counts calls.
#[derive(Default)]
pub struct FakeInference {
    pub mode: Mutex<InferenceMode>,
    pub result: Mutex<ProfileAttributes>,
    pub calls: AtomicUsize,
}

impl FakeInference {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProfileInference for FakeInference {
    async fn infer_profile(&self, _data: &SourceData) -> Result<ProfileAttributes, PortError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let hang = matches!(*self.mode.lock().unwrap(), InferenceMode::Hang);
        if hang {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        match *self.mode.lock().unwrap() {
            InferenceMode::Fail => Err(PortError::upstream("model overloaded")),
            _ => Ok(self.result.lock().unwrap().clone()),
        }
    }
}

#[derive(Default)]
pub struct MemoryProfiles {
    pub profiles: Mutex<HashMap<String, Profile>>,
    /// Loads for these cids fail.
    pub broken: Mutex<HashSet<String>>,
}

impl MemoryProfiles {
    pub fn insert(&self, profile: Profile) {
        self.profiles
            .lock()
            .unwrap()
            .insert(profile.cid.clone(), profile);
    }

    pub fn get(&self, cid: &str) -> Option<Profile> {
        self.profiles.lock().unwrap().get(cid).cloned()
    }
}

#[async_trait]
impl ProfileStore for MemoryProfiles {
    async fn load_profile(&self, cid: &str) -> Result<Option<Profile>, PortError> {
        if self.broken.lock().unwrap().contains(cid) {
            return Err(PortError::storage("row is corrupt"));
        }
        Ok(self.get(cid))
    }

    async fn save_profile(&self, profile: &Profile) -> Result<(), PortError> {
        self.insert(profile.clone());
        Ok(())
    }

    async fn list_users_with_profiles(&self) -> Result<Vec<String>, PortError> {
        let mut users: Vec<String> = self.profiles.lock().unwrap().keys().cloned().collect();
        users.sort();
        Ok(users)
    }
}

#[derive(Default)]
pub struct FakeSearch {
    pub results: Mutex<HashMap<String, Vec<RecommendationItem>>>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeSearch {
    pub fn set(&self, keyword: &str, items: Vec<RecommendationItem>) {
        self.results
            .lock()
            .unwrap()
            .insert(keyword.to_string(), items);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl KnowledgeSearch for FakeSearch {
    async fn search_knowledge_base(
        &self,
        keyword: &str,
        _top_k: usize,
    ) -> Result<Vec<RecommendationItem>, PortError> {
        self.calls.lock().unwrap().push(keyword.to_string());
        Ok(self
            .results
            .lock()
            .unwrap()
            .get(keyword)
            .cloned()
            .unwrap_or_default())
    }
}

#[derive(Default)]
pub struct MemoryRecommendations {
    pub snapshots: Mutex<HashMap<String, (Vec<RecommendationItem>, Profile)>>,
    pub saves: AtomicUsize,
}

impl MemoryRecommendations {
    pub fn snapshot(&self, cid: &str) -> Option<Vec<RecommendationItem>> {
        self.snapshots
            .lock()
            .unwrap()
            .get(cid)
            .map(|(items, _)| items.clone())
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecommendationStore for MemoryRecommendations {
    async fn load_cached_recommendations(
        &self,
        cid: &str,
    ) -> Result<Option<Vec<RecommendationItem>>, PortError> {
        Ok(self.snapshot(cid))
    }

    async fn save_recommendations(
        &self,
        cid: &str,
        items: &[RecommendationItem],
        profile: &Profile,
    ) -> Result<(), PortError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.snapshots
            .lock()
            .unwrap()
            .insert(cid.to_string(), (items.to_vec(), profile.clone()));
        Ok(())
    }

    async fn list_users_with_recommendations(&self) -> Result<Vec<String>, PortError> {
        let mut users: Vec<String> = self.snapshots.lock().unwrap().keys().cloned().collect();
        users.sort();
        Ok(users)
    }
}

#[derive(Default)]
pub struct RecordingPusher {
    pub pushes: Mutex<Vec<(Recipient, Vec<RecommendationItem>)>>,
    pub rejected: Mutex<HashSet<String>>,
}

impl RecordingPusher {
    pub fn pushes(&self) -> Vec<(Recipient, Vec<RecommendationItem>)> {
        self.pushes.lock().unwrap().clone()
    }

    pub fn pushed_to(&self, recipient: &Recipient) -> Option<Vec<RecommendationItem>> {
        self.pushes()
            .into_iter()
            .find(|(r, _)| r == recipient)
            .map(|(_, items)| items)
    }
}

#[async_trait]
impl Pusher for RecordingPusher {
    async fn push_to_recipient(
        &self,
        recipient: &Recipient,
        items: &[RecommendationItem],
    ) -> bool {
        self.pushes
            .lock()
            .unwrap()
            .push((recipient.clone(), items.to_vec()));
        match recipient {
            Recipient::User(cid) => !self.rejected.lock().unwrap().contains(cid),
            Recipient::Broadcast => true,
        }
    }
}

#[derive(Default)]
pub struct FakeBroadcast {
    pub items: Mutex<Vec<RecommendationItem>>,
}

#[async_trait]
impl BroadcastSource for FakeBroadcast {
    async fn broadcast_fallback_content(&self) -> Result<Vec<RecommendationItem>, PortError> {
        Ok(self.items.lock().unwrap().clone())
    }
}

#[derive(Default)]
pub struct Harness {
    pub activity: Arc<FakeActivity>,
    pub inference: Arc<FakeInference>,
    pub profiles: Arc<MemoryProfiles>,
    pub search: Arc<FakeSearch>,
    pub recommendations: Arc<MemoryRecommendations>,
    pub pusher: Arc<RecordingPusher>,
    pub broadcast: Arc<FakeBroadcast>,
}

impl Harness {
    pub fn settings() -> PipelineSettings {
        PipelineSettings {
            lookback_days: 7,
            profile_concurrency: 4,
            recommendation_concurrency: 4,
            push_concurrency: 2,
            top_k: 3,
            call_timeout: Duration::from_secs(5),
            topic_lexicon: vec!["defi".to_string(), "nft".to_string()],
        }
    }

    pub fn coordinator(&self) -> PipelineCoordinator {
        self.coordinator_with(Self::settings())
    }

    pub fn coordinator_with(&self, settings: PipelineSettings) -> PipelineCoordinator {
        let deps = Collaborators {
            activity: self.activity.clone(),
            inference: Some(self.inference.clone()),
            profiles: self.profiles.clone(),
            knowledge: self.search.clone(),
            recommendations: self.recommendations.clone(),
            pusher: self.pusher.clone(),
            broadcast: self.broadcast.clone(),
        };
        PipelineCoordinator::new(deps, settings)
    }
}

pub fn attrs(interests: &[&str], keywords: &[(&str, f64)]) -> ProfileAttributes {
    ProfileAttributes {
        interests: interests.iter().map(|s| (*s).to_string()).collect(),
        weighted_keywords: keywords
            .iter()
            .map(|(k, w)| WeightedKeyword::new(*k, *w))
            .collect(),
        ..ProfileAttributes::default()
    }
}

pub fn profile(cid: &str, attributes: ProfileAttributes) -> Profile {
    Profile {
        cid: cid.to_string(),
        attributes,
        updated_at: Utc::now() - chrono::Duration::days(1),
    }
}

pub fn kb_item(id: &str, title: &str, score: f64) -> RecommendationItem {
    RecommendationItem::new(RecommendationSource::Rag, title, format!("About {title}"))
        .with_reference_id(id)
        .with_score(score)
}
