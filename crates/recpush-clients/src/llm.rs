//! Profile inference through an OpenAI-compatible chat-completions API.
//!
//! Large activity bundles are split into segments that fit half the model's
//! context, inferred concurrently, and folded back into one profile with the
//! same merge used between runs.

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use recpush_core::{LlmConfig, ProfileAttributes};
use recpush_pipeline::merge::{backfill_consistency, merge_profiles, normalize_keywords};
use recpush_pipeline::text::{extract_json_object, split_by_tokens};
use recpush_pipeline::{PortError, ProfileInference, SourceData};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};

use crate::error::ClientError;
use crate::retry::{retry_with_backoff, RetryPolicy};

const SERVICE: &str = "llm";
const COMPLETIONS_PATH: &str = "v1/chat/completions";

const INSTRUCTIONS: &str = "Analyse the user activity below and describe the user's interests \
as search tags for a crypto and blockchain knowledge base. Cover technical interests, \
investment preferences, product usage and the kinds of questions the user asks. \
Give each keyword a weight between 0 and 1 and order keywords by weight, highest first.

Reply with a single JSON object of this shape and nothing else:
{\"interests\": [\"...\"], \"weighted_keywords\": [{\"keyword\": \"...\", \"weight\": 0.9}], \
\"activity_level\": \"high|medium|low\", \"user_type\": \"...\"}";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

pub struct LlmClient {
    client: Client,
    endpoint: Url,
    api_key: String,
    model: String,
    segment_tokens: usize,
    max_concurrency: usize,
    retry: RetryPolicy,
}

impl LlmClient {
    /// Build a client from config, or `None` when no API key is configured.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidUrl`] if the base URL does not parse, or
    /// [`ClientError::Http`] if the HTTP client cannot be built.
    pub fn from_config(config: &LlmConfig, retry: RetryPolicy) -> Result<Option<Self>, ClientError> {
        let Some(api_key) = config.api_key.as_deref() else {
            return Ok(None);
        };
        let base = crate::parse_url(&format!("{}/", config.base_url.trim_end_matches('/')))?;
        let endpoint = base
            .join(COMPLETIONS_PATH)
            .map_err(|e| ClientError::InvalidUrl(format!("'{}': {e}", config.base_url)))?;

        Ok(Some(Self {
            client: crate::build_http_client(config.timeout_secs)?,
            endpoint,
            api_key: api_key.to_owned(),
            model: config.model.clone(),
            segment_tokens: (config.max_token_length / 2).max(1),
            max_concurrency: config.max_concurrency.max(1),
            retry,
        }))
    }

    /// Infer a profile from one user's activity.
    ///
    /// Segments that fail are logged and left out of the fold.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::AllSegmentsFailed`] when no segment produced a
    /// usable profile.
    pub async fn infer(&self, data: &SourceData) -> Result<ProfileAttributes, ClientError> {
        let segments = split_by_tokens(&render_activity(data), self.segment_tokens);
        let total = segments.len();
        tracing::info!(cid = %data.cid, segments = total, "llm: inferring profile");

        let mut results: Vec<(usize, Result<ProfileAttributes, ClientError>)> =
            stream::iter(segments.into_iter().enumerate())
                .map(|(index, segment)| async move { (index, self.infer_segment(&segment).await) })
                .buffer_unordered(self.max_concurrency)
                .collect()
                .await;
        results.sort_by_key(|(index, _)| *index);

        let merged_at = Utc::now();
        let mut folded: Option<ProfileAttributes> = None;
        for (index, result) in results {
            match result {
                Ok(attrs) => folded = Some(merge_profiles(folded.as_ref(), attrs, merged_at)),
                Err(e) => {
                    tracing::warn!(cid = %data.cid, segment = index + 1, total, error = %e, "llm: segment failed");
                }
            }
        }

        let mut profile = folded.ok_or(ClientError::AllSegmentsFailed { segments: total })?;
        normalize_keywords(&mut profile);
        backfill_consistency(&mut profile);
        Ok(profile)
    }

    async fn infer_segment(&self, segment: &str) -> Result<ProfileAttributes, ClientError> {
        let prompt = format!("{INSTRUCTIONS}\n\n{segment}");
        let reply = retry_with_backoff(SERVICE, self.retry, || self.complete(&prompt)).await?;
        parse_profile_reply(&reply)
    }

    async fn complete(&self, prompt: &str) -> Result<String, ClientError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user".to_owned(),
                content: prompt.to_owned(),
            }],
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?
            .error_for_status()?;
        let body = response.text().await?;
        let parsed: ChatResponse =
            serde_json::from_str(&body).map_err(|e| ClientError::Deserialize {
                context: "chat completion".to_owned(),
                source: e,
            })?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or(ClientError::EmptyReply)
    }
}

/// Render the activity bundle as plain lines, one post or message per line.
fn render_activity(data: &SourceData) -> String {
    let mut lines = Vec::with_capacity(data.activity_count() + 3);
    if !data.active_groups.is_empty() {
        lines.push(format!("Active groups: {}", data.active_groups.join(", ")));
    }
    if !data.community_posts.is_empty() {
        lines.push("Community posts:".to_owned());
        lines.extend(data.community_posts.iter().map(|p| flatten(p)));
    }
    if !data.group_messages.is_empty() {
        lines.push("Group chat messages:".to_owned());
        lines.extend(data.group_messages.iter().map(|m| flatten(m)));
    }
    lines.join("\n")
}

fn flatten(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn parse_profile_reply(reply: &str) -> Result<ProfileAttributes, ClientError> {
    let json = extract_json_object(reply).ok_or(ClientError::EmptyReply)?;
    serde_json::from_str(json).map_err(|e| ClientError::Deserialize {
        context: "profile reply".to_owned(),
        source: e,
    })
}

#[async_trait]
impl ProfileInference for LlmClient {
    async fn infer_profile(&self, data: &SourceData) -> Result<ProfileAttributes, PortError> {
        self.infer(data).await.map_err(PortError::upstream)
    }
}

#[cfg(test)]
mod tests {
    use recpush_core::ActivityLevel;

    use super::*;

    #[test]
    fn parses_reply_wrapped_in_prose() {
        let reply = "Sure! ```json\n{\"interests\": [\"defi\"], \"activity_level\": \"HIGH\", \
                     \"user_type\": \"trader\"}\n```";

        let attrs = parse_profile_reply(reply).unwrap();

        assert_eq!(attrs.interests, vec!["defi"]);
        assert_eq!(attrs.activity_level, Some(ActivityLevel::High));
        assert_eq!(attrs.user_type, "trader");
    }

    #[test]
    fn reply_without_json_is_empty() {
        assert!(matches!(
            parse_profile_reply("I cannot help with that."),
            Err(ClientError::EmptyReply)
        ));
    }

    #[test]
    fn render_puts_each_entry_on_one_line() {
        let data = SourceData {
            cid: "u1".to_owned(),
            community_posts: vec!["first\npost".to_owned()],
            group_messages: vec!["hello".to_owned()],
            active_groups: vec!["Alpha".to_owned(), "Beta".to_owned()],
        };

        assert_eq!(
            render_activity(&data),
            "Active groups: Alpha, Beta\nCommunity posts:\nfirst post\nGroup chat messages:\nhello"
        );
    }

    #[test]
    fn missing_api_key_disables_client() {
        let config = LlmConfig {
            base_url: "https://llm.example.com".to_owned(),
            api_key: None,
            model: "m".to_owned(),
            max_token_length: 8000,
            max_concurrency: 5,
            timeout_secs: 30,
        };

        assert!(LlmClient::from_config(&config, RetryPolicy::none())
            .unwrap()
            .is_none());
    }
}
