//! Client for the knowledge-base (RAG) search endpoint.
//!
//! The service wraps results in `{code, message, data: {results}}`; a
//! non-zero `code` is surfaced as [`ClientError::Api`] even on HTTP 200.

use async_trait::async_trait;
use recpush_core::{RagConfig, RecommendationItem, RecommendationSource};
use recpush_pipeline::text::strip_markdown_headers;
use recpush_pipeline::{KnowledgeSearch, PortError};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};

use crate::error::ClientError;
use crate::retry::{retry_with_backoff, RetryPolicy};

const SERVICE: &str = "knowledge base";

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    knowledge_ids: &'a [String],
    query: &'a str,
    threshold: f64,
    top_k: usize,
}

#[derive(Debug, Deserialize)]
struct SearchEnvelope {
    code: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Option<SearchData>,
}

#[derive(Debug, Default, Deserialize)]
struct SearchData {
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(default)]
    document_id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    score: Option<f64>,
}

pub struct KnowledgeBaseClient {
    client: Client,
    url: Url,
    api_key: Option<String>,
    knowledge_ids: Vec<String>,
    threshold: f64,
    retry: RetryPolicy,
}

impl KnowledgeBaseClient {
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidUrl`] if the configured URL does not
    /// parse, or [`ClientError::Http`] if the HTTP client cannot be built.
    pub fn new(config: &RagConfig, retry: RetryPolicy) -> Result<Self, ClientError> {
        Ok(Self {
            client: crate::build_http_client(config.timeout_secs)?,
            url: crate::parse_url(&config.url)?,
            api_key: config.api_key.clone(),
            knowledge_ids: config.knowledge_ids.clone(),
            threshold: config.threshold,
            retry,
        })
    }

    /// Search for `keyword`, returning cleaned items tagged with the keyword.
    ///
    /// # Errors
    ///
    /// - [`ClientError::Http`] on network failure or non-2xx status, after
    ///   retries.
    /// - [`ClientError::Api`] if the envelope carries a non-zero code.
    /// - [`ClientError::Deserialize`] if the body does not match the envelope.
    pub async fn search(
        &self,
        keyword: &str,
        top_k: usize,
    ) -> Result<Vec<RecommendationItem>, ClientError> {
        let request = SearchRequest {
            knowledge_ids: &self.knowledge_ids,
            query: keyword,
            threshold: self.threshold,
            top_k,
        };

        let envelope =
            retry_with_backoff(SERVICE, self.retry, || self.send(&request, keyword)).await?;
        if envelope.code != 0 {
            return Err(ClientError::Api {
                service: SERVICE,
                code: envelope.code,
                message: envelope.message,
            });
        }

        let hits = envelope.data.unwrap_or_default().results;
        tracing::debug!(keyword, hits = hits.len(), "knowledge base: search complete");
        Ok(hits
            .into_iter()
            .filter_map(|hit| into_item(hit, keyword))
            .collect())
    }

    async fn send(
        &self,
        request: &SearchRequest<'_>,
        keyword: &str,
    ) -> Result<SearchEnvelope, ClientError> {
        let mut builder = self
            .client
            .post(self.url.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?.error_for_status()?;
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| ClientError::Deserialize {
            context: format!("knowledge base search(query={keyword})"),
            source: e,
        })
    }
}

fn into_item(hit: SearchHit, keyword: &str) -> Option<RecommendationItem> {
    let title = strip_markdown_headers(&hit.title);
    let content = strip_markdown_headers(&hit.content);
    if title.is_empty() || content.is_empty() {
        return None;
    }

    let mut item = RecommendationItem::new(RecommendationSource::Rag, title, content);
    if !hit.document_id.is_empty() {
        item = item.with_reference_id(hit.document_id);
    }
    if let Some(score) = hit.score {
        item = item.with_score(score);
    }
    item.search_keyword = Some(keyword.to_owned());
    Some(item)
}

#[async_trait]
impl KnowledgeSearch for KnowledgeBaseClient {
    async fn search_knowledge_base(
        &self,
        keyword: &str,
        top_k: usize,
    ) -> Result<Vec<RecommendationItem>, PortError> {
        self.search(keyword, top_k)
            .await
            .map_err(PortError::upstream)
    }
}
