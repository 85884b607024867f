//! HTTP clients for the knowledge base, the chat-completion model and the
//! push channel.
//!
//! Each client implements the matching port trait from `recpush-pipeline`, so
//! the coordinator never sees `reqwest` types.

pub mod error;
pub mod knowledge_base;
pub mod llm;
pub mod push;
pub mod retry;

pub use error::ClientError;
pub use knowledge_base::KnowledgeBaseClient;
pub use llm::LlmClient;
pub use push::PushClient;
pub use retry::RetryPolicy;

use std::time::Duration;

use reqwest::Client;

const CONNECT_TIMEOUT_SECS: u64 = 10;
const USER_AGENT: &str = "recpush/0.1 (recommendation-push)";

pub(crate) fn build_http_client(timeout_secs: u64) -> Result<Client, ClientError> {
    let client = Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .user_agent(USER_AGENT)
        .build()?;
    Ok(client)
}

pub(crate) fn parse_url(raw: &str) -> Result<reqwest::Url, ClientError> {
    reqwest::Url::parse(raw.trim()).map_err(|e| ClientError::InvalidUrl(format!("'{raw}': {e}")))
}
