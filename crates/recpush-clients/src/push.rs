//! Client for the tag-push channel.
//!
//! Requests are signed with `Authorization = md5(apiKey + last four digits of
//! the millisecond timestamp)`. Delivery counts as accepted only on HTTP 200
//! with `success == true` and `errCode == 200` in the body.

use async_trait::async_trait;
use recpush_core::{PushConfig, RecommendationItem};
use recpush_pipeline::{Pusher, Recipient};
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};

use crate::error::ClientError;

const SERVICE: &str = "push";
const ACCEPTED_ERR_CODE: i64 = 200;

#[derive(Debug, Serialize)]
struct PushPayload<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    cid: Option<&'a str>,
    tags: Vec<PushTag<'a>>,
}

#[derive(Debug, Serialize)]
struct PushTag<'a> {
    title: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct PushReply {
    #[serde(default, rename = "errCode")]
    err_code: i64,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    success: bool,
}

pub struct PushClient {
    client: Client,
    url: Url,
    api_key: String,
}

impl PushClient {
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidUrl`] if the configured URL does not
    /// parse, or [`ClientError::Http`] if the HTTP client cannot be built.
    pub fn new(config: &PushConfig) -> Result<Self, ClientError> {
        Ok(Self {
            client: crate::build_http_client(config.timeout_secs)?,
            url: crate::parse_url(&config.url)?,
            api_key: config.api_key.clone().unwrap_or_default(),
        })
    }

    /// Send `items` to `recipient` once.
    ///
    /// # Errors
    ///
    /// - [`ClientError::Http`] on network failure.
    /// - [`ClientError::Api`] on any status other than 200, or when the body
    ///   does not confirm acceptance.
    /// - [`ClientError::Deserialize`] if the body is not the expected reply.
    pub async fn send(
        &self,
        recipient: &Recipient,
        items: &[RecommendationItem],
    ) -> Result<(), ClientError> {
        let payload = PushPayload {
            cid: match recipient {
                Recipient::User(cid) => Some(cid.as_str()),
                Recipient::Broadcast => None,
            },
            tags: items
                .iter()
                .map(|item| PushTag {
                    title: &item.title,
                    content: &item.content,
                })
                .collect(),
        };

        let timestamp = chrono::Utc::now().timestamp_millis().to_string();
        let response = self
            .client
            .post(self.url.clone())
            .header("timestamp", &timestamp)
            .header("apiKey", &self.api_key)
            .header(
                reqwest::header::AUTHORIZATION,
                authorization(&self.api_key, &timestamp),
            )
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if status != StatusCode::OK {
            return Err(ClientError::Api {
                service: SERVICE,
                code: i64::from(status.as_u16()),
                message: body,
            });
        }

        let reply: PushReply = serde_json::from_str(&body).map_err(|e| ClientError::Deserialize {
            context: format!("push reply for {recipient}"),
            source: e,
        })?;
        if !reply.success || reply.err_code != ACCEPTED_ERR_CODE {
            return Err(ClientError::Api {
                service: SERVICE,
                code: reply.err_code,
                message: reply.msg,
            });
        }
        Ok(())
    }
}

/// `md5(api_key + last four characters of timestamp)` as lowercase hex.
pub(crate) fn authorization(api_key: &str, timestamp: &str) -> String {
    let suffix = &timestamp[timestamp.len().saturating_sub(4)..];
    format!("{:x}", md5::compute(format!("{api_key}{suffix}")))
}

#[async_trait]
impl Pusher for PushClient {
    async fn push_to_recipient(&self, recipient: &Recipient, items: &[RecommendationItem]) -> bool {
        match self.send(recipient, items).await {
            Ok(()) => {
                tracing::info!(%recipient, items = items.len(), "push: delivered");
                true
            }
            Err(e) => {
                tracing::warn!(%recipient, items = items.len(), error = %e, "push: not accepted");
                false
            }
        }
    }
}
