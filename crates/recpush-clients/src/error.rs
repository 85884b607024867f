use thiserror::Error;

/// Errors returned by the outbound HTTP clients.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network or TLS failure, or a non-2xx status, from the HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A configured endpoint is not a valid URL.
    #[error("invalid URL {0}")]
    InvalidUrl(String),

    /// The service answered but reported an application-level failure.
    #[error("{service} API error (code {code}): {message}")]
    Api {
        service: &'static str,
        code: i64,
        message: String,
    },

    /// The response body could not be deserialized into the expected type.
    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// The model reply contained no JSON object.
    #[error("model reply contained no JSON object")]
    EmptyReply,

    /// Every prompt segment failed, so no profile could be assembled.
    #[error("all {segments} prompt segments failed")]
    AllSegmentsFailed { segments: usize },
}
