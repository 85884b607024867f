use std::net::SocketAddr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Timing mode of the scheduled workflow.
///
/// Values are carried as configured; the scheduler substitutes defaults for
/// non-positive intervals and out-of-range clock times when it starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleMode {
    /// Run every `interval_secs` seconds after the previous run.
    Interval { interval_secs: i64 },
    /// Run once a day at `hour:minute` local wall-clock time.
    Daily { hour: i64, minute: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleConfig {
    pub mode: ScheduleMode,
    pub check_interval_secs: i64,
    pub default_hour: u32,
    pub default_minute: u32,
}

#[derive(Clone)]
pub struct RagConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub knowledge_ids: Vec<String>,
    pub top_k: usize,
    pub threshold: f64,
    pub timeout_secs: u64,
}

impl std::fmt::Debug for RagConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RagConfig")
            .field("url", &self.url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[redacted]"))
            .field("knowledge_ids", &self.knowledge_ids)
            .field("top_k", &self.top_k)
            .field("threshold", &self.threshold)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Clone)]
pub struct LlmConfig {
    pub base_url: String,
    /// Inference is disabled when no key is configured; profiles then come
    /// from the heuristic builder only.
    pub api_key: Option<String>,
    pub model: String,
    pub max_token_length: usize,
    pub max_concurrency: usize,
    pub timeout_secs: u64,
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[redacted]"))
            .field("model", &self.model)
            .field("max_token_length", &self.max_token_length)
            .field("max_concurrency", &self.max_concurrency)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Clone)]
pub struct PushConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl std::fmt::Debug for PushConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushConfig")
            .field("url", &self.url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[redacted]"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub api_keys: Vec<String>,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub lookback_days: u32,
    pub profile_concurrency: usize,
    pub recommendation_concurrency: usize,
    pub push_concurrency: usize,
    pub call_timeout_secs: u64,
    pub client_max_retries: u32,
    pub client_retry_backoff_ms: u64,
    pub topic_lexicon: Vec<String>,
    pub schedule: ScheduleConfig,
    pub rag: RagConfig,
    pub llm: LlmConfig,
    pub push: PushConfig,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("database_url", &"[redacted]")
            .field("api_keys", &format!("[{} redacted]", self.api_keys.len()))
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("lookback_days", &self.lookback_days)
            .field("profile_concurrency", &self.profile_concurrency)
            .field(
                "recommendation_concurrency",
                &self.recommendation_concurrency,
            )
            .field("push_concurrency", &self.push_concurrency)
            .field("call_timeout_secs", &self.call_timeout_secs)
            .field("client_max_retries", &self.client_max_retries)
            .field("client_retry_backoff_ms", &self.client_retry_backoff_ms)
            .field("topic_lexicon", &self.topic_lexicon.len())
            .field("schedule", &self.schedule)
            .field("rag", &self.rag)
            .field("llm", &self.llm)
            .field("push", &self.push)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_display() {
        assert_eq!(Environment::Production.to_string(), "production");
        assert_eq!(Environment::Development.to_string(), "development");
    }

    #[test]
    fn push_config_debug_redacts_api_key() {
        let cfg = PushConfig {
            url: "https://push.example.com/api".to_string(),
            api_key: Some("super-secret".to_string()),
            timeout_secs: 10,
        };
        let rendered = format!("{cfg:?}");
        assert!(rendered.contains("[redacted]"));
        assert!(!rendered.contains("super-secret"));
    }
}
