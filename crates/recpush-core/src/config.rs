use crate::app_config::{
    AppConfig, Environment, LlmConfig, PushConfig, RagConfig, ScheduleConfig, ScheduleMode,
};
use crate::ConfigError;

/// Topics matched against user content when no lexicon is configured.
pub const DEFAULT_TOPIC_LEXICON: &[&str] = &[
    "blockchain",
    "bitcoin",
    "ethereum",
    "defi",
    "nft",
    "web3",
    "dao",
    "staking",
    "mining",
    "wallet",
    "trading",
    "investment",
    "finance",
    "ai",
    "technology",
    "education",
    "metaverse",
    "smart contract",
];

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Numeric knobs that parse but are zero or negative fall back to their
/// default with a warning. Values that do not parse at all are rejected.
#[allow(clippy::too_many_lines)]
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar(var.to_string()))
    };

    let optional = |var: &str| -> Option<String> {
        lookup(var)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_i64 = |var: &str, default: i64| -> Result<i64, ConfigError> {
        match lookup(var) {
            Ok(raw) => raw
                .trim()
                .parse::<i64>()
                .map_err(|e| invalid(var, e.to_string())),
            Err(_) => Ok(default),
        }
    };

    // Zero or negative values are a configuration slip, not a fatal error.
    let positive = |var: &str, default: u32| -> Result<u64, ConfigError> {
        let value = parse_i64(var, i64::from(default))?;
        if value <= 0 {
            tracing::warn!(
                var,
                value,
                default,
                "config: non-positive value replaced by default"
            );
            return Ok(u64::from(default));
        }
        u64::try_from(value).map_err(|e| invalid(var, e.to_string()))
    };

    let positive_usize = |var: &str, default: u32| -> Result<usize, ConfigError> {
        let value = positive(var, default)?;
        usize::try_from(value).map_err(|e| invalid(var, e.to_string()))
    };

    let positive_u32 = |var: &str, default: u32| -> Result<u32, ConfigError> {
        let value = positive(var, default)?;
        u32::try_from(value).map_err(|e| invalid(var, e.to_string()))
    };

    let list = |var: &str| -> Vec<String> {
        optional(var)
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    };

    let database_url = require("DATABASE_URL")?;
    let rag_url = require("RECPUSH_RAG_URL")?;
    let push_url = require("RECPUSH_PUSH_URL")?;

    let env = parse_environment(&or_default("RECPUSH_ENV", "development"));

    let bind_addr = or_default("RECPUSH_BIND_ADDR", "0.0.0.0:8080")
        .parse::<SocketAddr>()
        .map_err(|e| invalid("RECPUSH_BIND_ADDR", e.to_string()))?;
    let log_level = or_default("RECPUSH_LOG_LEVEL", "info");
    let api_keys = list("RECPUSH_API_KEYS");

    let db_max_connections = positive_u32("RECPUSH_DB_MAX_CONNECTIONS", 10)?;
    let db_min_connections = positive_u32("RECPUSH_DB_MIN_CONNECTIONS", 1)?;
    let db_acquire_timeout_secs = positive("RECPUSH_DB_ACQUIRE_TIMEOUT_SECS", 10)?;

    let lookback_days = positive_u32("RECPUSH_LOOKBACK_DAYS", 7)?;
    let profile_concurrency = positive_usize("RECPUSH_PROFILE_CONCURRENCY", 10)?;
    let recommendation_concurrency = positive_usize("RECPUSH_RECOMMENDATION_CONCURRENCY", 10)?;
    let push_concurrency = positive_usize("RECPUSH_PUSH_CONCURRENCY", 5)?;
    let call_timeout_secs = positive("RECPUSH_CALL_TIMEOUT_SECS", 120)?;

    let client_max_retries = or_default("RECPUSH_CLIENT_MAX_RETRIES", "2")
        .parse::<u32>()
        .map_err(|e| invalid("RECPUSH_CLIENT_MAX_RETRIES", e.to_string()))?;
    let client_retry_backoff_ms = positive("RECPUSH_CLIENT_RETRY_BACKOFF_MS", 500)?;

    let mut topic_lexicon = list("RECPUSH_TOPIC_LEXICON");
    if topic_lexicon.is_empty() {
        topic_lexicon = DEFAULT_TOPIC_LEXICON
            .iter()
            .map(|s| (*s).to_string())
            .collect();
    }

    let schedule = build_schedule_config(&or_default("RECPUSH_SCHEDULE_MODE", "daily"), |var, d| {
        parse_i64(var, d)
    })?;

    let rag_threshold = or_default("RECPUSH_RAG_THRESHOLD", "0.3")
        .parse::<f64>()
        .map_err(|e| invalid("RECPUSH_RAG_THRESHOLD", e.to_string()))?;

    let rag = RagConfig {
        url: rag_url,
        api_key: optional("RECPUSH_RAG_API_KEY"),
        knowledge_ids: list("RECPUSH_RAG_KB_IDS"),
        top_k: positive_usize("RECPUSH_RAG_TOP_K", 5)?,
        threshold: rag_threshold,
        timeout_secs: positive("RECPUSH_RAG_TIMEOUT_SECS", 15)?,
    };

    let llm = LlmConfig {
        base_url: or_default("RECPUSH_LLM_BASE_URL", "https://api.siliconflow.cn/v1"),
        api_key: optional("RECPUSH_LLM_API_KEY"),
        model: or_default("RECPUSH_LLM_MODEL", "Qwen/Qwen2.5-7B-Instruct"),
        max_token_length: positive_usize("RECPUSH_LLM_MAX_TOKEN_LENGTH", 8000)?,
        max_concurrency: positive_usize("RECPUSH_LLM_MAX_CONCURRENCY", 5)?,
        timeout_secs: positive("RECPUSH_LLM_TIMEOUT_SECS", 60)?,
    };

    let push = PushConfig {
        url: push_url,
        api_key: optional("RECPUSH_PUSH_API_KEY"),
        timeout_secs: positive("RECPUSH_PUSH_TIMEOUT_SECS", 10)?,
    };

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        api_keys,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        lookback_days,
        profile_concurrency,
        recommendation_concurrency,
        push_concurrency,
        call_timeout_secs,
        client_max_retries,
        client_retry_backoff_ms,
        topic_lexicon,
        schedule,
        rag,
        llm,
        push,
    })
}

fn build_schedule_config<P>(mode: &str, parse_i64: P) -> Result<ScheduleConfig, ConfigError>
where
    P: Fn(&str, i64) -> Result<i64, ConfigError>,
{
    let default_hour = clock_default("RECPUSH_SCHEDULE_DEFAULT_HOUR", 9, 23, &parse_i64)?;
    let default_minute = clock_default("RECPUSH_SCHEDULE_DEFAULT_MINUTE", 0, 59, &parse_i64)?;

    let mode = match mode.trim().to_ascii_lowercase().as_str() {
        "interval" => ScheduleMode::Interval {
            interval_secs: parse_i64("RECPUSH_SCHEDULE_INTERVAL_SECS", 1800)?,
        },
        "daily" => ScheduleMode::Daily {
            hour: parse_i64("RECPUSH_SCHEDULE_HOUR", i64::from(default_hour))?,
            minute: parse_i64("RECPUSH_SCHEDULE_MINUTE", i64::from(default_minute))?,
        },
        other => {
            return Err(ConfigError::InvalidEnvVar {
                var: "RECPUSH_SCHEDULE_MODE".to_string(),
                reason: format!("expected `daily` or `interval`, got `{other}`"),
            })
        }
    };

    Ok(ScheduleConfig {
        mode,
        check_interval_secs: parse_i64("RECPUSH_SCHEDULER_CHECK_INTERVAL_SECS", 60)?,
        default_hour,
        default_minute,
    })
}

/// The fallback clock values themselves must be valid; an out-of-range
/// fallback is clamped back to the built-in value.
fn clock_default<P>(var: &str, builtin: u32, max: u32, parse_i64: &P) -> Result<u32, ConfigError>
where
    P: Fn(&str, i64) -> Result<i64, ConfigError>,
{
    let value = parse_i64(var, i64::from(builtin))?;
    match u32::try_from(value) {
        Ok(v) if v <= max => Ok(v),
        _ => {
            tracing::warn!(var, value, builtin, "config: out-of-range clock default replaced");
            Ok(builtin)
        }
    }
}

/// Parse a string into an `Environment` variant.
///
/// Unrecognized values default to `Environment::Development`.
fn parse_environment(s: &str) -> Environment {
    match s {
        "production" => Environment::Production,
        "test" => Environment::Test,
        _ => Environment::Development,
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
