pub mod app_config;
pub mod config;
pub mod profile;
pub mod recommendation;

use thiserror::Error;

pub use app_config::{
    AppConfig, Environment, LlmConfig, PushConfig, RagConfig, ScheduleConfig, ScheduleMode,
};
pub use config::{load_app_config, load_app_config_from_env};
pub use profile::{ActivityLevel, Profile, ProfileAttributes, WeightedKeyword};
pub use recommendation::{RecommendationItem, RecommendationSource};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for environment variable {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}
