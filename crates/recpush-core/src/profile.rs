use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// How active a user has been across community and group channels.
///
/// Variants are declared in ascending order so the derived `Ord` matches
/// `minimal < low < medium < high`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityLevel {
    Minimal,
    Low,
    Medium,
    High,
}

impl ActivityLevel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ActivityLevel::Minimal => "minimal",
            ActivityLevel::Low => "low",
            ActivityLevel::Medium => "medium",
            ActivityLevel::High => "high",
        }
    }

    /// Classify a raw activity count (posts + messages + groups).
    #[must_use]
    pub fn from_activity_count(count: usize) -> Self {
        match count {
            0 => ActivityLevel::Minimal,
            1..=3 => ActivityLevel::Low,
            4..=10 => ActivityLevel::Medium,
            _ => ActivityLevel::High,
        }
    }
}

impl fmt::Display for ActivityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActivityLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "minimal" => Ok(ActivityLevel::Minimal),
            "low" => Ok(ActivityLevel::Low),
            "medium" => Ok(ActivityLevel::Medium),
            "high" => Ok(ActivityLevel::High),
            other => Err(format!("unknown activity level: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedKeyword {
    pub keyword: String,
    pub weight: f64,
}

impl WeightedKeyword {
    pub fn new(keyword: impl Into<String>, weight: f64) -> Self {
        Self {
            keyword: keyword.into(),
            weight,
        }
    }
}

/// Typed view of a stored profile document.
///
/// Fields the pipeline does not inspect are kept in `extra` so they survive
/// a read-merge-write cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileAttributes {
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default)]
    pub weighted_keywords: Vec<WeightedKeyword>,
    #[serde(
        default,
        deserialize_with = "lenient_activity_level",
        skip_serializing_if = "Option::is_none"
    )]
    pub activity_level: Option<ActivityLevel>,
    #[serde(default)]
    pub user_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ProfileAttributes {
    /// Keywords in search order: weighted keywords as stored, falling back to
    /// interests when no weighted keywords exist.
    #[must_use]
    pub fn ordered_keywords(&self) -> Vec<String> {
        if self.weighted_keywords.is_empty() {
            self.interests.clone()
        } else {
            self.weighted_keywords
                .iter()
                .map(|wk| wk.keyword.clone())
                .collect()
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.interests.is_empty() && self.weighted_keywords.is_empty()
    }
}

/// Model output is not trusted to spell levels correctly; anything
/// unrecognised is treated as absent.
fn lenient_activity_level<'de, D>(deserializer: D) -> Result<Option<ActivityLevel>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|s| s.parse().ok()))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub cid: String,
    pub attributes: ProfileAttributes,
    pub updated_at: DateTime<Utc>,
}
