use serde::{Deserialize, Serialize};

/// Where a recommendation candidate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationSource {
    GroupSummary,
    Rag,
    KnowledgeBase,
}

impl RecommendationSource {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RecommendationSource::GroupSummary => "group_summary",
            RecommendationSource::Rag => "rag",
            RecommendationSource::KnowledgeBase => "knowledge_base",
        }
    }
}

impl std::fmt::Display for RecommendationSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationItem {
    pub source: RecommendationSource,
    pub title: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_keyword: Option<String>,
}

impl RecommendationItem {
    pub fn new(
        source: RecommendationSource,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            source,
            title: title.into(),
            content: content.into(),
            reference_id: None,
            score: None,
            search_keyword: None,
        }
    }

    #[must_use]
    pub fn with_reference_id(mut self, reference_id: impl Into<String>) -> Self {
        self.reference_id = Some(reference_id.into());
        self
    }

    #[must_use]
    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }
}
