//! Signal-based profile used when inference is unavailable or fails.

use std::collections::HashMap;

use recpush_core::{ActivityLevel, ProfileAttributes, WeightedKeyword};
use serde_json::json;

use crate::ports::SourceData;

/// Build a profile from lexicon hits in the user's own content.
///
/// Each lexicon topic is counted once per text that mentions it
/// (case-insensitive); weights are frequencies scaled by the most frequent
/// topic. Group names count as texts too.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn heuristic_profile(data: &SourceData, lexicon: &[String]) -> ProfileAttributes {
    let texts = data
        .community_posts
        .iter()
        .chain(&data.group_messages)
        .chain(&data.active_groups)
        .map(|t| t.to_lowercase());

    let mut frequency: HashMap<&str, usize> = HashMap::new();
    for text in texts {
        for topic in lexicon {
            if !topic.is_empty() && text.contains(&topic.to_lowercase()) {
                *frequency.entry(topic.as_str()).or_default() += 1;
            }
        }
    }

    let max = frequency.values().copied().max().unwrap_or(0);
    let mut weighted_keywords: Vec<WeightedKeyword> = frequency
        .into_iter()
        .map(|(topic, count)| WeightedKeyword::new(topic, count as f64 / max as f64))
        .collect();
    weighted_keywords.sort_by(|a, b| {
        b.weight
            .total_cmp(&a.weight)
            .then_with(|| a.keyword.cmp(&b.keyword))
    });

    let interests = weighted_keywords
        .iter()
        .map(|wk| wk.keyword.clone())
        .collect();

    let mut attrs = ProfileAttributes {
        interests,
        weighted_keywords,
        activity_level: Some(ActivityLevel::from_activity_count(data.activity_count())),
        ..ProfileAttributes::default()
    };
    attrs.extra.insert(
        "data_sources".to_string(),
        json!({
            "community_posts": !data.community_posts.is_empty(),
            "group_activity": !data.group_messages.is_empty() || !data.active_groups.is_empty(),
        }),
    );
    attrs.extra.insert(
        "content_sources".to_string(),
        json!({
            "community_posts_count": data.community_posts.len(),
            "group_messages_count": data.group_messages.len(),
            "active_groups": data.active_groups,
        }),
    );
    attrs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lexicon() -> Vec<String> {
        ["defi", "nft", "staking"]
            .iter()
            .map(|s| (*s).to_string())
            .collect()
    }

    #[test]
    fn weights_scale_by_most_frequent_topic() {
        let data = SourceData {
            cid: "u1".into(),
            community_posts: vec!["DeFi yields".into(), "more defi talk".into()],
            group_messages: vec!["an NFT drop".into()],
            active_groups: Vec::new(),
        };
        let attrs = heuristic_profile(&data, &lexicon());

        assert_eq!(attrs.interests, vec!["defi", "nft"]);
        assert!((attrs.weighted_keywords[0].weight - 1.0).abs() < 1e-9);
        assert!((attrs.weighted_keywords[1].weight - 0.5).abs() < 1e-9);
        assert_eq!(attrs.activity_level, Some(ActivityLevel::Low));
    }

    #[test]
    fn no_hits_still_reports_activity() {
        let data = SourceData {
            cid: "u1".into(),
            community_posts: (0..12).map(|i| format!("post {i}")).collect(),
            ..SourceData::default()
        };
        let attrs = heuristic_profile(&data, &lexicon());
        assert!(attrs.is_empty());
        assert_eq!(attrs.activity_level, Some(ActivityLevel::High));
        assert_eq!(attrs.extra["content_sources"]["community_posts_count"], 12);
    }
}
