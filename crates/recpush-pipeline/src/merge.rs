//! Reconciles a stored profile with a freshly inferred one.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use recpush_core::{ProfileAttributes, WeightedKeyword};

/// Merge `new` into `old`, never losing information from either side.
///
/// * interests: ordered union, old first
/// * weighted keywords: union keeping the larger weight, sorted descending
/// * activity level: the higher of the two
/// * user type: new wins unless empty
/// * extra fields: old, overridden by new on collision
///
/// Interests and weighted keywords are back-filled from each other when one
/// side ends up empty. With no previous profile the new one is returned as-is.
#[must_use]
pub fn merge_profiles(
    old: Option<&ProfileAttributes>,
    new: ProfileAttributes,
    merged_at: DateTime<Utc>,
) -> ProfileAttributes {
    let Some(old) = old else {
        return new;
    };

    let interests = union_interests(&old.interests, &new.interests);
    let weighted_keywords = union_weighted_keywords(&old.weighted_keywords, &new.weighted_keywords);
    let activity_level = old.activity_level.max(new.activity_level);
    let user_type = if new.user_type.is_empty() {
        old.user_type.clone()
    } else {
        new.user_type
    };

    let mut extra = old.extra.clone();
    extra.extend(new.extra);

    let mut merged = ProfileAttributes {
        interests,
        weighted_keywords,
        activity_level,
        user_type,
        updated_at: Some(merged_at),
        extra,
    };
    backfill_consistency(&mut merged);
    merged
}

/// Synthesise whichever of interests / weighted keywords is empty from the
/// other one.
pub fn backfill_consistency(attrs: &mut ProfileAttributes) {
    if attrs.weighted_keywords.is_empty() && !attrs.interests.is_empty() {
        attrs.weighted_keywords = attrs
            .interests
            .iter()
            .enumerate()
            .map(|(i, interest)| WeightedKeyword::new(interest.clone(), decayed_weight(i)))
            .collect();
    } else if attrs.interests.is_empty() && !attrs.weighted_keywords.is_empty() {
        attrs.interests = attrs
            .weighted_keywords
            .iter()
            .map(|wk| wk.keyword.clone())
            .collect();
    }
}

/// Collapse repeated keywords to their largest weight, clamp weights into
/// `[0, 1]` and sort descending.
pub fn normalize_keywords(attrs: &mut ProfileAttributes) {
    attrs.weighted_keywords = union_weighted_keywords(&[], &attrs.weighted_keywords);
}

/// Weight for the interest at `index`: 0.9 stepping down by 0.1, floored at 0.1.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn decayed_weight(index: usize) -> f64 {
    (0.9 - 0.1 * index as f64).max(0.1)
}

fn union_interests(old: &[String], new: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    old.iter()
        .chain(new)
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(s.as_str()))
        .cloned()
        .collect()
}

fn union_weighted_keywords(old: &[WeightedKeyword], new: &[WeightedKeyword]) -> Vec<WeightedKeyword> {
    let mut position: HashMap<&str, usize> = HashMap::new();
    let mut merged: Vec<WeightedKeyword> = Vec::new();

    for wk in old.iter().chain(new) {
        if wk.keyword.is_empty() {
            continue;
        }
        let weight = clamp_weight(wk.weight);
        match position.get(wk.keyword.as_str()) {
            Some(&idx) => {
                if weight > merged[idx].weight {
                    merged[idx].weight = weight;
                }
            }
            None => {
                position.insert(wk.keyword.as_str(), merged.len());
                merged.push(WeightedKeyword::new(wk.keyword.clone(), weight));
            }
        }
    }

    merged.sort_by(|a, b| b.weight.total_cmp(&a.weight));
    merged
}

fn clamp_weight(weight: f64) -> f64 {
    if weight.is_nan() {
        0.0
    } else {
        weight.clamp(0.0, 1.0)
    }
}
