//! Deduplication and ranking of recommendation candidates.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use recpush_core::{RecommendationItem, RecommendationSource};

use crate::ports::KnowledgeSearch;

fn score_desc(a: &RecommendationItem, b: &RecommendationItem) -> Ordering {
    match (a.score, b.score) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Merge candidate lists from two sources.
///
/// Items are keyed by `(source, reference_id, title)`; a repeated key keeps
/// the higher-scoring entry. The result is sorted by score descending (items
/// without a score last) and truncated to `top_n` unless `top_n` is zero.
#[must_use]
pub fn aggregate(
    list_a: Vec<RecommendationItem>,
    list_b: Vec<RecommendationItem>,
    top_n: usize,
) -> Vec<RecommendationItem> {
    let mut index: HashMap<(RecommendationSource, String, String), usize> = HashMap::new();
    let mut merged: Vec<RecommendationItem> = Vec::new();

    for item in list_a.into_iter().chain(list_b) {
        let key = (
            item.source,
            item.reference_id.clone().unwrap_or_default(),
            item.title.clone(),
        );
        match index.get(&key) {
            Some(&idx) => {
                if score_desc(&item, &merged[idx]) == Ordering::Less {
                    merged[idx] = item;
                }
            }
            None => {
                index.insert(key, merged.len());
                merged.push(item);
            }
        }
    }

    merged.sort_by(score_desc);
    if top_n > 0 {
        merged.truncate(top_n);
    }
    merged
}

/// Accumulate knowledge-base results keyword by keyword until `top_k` items
/// are collected.
///
/// Keywords are searched in the given order; blank and repeated keywords are
/// skipped. Items already seen under the same `(reference_id, title)` are
/// dropped. A failed search only loses that keyword.
pub async fn search_by_keywords(
    search: &dyn KnowledgeSearch,
    keywords: &[String],
    top_k: usize,
) -> Vec<RecommendationItem> {
    let mut processed: HashSet<&str> = HashSet::new();
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut results: Vec<RecommendationItem> = Vec::new();

    for keyword in keywords {
        let keyword = keyword.trim();
        if keyword.is_empty() || !processed.insert(keyword) {
            continue;
        }

        let items = match search.search_knowledge_base(keyword, top_k).await {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!(keyword, error = %e, "aggregate: knowledge base search failed, skipping keyword");
                continue;
            }
        };

        for mut item in items {
            let key = (
                item.reference_id.clone().unwrap_or_default(),
                item.title.clone(),
            );
            if !seen.insert(key) {
                continue;
            }
            item.source = RecommendationSource::KnowledgeBase;
            item.search_keyword = Some(keyword.to_string());
            results.push(item);
        }

        if results.len() >= top_k {
            break;
        }
    }

    results.truncate(top_k);
    results
}
