//! Text clean-up shared by the recommendation and inference paths.

use std::sync::LazyLock;

use regex::Regex;

static MARKDOWN_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#{2,6}\s*").expect("valid markdown header regex"));

const LABEL_PREFIXES: &[&str] = &["标题：", "内容：", "Title:", "Content:"];

const KEPT_PUNCTUATION: &[char] = &[
    '，', '。', '！', '？', '：', '；', '、', '（', '）', '【', '】', '《', '》', '—', ',', '.',
    '!', '?', ':', ';', '"', '\'', '(', ')', '[', ']', '{', '}', '<', '>', '-', '_', '+', '=',
    '/', '\\', '|', ' ', '\n', '\r', '\t',
];

fn is_cjk(c: char) -> bool {
    ('\u{4e00}'..='\u{9fa5}').contains(&c)
}

/// Drop emoji, control characters and decorative symbols, keeping letters,
/// digits, CJK ideographs and common punctuation.
#[must_use]
pub fn sanitize_text(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_ascii_alphanumeric() || is_cjk(*c) || KEPT_PUNCTUATION.contains(c))
        .collect()
}

/// Turn `## heading` lines and `标题：`-style labels into plain paragraphs and
/// drop blank lines.
#[must_use]
pub fn strip_markdown_headers(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            let line = MARKDOWN_HEADER.replace(line, "");
            let mut line = line.trim().to_string();
            for prefix in LABEL_PREFIXES {
                if let Some(rest) = line.strip_prefix(prefix) {
                    line = rest.trim().to_string();
                    break;
                }
            }
            line
        })
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Rough token estimate: two per CJK ideograph, one per latin word.
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    let cjk = text.chars().filter(|c| is_cjk(*c)).count();
    let words = text
        .split(|c: char| !c.is_ascii_alphabetic())
        .filter(|w| !w.is_empty())
        .count();
    cjk * 2 + words
}

/// Split on line boundaries into segments of at most `max_tokens` each.
///
/// A single line larger than the budget becomes its own segment.
#[must_use]
pub fn split_by_tokens(text: &str, max_tokens: usize) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut budget_used = 0;

    for line in text.lines() {
        let tokens = estimate_tokens(line);
        if budget_used + tokens > max_tokens && !current.is_empty() {
            segments.push(current.join("\n"));
            current.clear();
            budget_used = 0;
        }
        current.push(line);
        budget_used += tokens;
    }
    if !current.is_empty() {
        segments.push(current.join("\n"));
    }
    segments
}

/// Slice the outermost `{...}` out of a model reply that may be wrapped in
/// prose or code fences.
#[must_use]
pub fn extract_json_object(reply: &str) -> Option<&str> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    (start < end).then(|| &reply[start..=end])
}
