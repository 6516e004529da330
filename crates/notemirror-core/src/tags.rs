//! Inline hashtag handling shared by adapters that keep tags in note text.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;

/// A hashtag name: a letter, then letters, digits, `_` or `-`.
pub(crate) const HASHTAG_NAME: &str = r"\p{L}[\p{L}\p{N}_-]*";

static HASHTAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?:^|[^\p{{L}}\p{{N}}_/#-])#({})", HASHTAG_NAME))
        .expect("valid hashtag regex")
});

static URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://\S+").expect("valid url regex"));

static INLINE_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`[^`]+`").expect("valid code regex"));

/// Extract inline hashtags from note text.
///
/// Returns lowercase, deduplicated tag names. Tags must start with a
/// letter; URL fragments and inline code are ignored.
pub fn extract_hashtags(content: &str) -> BTreeSet<String> {
    let without_code = INLINE_CODE.replace_all(content, " ");
    let cleaned = URL.replace_all(&without_code, " ");
    HASHTAG
        .captures_iter(&cleaned)
        .filter_map(|cap| cap.get(1))
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// Normalize a user-supplied tag: trimmed, leading `#` removed, lowercase.
pub fn normalize_tag(tag: &str) -> Option<String> {
    let tag = tag.trim().trim_start_matches('#').trim();
    if tag.is_empty() {
        None
    } else {
        Some(tag.replace(char::is_whitespace, "_").to_lowercase())
    }
}

/// Append `#tag` for every tag not already present inline.
pub fn render_with_tags<'a, I>(content: &str, tags: I) -> String
where
    I: IntoIterator<Item = &'a String>,
{
    let present = extract_hashtags(content);
    let missing: Vec<String> = tags
        .into_iter()
        .filter_map(|tag| normalize_tag(tag))
        .filter(|tag| !present.contains(tag))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(|tag| format!("#{}", tag))
        .collect();

    let content = content.trim_end();
    if missing.is_empty() {
        content.to_string()
    } else if content.is_empty() {
        missing.join(" ")
    } else {
        format!("{} {}", content, missing.join(" "))
    }
}
