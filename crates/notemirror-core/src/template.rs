//! Link template matching.
//!
//! A template is literal text with named placeholders:
//!
//! | Syntax | Matches |
//! |--------|---------|
//! | `{name}` / `{name:text}` | one or more characters on a single line |
//! | `{name:word}` | one or more non-whitespace characters |
//! | `{name:tag}` | a hashtag; the captured value omits the `#` |
//! | `{name:number}` | an optionally signed integer or decimal |
//! | `{{` / `}}` | a literal brace |
//!
//! Literal text is matched case-insensitively, any whitespace run in the
//! template matches one or more whitespace characters, and the template may
//! match anywhere in the content.

use std::collections::BTreeMap;

use regex::Regex;

use crate::error::{Error, Result};
use crate::tags::HASHTAG_NAME;

/// Captures exposed by a successful match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchResult {
    pub captures: BTreeMap<String, String>,
    tag_captures: Vec<String>,
}

impl MatchResult {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.captures.get(name).map(String::as_str)
    }

    /// Values of `tag` placeholders, lowercased.
    pub fn tags(&self) -> Vec<String> {
        self.tag_captures
            .iter()
            .filter_map(|name| self.captures.get(name))
            .map(|value| value.to_lowercase())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlaceholderKind {
    Text,
    Word,
    Tag,
    Number,
}

impl PlaceholderKind {
    fn parse(kind: &str, template: &str) -> Result<Self> {
        match kind {
            "" | "text" => Ok(Self::Text),
            "word" => Ok(Self::Word),
            "tag" => Ok(Self::Tag),
            "number" => Ok(Self::Number),
            other => Err(Error::Template(format!(
                "unknown placeholder kind '{}' in '{}'",
                other, template
            ))),
        }
    }

    fn pattern(&self, name: &str) -> String {
        match self {
            Self::Text => format!("(?P<{}>[^\\n]+)", name),
            Self::Word => format!("(?P<{}>\\S+)", name),
            Self::Tag => format!("#(?P<{}>{})", name, HASHTAG_NAME),
            Self::Number => format!("(?P<{}>[-+]?\\d+(?:[.,]\\d+)?)", name),
        }
    }
}

/// A template compiled once and matched against many notes.
#[derive(Debug, Clone)]
pub struct CompiledTemplate {
    source: String,
    regex: Option<Regex>,
    names: Vec<String>,
    tag_names: Vec<String>,
}

impl CompiledTemplate {
    /// Compile a template. Malformed templates are an error.
    pub fn compile(template: &str) -> Result<Self> {
        let mut pattern = String::from("(?i)");
        let mut literal = String::new();
        let mut names: Vec<String> = Vec::new();
        let mut tag_names = Vec::new();
        let mut chars = template.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    flush_literal(&mut pattern, &mut literal);
                    let mut body = String::new();
                    let mut closed = false;
                    for inner in chars.by_ref() {
                        if inner == '}' {
                            closed = true;
                            break;
                        }
                        body.push(inner);
                    }
                    if !closed {
                        return Err(Error::Template(format!(
                            "unclosed placeholder in '{}'",
                            template
                        )));
                    }
                    let (name, kind) = match body.split_once(':') {
                        Some((name, kind)) => (name.trim(), kind.trim()),
                        None => (body.trim(), ""),
                    };
                    validate_name(name, template)?;
                    if names.iter().any(|n| n == name) {
                        return Err(Error::Template(format!(
                            "duplicate placeholder '{}' in '{}'",
                            name, template
                        )));
                    }
                    let kind = PlaceholderKind::parse(kind, template)?;
                    pattern.push_str(&kind.pattern(name));
                    if kind == PlaceholderKind::Tag {
                        tag_names.push(name.to_string());
                    }
                    names.push(name.to_string());
                }
                '}' => {
                    return Err(Error::Template(format!(
                        "unmatched '}}' in '{}'",
                        template
                    )));
                }
                other => literal.push(other),
            }
        }
        flush_literal(&mut pattern, &mut literal);

        // A blank template routes everything
        let regex = if template.trim().is_empty() {
            None
        } else {
            Some(
                Regex::new(&pattern)
                    .map_err(|e| Error::Template(format!("'{}': {}", template, e)))?,
            )
        };

        Ok(Self {
            source: template.to_string(),
            regex,
            names,
            tag_names,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Match raw note content. `None` means the template does not match.
    pub fn matches(&self, content: &str) -> Option<MatchResult> {
        let Some(regex) = &self.regex else {
            return Some(MatchResult::default());
        };
        let caps = regex.captures(content)?;
        let captures = self
            .names
            .iter()
            .filter_map(|name| {
                caps.name(name)
                    .map(|m| (name.clone(), m.as_str().trim().to_string()))
            })
            .collect();
        Some(MatchResult {
            captures,
            tag_captures: self.tag_names.clone(),
        })
    }
}

fn flush_literal(pattern: &mut String, literal: &mut String) {
    if literal.is_empty() {
        return;
    }
    let mut in_space = false;
    for c in literal.chars() {
        if c.is_whitespace() {
            if !in_space {
                pattern.push_str("\\s+");
                in_space = true;
            }
        } else {
            in_space = false;
            pattern.push_str(&regex::escape(c.encode_utf8(&mut [0u8; 4])));
        }
    }
    literal.clear();
}

fn validate_name(name: &str, template: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);
    if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(Error::Template(format!(
            "invalid placeholder name '{}' in '{}'",
            name, template
        )));
    }
    Ok(())
}

/// Match `content` against `template` in one step.
pub fn match_template(content: &str, template: &str) -> Result<Option<MatchResult>> {
    Ok(CompiledTemplate::compile(template)?.matches(content))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_template_matches_anywhere() {
        let result = match_template("Buy milk #errand", "#errand").unwrap();
        assert!(result.is_some());
        assert!(result.unwrap().captures.is_empty());
    }

    #[test]
    fn test_literal_is_case_insensitive() {
        assert!(match_template("URGENT: call mom", "urgent:").unwrap().is_some());
    }

    #[test]
    fn test_non_matching_returns_none() {
        assert!(match_template("Buy milk", "#work").unwrap().is_none());
    }

    #[test]
    fn test_text_capture() {
        let result = match_template("todo: fix the roof", "todo: {task}")
            .unwrap()
            .unwrap();
        assert_eq!(result.get("task"), Some("fix the roof"));
    }

    #[test]
    fn test_word_and_number_captures() {
        let result = match_template("pay 42.50 to alice", "pay {amount:number} to {who:word}")
            .unwrap()
            .unwrap();
        assert_eq!(result.get("amount"), Some("42.50"));
        assert_eq!(result.get("who"), Some("alice"));
    }

    #[test]
    fn test_tag_capture_strips_hash() {
        let result = match_template("Read this #Books later", "{topic:tag}")
            .unwrap()
            .unwrap();
        assert_eq!(result.get("topic"), Some("Books"));
        assert_eq!(result.tags(), vec!["books".to_string()]);
    }

    #[test]
    fn test_tag_capture_follows_hashtag_rules() {
        // Same names extract_hashtags accepts
        assert!(match_template("issue #2024", "issue {n:tag}").unwrap().is_none());
        assert!(match_template("see #-x", "see {n:tag}").unwrap().is_none());
        let result = match_template("#q3-goals", "{n:tag}").unwrap().unwrap();
        let extracted: Vec<String> = crate::tags::extract_hashtags("#q3-goals").into_iter().collect();
        assert_eq!(result.tags(), extracted);
    }

    #[test]
    fn test_whitespace_in_template_is_flexible() {
        assert!(match_template("idea:\n   rust", "idea: rust").unwrap().is_some());
    }

    #[test]
    fn test_escaped_braces_are_literal() {
        assert!(match_template("set {x}", "set {{x}}").unwrap().is_some());
        assert!(match_template("set x", "set {{x}}").unwrap().is_none());
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        assert!(match_template("cost (approx) $5", "(approx) $5").unwrap().is_some());
        assert!(match_template("cost approx 5", "(approx) $5").unwrap().is_none());
    }

    #[test]
    fn test_blank_template_matches_everything() {
        assert!(match_template("anything", "  ").unwrap().is_some());
        assert!(match_template("", "").unwrap().is_some());
    }

    #[test]
    fn test_unclosed_placeholder_is_error() {
        let err = match_template("x", "todo: {task").unwrap_err();
        assert!(matches!(err, Error::Template(_)));
    }

    #[test]
    fn test_unmatched_close_is_error() {
        assert!(match_template("x", "todo }").is_err());
    }

    #[test]
    fn test_unknown_kind_is_error() {
        assert!(match_template("x", "{a:date}").is_err());
    }

    #[test]
    fn test_invalid_and_duplicate_names_are_errors() {
        assert!(match_template("x", "{}").is_err());
        assert!(match_template("x", "{1abc}").is_err());
        assert!(match_template("x", "{a} {a}").is_err());
    }

    #[test]
    fn test_compiled_template_reused() {
        let compiled = CompiledTemplate::compile("#{project:word}").unwrap();
        assert_eq!(compiled.source(), "#{project:word}");
        assert_eq!(
            compiled.matches("fix #api").unwrap().get("project"),
            Some("api")
        );
        assert!(compiled.matches("fix api").is_none());
    }
}
