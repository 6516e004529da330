//! Link routing: priority ordering, template filtering, and stop-on-match.
//!
//! Evaluation works like a firewall rule list: links are walked from the
//! highest priority down, and the first matching link flagged
//! `stop_on_match` suppresses every lower-priority link.

use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap};

use tracing::trace;

use crate::error::Result;
use crate::models::{Link, Note};
use crate::template::{CompiledTemplate, MatchResult};

/// A link whose template accepted a note.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedLink {
    pub link: Link,
    pub captures: MatchResult,
}

impl MatchedLink {
    /// Note tags plus this link's default tags and captured hashtags.
    pub fn augmented_tags(&self, note: &Note) -> BTreeSet<String> {
        let mut tags = note.tags.clone();
        tags.extend(self.link.default_tags.iter().cloned());
        tags.extend(self.captures.tags());
        tags
    }
}

/// Sort links by priority, highest first. Ties keep their input order.
pub fn sort_by_priority(links: &mut [Link]) {
    links.sort_by_key(|link| Reverse(link.priority));
}

/// Compiles each distinct template once per routing session.
#[derive(Debug, Default)]
pub struct TemplateCache {
    compiled: HashMap<String, CompiledTemplate>,
}

impl TemplateCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn get(&mut self, template: &str) -> Result<&CompiledTemplate> {
        if !self.compiled.contains_key(template) {
            let compiled = CompiledTemplate::compile(template)?;
            self.compiled.insert(template.to_string(), compiled);
        }
        Ok(&self.compiled[template])
    }

    /// Links whose template is absent or matches the note, order preserved.
    ///
    /// Matching runs against the raw content, before any tag augmentation.
    pub fn resolve_matching(&mut self, links: &[Link], note: &Note) -> Result<Vec<MatchedLink>> {
        let mut matched = Vec::new();
        for link in links {
            let captures = match link.template.as_deref() {
                None => Some(MatchResult::default()),
                Some(template) => self.get(template)?.matches(&note.content),
            };
            match captures {
                Some(captures) => matched.push(MatchedLink {
                    link: link.clone(),
                    captures,
                }),
                None => trace!(link_id = %link.id, "Template did not match"),
            }
        }
        Ok(matched)
    }

    /// `truncate_at_stop(resolve_matching(links, note))`.
    pub fn route(&mut self, links: &[Link], note: &Note) -> Result<Vec<MatchedLink>> {
        Ok(truncate_at_stop(self.resolve_matching(links, note)?))
    }
}

/// One-shot variant of [`TemplateCache::resolve_matching`].
pub fn resolve_matching(links: &[Link], note: &Note) -> Result<Vec<MatchedLink>> {
    TemplateCache::new().resolve_matching(links, note)
}

/// Keep the prefix up to and including the first `stop_on_match` link.
pub fn truncate_at_stop(mut matched: Vec<MatchedLink>) -> Vec<MatchedLink> {
    if let Some(pos) = matched
        .iter()
        .position(|m| m.link.settings.stop_on_match)
    {
        matched.truncate(pos + 1);
    }
    matched
}
