//! Entity extraction seam and a rule-based extractor over Markdown notes

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;

use super::types::{EntityKind, ExtractedEntity};
use crate::core::frontmatter::Frontmatter;
use crate::core::wikilink::extract_wikilinks;
use crate::error::Result;

/// External collaborator that finds entities in text
#[async_trait]
pub trait EntityExtractor: Send + Sync {
    async fn extract_entities(&self, text: &str) -> Result<Vec<ExtractedEntity>>;
}

lazy_static! {
    static ref BACKTICK_RE: Regex = Regex::new(r"`([^`\n]{2,40})`").unwrap();
    static ref HASHTAG_RE: Regex = Regex::new(r"(?:^|\s)#([\p{L}\p{N}][\p{L}\p{N}_/-]*)").unwrap();
}

const SNIPPET_CHARS: usize = 160;

/// Entities from explicit note markup:
///
/// - `[[wikilinks]]` → [`EntityKind::Concept`]
/// - frontmatter tags and inline `#hashtags` → [`EntityKind::Topic`]
/// - inline `code` spans → [`EntityKind::Technology`]
#[derive(Debug, Clone, Default)]
pub struct RuleBasedExtractor;

impl RuleBasedExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn extract(&self, text: &str) -> Vec<ExtractedEntity> {
        let (frontmatter, body) = Frontmatter::split(text);
        let mut found = Found::default();

        for target in extract_wikilinks(body) {
            // [[Folder/Page]] names the page
            let name = target.rsplit('/').next().unwrap_or(&target).trim_end_matches(".md");
            found.add(EntityKind::Concept, name, 0.8, body);
        }

        for tag in frontmatter.map(|f| f.tags).unwrap_or_default() {
            found.add(EntityKind::Topic, &tag, 0.9, body);
        }
        for caps in HASHTAG_RE.captures_iter(body) {
            found.add(EntityKind::Topic, &caps[1], 0.7, body);
        }

        for caps in BACKTICK_RE.captures_iter(body) {
            found.add(EntityKind::Technology, caps[1].trim(), 0.6, body);
        }

        found.entities
    }
}

#[async_trait]
impl EntityExtractor for RuleBasedExtractor {
    async fn extract_entities(&self, text: &str) -> Result<Vec<ExtractedEntity>> {
        Ok(self.extract(text))
    }
}

/// Accumulator keyed by (kind, lowercase name); repeats bump the count
#[derive(Default)]
struct Found {
    index: HashMap<(EntityKind, String), usize>,
    entities: Vec<ExtractedEntity>,
}

impl Found {
    fn add(&mut self, kind: EntityKind, name: &str, confidence: f32, body: &str) {
        let name = name.trim();
        if name.chars().count() < 2 {
            return;
        }

        let key = (kind, name.to_lowercase());
        if let Some(&i) = self.index.get(&key) {
            let entity = &mut self.entities[i];
            entity.mentions += 1;
            entity.confidence = entity.confidence.max(confidence);
            return;
        }

        let mut entity = ExtractedEntity::new(kind, name, confidence);
        entity.snippets.extend(snippet(body, name));
        self.index.insert(key, self.entities.len());
        self.entities.push(entity);
    }
}

/// First line of `body` containing `needle`, clipped
fn snippet(body: &str, needle: &str) -> Option<String> {
    let line = body.lines().find(|l| l.contains(needle))?.trim();
    if line.is_empty() {
        return None;
    }
    Some(line.chars().take(SNIPPET_CHARS).collect())
}
