//! Knowledge graph value types

use serde::{Deserialize, Serialize};

/// Category of an extracted entity.
///
/// Closed set: labels outside it map to [`EntityKind::Other`] so that no
/// caller text ever reaches a statement as an identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Person,
    Organization,
    Location,
    Event,
    Concept,
    Technology,
    Topic,
    Other,
}

impl EntityKind {
    pub const ALL: [EntityKind; 8] = [
        EntityKind::Person,
        EntityKind::Organization,
        EntityKind::Location,
        EntityKind::Event,
        EntityKind::Concept,
        EntityKind::Technology,
        EntityKind::Topic,
        EntityKind::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Person => "person",
            EntityKind::Organization => "organization",
            EntityKind::Location => "location",
            EntityKind::Event => "event",
            EntityKind::Concept => "concept",
            EntityKind::Technology => "technology",
            EntityKind::Topic => "topic",
            EntityKind::Other => "other",
        }
    }

    /// Map an extractor label (any case, a few common aliases) to a kind
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "person" | "people" => EntityKind::Person,
            "organization" | "organisation" | "org" | "company" => EntityKind::Organization,
            "location" | "place" => EntityKind::Location,
            "event" => EntityKind::Event,
            "concept" => EntityKind::Concept,
            "technology" | "tech" | "tool" => EntityKind::Technology,
            "topic" | "tag" => EntityKind::Topic,
            _ => EntityKind::Other,
        }
    }

    /// Relationship type used from a Document to an entity of this kind
    pub fn relationship(&self) -> Relationship {
        match self {
            EntityKind::Person
            | EntityKind::Organization
            | EntityKind::Location
            | EntityKind::Event => Relationship::Mentions,
            _ => Relationship::ContainsEntity,
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed Document → Entity relationship
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Relationship {
    Mentions,
    ContainsEntity,
}

impl Relationship {
    pub fn as_str(&self) -> &'static str {
        match self {
            Relationship::Mentions => "MENTIONS",
            Relationship::ContainsEntity => "CONTAINS_ENTITY",
        }
    }
}

/// Entity as produced by an [`EntityExtractor`](super::EntityExtractor)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedEntity {
    pub name: String,
    pub kind: EntityKind,
    pub confidence: f32,
    #[serde(default)]
    pub description: Option<String>,
    /// Short source excerpts around the mention
    #[serde(default)]
    pub snippets: Vec<String>,
    /// Occurrences in the document
    #[serde(default = "default_mentions")]
    pub mentions: u32,
}

fn default_mentions() -> u32 {
    1
}

impl ExtractedEntity {
    pub fn new(kind: EntityKind, name: impl Into<String>, confidence: f32) -> Self {
        Self {
            name: name.into(),
            kind,
            confidence,
            description: None,
            snippets: Vec::new(),
            mentions: 1,
        }
    }
}

/// Attributes written on a Document node
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentMetadata {
    pub title: String,
    pub path: String,
    pub namespace: String,
    /// `None` keeps whatever embedding the node already has
    pub embedding: Option<Vec<f32>>,
}

/// Stored Entity node
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityNode {
    pub kind: EntityKind,
    pub name: String,
    pub description: Option<String>,
    pub confidence: f32,
    /// Sum of the mention counts on every relationship to this entity
    pub mention_count: u64,
    pub snippets: Vec<String>,
}

/// A document found through the graph
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphHit {
    pub document_id: String,
    pub namespace: String,
    pub score: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    pub documents: usize,
    pub entities: usize,
    pub relationships: usize,
    pub similarities: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_mapping() {
        assert_eq!(EntityKind::from_label("PERSON"), EntityKind::Person);
        assert_eq!(EntityKind::from_label("org"), EntityKind::Organization);
        assert_eq!(EntityKind::from_label("Person); DROP TABLE"), EntityKind::Other);
        for kind in EntityKind::ALL {
            assert_eq!(EntityKind::from_label(kind.as_str()), kind);
        }
    }

    #[test]
    fn test_relationship_by_kind() {
        assert_eq!(EntityKind::Person.relationship(), Relationship::Mentions);
        assert_eq!(EntityKind::Event.relationship(), Relationship::Mentions);
        assert_eq!(EntityKind::Concept.relationship(), Relationship::ContainsEntity);
        assert_eq!(EntityKind::Other.relationship().as_str(), "CONTAINS_ENTITY");
    }
}
