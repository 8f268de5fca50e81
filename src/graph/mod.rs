//! Knowledge graph: Document and Entity nodes with typed relationships

pub mod extract;
pub mod schema;
pub mod store;
pub mod types;

pub use extract::{EntityExtractor, RuleBasedExtractor};
pub use store::{GraphStore, DEFAULT_CONFIDENCE_FLOOR};
pub use types::{
    DocumentMetadata, EntityKind, EntityNode, ExtractedEntity, GraphHit, GraphStats, Relationship,
};
