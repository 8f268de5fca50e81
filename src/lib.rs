//! noteweave library
//!
//! Local-first knowledge retrieval for a Markdown vault: vector search,
//! a document/entity graph, and the fusion of both.
//!
//! # Modules
//!
//! - `core`: Vault access (paths, notes, frontmatter, wikilinks, document IDs)
//! - `search`: Vector store, embeddings, hybrid search and the engine facade
//! - `graph`: Knowledge graph store and entity extraction
//! - `index`: Incremental indexing coordinator and TTL caches

pub mod config;
pub mod core;
pub mod db;
pub mod error;
pub mod graph;
pub mod index;
pub mod search;

// Re-exports for convenience
pub use config::{EngineConfig, GraphConnection};
pub use core::docid::normalize_document_id;
pub use core::frontmatter::Frontmatter;
pub use core::note::{Note, VaultSource};
pub use core::paths::VaultPaths;
pub use core::source::{DocumentSource, SourceDocument};
pub use core::wikilink::extract_wikilinks;
pub use error::{Error, Result};
pub use graph::{EntityExtractor, EntityKind, ExtractedEntity, GraphStore};
pub use index::{IndexCoordinator, IndexOutcome, IndexingPlan};
pub use search::{HybridHit, RetrievalEngine, VectorStore};
