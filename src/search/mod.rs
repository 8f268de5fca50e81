//! Semantic and hybrid search
//!
//! Vector similarity over per-namespace collections, fused with
//! relationship hits from the knowledge graph.

pub mod embedding;
pub mod engine;
pub mod hybrid;
pub mod similarity;
pub mod vectordb;

pub use embedding::{EmbeddingProvider, HarmonicEmbedder};
pub use engine::{EngineStatus, IndexingStats, RetrievalEngine};
pub use hybrid::{fuse_results, HybridHit, HybridSearch};
pub use similarity::{cosine_similarity, reconcile_dimension};
pub use vectordb::{CollectionInfo, SimilarityMatch, VectorStore};
