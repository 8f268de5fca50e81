//! Incremental indexing: what changed, what to write, and short-lived caches

pub mod cache;
pub mod coordinator;

pub use cache::TtlCache;
pub use coordinator::{EmbeddingIndex, IndexCoordinator, IndexOutcome, IndexingPlan};
