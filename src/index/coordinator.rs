//! Indexing coordinator
//!
//! Decides what needs (re)indexing by diffing the authoritative document
//! listing against the vector index, and writes embeddings with a
//! verify-and-retry step so a lost write is noticed and repaired once.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, warn};

use super::cache::TtlCache;
use crate::config::CacheConfig;
use crate::core::docid::normalize_document_id;
use crate::core::source::{DocumentSource, SourceDocument};
use crate::error::Result;
use crate::search::vectordb::VectorStore;

/// The slice of the vector store the coordinator writes through
#[async_trait]
pub trait EmbeddingIndex: Send + Sync {
    async fn store(
        &self,
        document_id: &str,
        collection: &str,
        vector: &[f32],
        metadata: Option<serde_json::Value>,
    ) -> Result<()>;

    async fn delete(&self, document_id: &str, collection: &str) -> Result<bool>;

    async fn document_ids(&self, collection: &str) -> Result<Vec<String>>;
}

#[async_trait]
impl EmbeddingIndex for VectorStore {
    async fn store(
        &self,
        document_id: &str,
        collection: &str,
        vector: &[f32],
        metadata: Option<serde_json::Value>,
    ) -> Result<()> {
        self.store_embedding(document_id, collection, vector, metadata).await
    }

    async fn delete(&self, document_id: &str, collection: &str) -> Result<bool> {
        self.delete_embedding(document_id, collection).await
    }

    async fn document_ids(&self, collection: &str) -> Result<Vec<String>> {
        self.get_all_document_ids(collection).await
    }
}

/// Split of a namespace's documents by index state, in listing order
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexingPlan {
    pub already_indexed: Vec<SourceDocument>,
    pub needs_indexing: Vec<SourceDocument>,
    pub total: usize,
}

/// Result of [`IndexCoordinator::index_item`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexOutcome {
    /// Present already and not forced; nothing written
    AlreadyIndexed,
    Indexed,
    /// First write was not visible; a forced rewrite was
    IndexedAfterRetry,
    /// Not visible even after the retry
    Unverified,
}

impl IndexOutcome {
    pub fn wrote(&self) -> bool {
        !matches!(self, IndexOutcome::AlreadyIndexed)
    }
}

pub struct IndexCoordinator {
    index: Arc<dyn EmbeddingIndex>,
    source: Arc<dyn DocumentSource>,
    indexed_ids: TtlCache<String, Arc<HashSet<String>>>,
    content: TtlCache<String, String>,
}

impl IndexCoordinator {
    pub fn new(
        index: Arc<dyn EmbeddingIndex>,
        source: Arc<dyn DocumentSource>,
        cache: &CacheConfig,
    ) -> Self {
        Self {
            index,
            source,
            indexed_ids: TtlCache::new(cache.indexed_ids_ttl()),
            content: TtlCache::with_capacity(cache.content_ttl(), cache.content_capacity),
        }
    }

    /// Normalized IDs currently in the index for `namespace` (cached)
    pub async fn get_indexed_ids(&self, namespace: &str) -> Result<Arc<HashSet<String>>> {
        let key = namespace.to_string();
        if let Some(ids) = self.indexed_ids.get(&key) {
            return Ok(ids);
        }

        // A write that lands while we read must not be masked by our snapshot
        let seen = self.indexed_ids.generation(&key);
        let ids: HashSet<String> = self
            .index
            .document_ids(namespace)
            .await?
            .iter()
            .map(|id| normalize_document_id(id))
            .collect();
        let ids = Arc::new(ids);

        debug!(namespace, count = ids.len(), "Loaded indexed IDs");
        self.indexed_ids.set_if_current(key, Arc::clone(&ids), seen);
        Ok(ids)
    }

    /// Compare the authoritative listing with the index
    pub async fn get_items_needing_indexing(&self, namespace: &str) -> Result<IndexingPlan> {
        let documents = self.source.list_documents(namespace).await?;
        let indexed = self.get_indexed_ids(namespace).await?;

        let total = documents.len();
        let (already_indexed, needs_indexing): (Vec<_>, Vec<_>) = documents
            .into_iter()
            .partition(|doc| indexed.contains(&normalize_document_id(&doc.id)));

        Ok(IndexingPlan {
            already_indexed,
            needs_indexing,
            total,
        })
    }

    /// Write one embedding and confirm it is visible.
    ///
    /// Without `force_reindex` an already indexed document is left alone.
    /// A write that cannot be read back is retried once as a forced rewrite;
    /// errors from the index (dimension mismatch included) are returned as is.
    pub async fn index_item(
        &self,
        document_id: &str,
        namespace: &str,
        embedding: &[f32],
        metadata: Option<serde_json::Value>,
        force_reindex: bool,
    ) -> Result<IndexOutcome> {
        let id = normalize_document_id(document_id);

        if force_reindex {
            self.index.delete(&id, namespace).await?;
            self.invalidate(namespace);
        } else if self.get_indexed_ids(namespace).await?.contains(&id) {
            return Ok(IndexOutcome::AlreadyIndexed);
        }

        self.write(&id, namespace, embedding, metadata.clone()).await?;
        if self.verify(&id, namespace).await? {
            return Ok(IndexOutcome::Indexed);
        }

        warn!(document_id = %id, namespace, "Embedding not visible after write; retrying");
        self.index.delete(&id, namespace).await?;
        self.write(&id, namespace, embedding, metadata).await?;
        if self.verify(&id, namespace).await? {
            return Ok(IndexOutcome::IndexedAfterRetry);
        }

        error!(document_id = %id, namespace, "Embedding still missing after forced retry");
        Ok(IndexOutcome::Unverified)
    }

    async fn write(
        &self,
        id: &str,
        namespace: &str,
        embedding: &[f32],
        metadata: Option<serde_json::Value>,
    ) -> Result<()> {
        let result = self.index.store(id, namespace, embedding, metadata).await;
        self.invalidate(namespace);
        result
    }

    async fn verify(&self, id: &str, namespace: &str) -> Result<bool> {
        Ok(self.get_indexed_ids(namespace).await?.contains(id))
    }

    /// Remove a document's embedding. Returns whether one existed.
    pub async fn remove_item(&self, document_id: &str, namespace: &str) -> Result<bool> {
        let removed = self.index.delete(&normalize_document_id(document_id), namespace).await;
        self.invalidate(namespace);
        removed
    }

    pub fn invalidate(&self, namespace: &str) {
        self.indexed_ids.invalidate(&namespace.to_string());
    }

    pub fn invalidate_all(&self) {
        self.indexed_ids.invalidate_all();
    }

    /// Raw content of a file or note, cached by reference
    pub async fn get_content(&self, item_ref: &str) -> Result<String> {
        let key = item_ref.to_string();
        if let Some(content) = self.content.get(&key) {
            return Ok(content);
        }

        let seen = self.content.generation(&key);
        let content = self.source.get_item_content(item_ref).await?;
        self.content.set_if_current(key, content.clone(), seen);
        Ok(content)
    }

    pub fn invalidate_content(&self, item_ref: &str) {
        self.content.invalidate(&item_ref.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Index that silently drops the first `drop_writes` stores
    #[derive(Default)]
    struct FakeIndex {
        ids: Mutex<HashMap<String, HashSet<String>>>,
        drop_writes: AtomicUsize,
        /// The first read returns its snapshot only after this long
        stall_first_read: Option<std::time::Duration>,
        reads: AtomicUsize,
        writes: AtomicUsize,
        deletes: AtomicUsize,
    }

    impl FakeIndex {
        fn with_ids(collection: &str, ids: &[&str]) -> Self {
            let index = Self::default();
            index.ids.lock().insert(
                collection.to_string(),
                ids.iter().map(|s| s.to_string()).collect(),
            );
            index
        }

        fn dropping(writes: usize) -> Self {
            let index = Self::default();
            index.drop_writes.store(writes, Ordering::SeqCst);
            index
        }
    }

    #[async_trait]
    impl EmbeddingIndex for FakeIndex {
        async fn store(
            &self,
            document_id: &str,
            collection: &str,
            _vector: &[f32],
            _metadata: Option<serde_json::Value>,
        ) -> Result<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            let dropped = self
                .drop_writes
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if !dropped {
                self.ids
                    .lock()
                    .entry(collection.to_string())
                    .or_default()
                    .insert(document_id.to_string());
            }
            Ok(())
        }

        async fn delete(&self, document_id: &str, collection: &str) -> Result<bool> {
            self.deletes.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .ids
                .lock()
                .get_mut(collection)
                .map(|ids| ids.remove(document_id))
                .unwrap_or(false))
        }

        async fn document_ids(&self, collection: &str) -> Result<Vec<String>> {
            let read = self.reads.fetch_add(1, Ordering::SeqCst);
            let snapshot: Vec<String> = self
                .ids
                .lock()
                .get(collection)
                .map(|ids| ids.iter().cloned().collect())
                .unwrap_or_default();
            if let Some(delay) = self.stall_first_read.filter(|_| read == 0) {
                tokio::time::sleep(delay).await;
            }
            Ok(snapshot)
        }
    }

    #[derive(Default)]
    struct FakeSource {
        documents: Vec<SourceDocument>,
        content_reads: AtomicUsize,
    }

    impl FakeSource {
        fn with(ids: &[&str]) -> Self {
            Self {
                documents: ids
                    .iter()
                    .map(|id| SourceDocument {
                        id: id.to_string(),
                        path: format!("{id}.md"),
                        title: id.to_string(),
                    })
                    .collect(),
                content_reads: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl DocumentSource for FakeSource {
        async fn list_documents(&self, _namespace: &str) -> Result<Vec<SourceDocument>> {
            Ok(self.documents.clone())
        }

        async fn get_item_content(&self, item_ref: &str) -> Result<String> {
            self.content_reads.fetch_add(1, Ordering::SeqCst);
            Ok(format!("content of {item_ref}"))
        }
    }

    fn coordinator(index: Arc<FakeIndex>, source: Arc<FakeSource>) -> IndexCoordinator {
        IndexCoordinator::new(index, source, &CacheConfig::default())
    }

    #[tokio::test]
    async fn test_indexed_ids_cached_until_invalidated() {
        let index = Arc::new(FakeIndex::with_ids("notes", &["notes/a"]));
        let coord = coordinator(Arc::clone(&index), Arc::new(FakeSource::default()));

        let first = coord.get_indexed_ids("notes").await.unwrap();
        let second = coord.get_indexed_ids("notes").await.unwrap();
        assert_eq!(index.reads.load(Ordering::SeqCst), 1);
        assert_eq!(first, second);
        assert!(first.contains("a"));

        coord.invalidate("notes");
        coord.get_indexed_ids("notes").await.unwrap();
        assert_eq!(index.reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_items_needing_indexing() {
        let index = Arc::new(FakeIndex::with_ids("notes", &["a"]));
        let source = Arc::new(FakeSource::with(&["notes/a", "b", "c"]));
        let coord = coordinator(index, source);

        let plan = coord.get_items_needing_indexing("notes").await.unwrap();
        let ids = |docs: &[SourceDocument]| docs.iter().map(|d| d.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&plan.needs_indexing), vec!["b", "c"]);
        assert_eq!(ids(&plan.already_indexed), vec!["notes/a"]);
        assert_eq!(plan.total, 3);
    }

    #[tokio::test]
    async fn test_index_item_skips_when_present() {
        let index = Arc::new(FakeIndex::with_ids("notes", &["a"]));
        let coord = coordinator(Arc::clone(&index), Arc::new(FakeSource::default()));

        let outcome = coord.index_item("notes/a", "notes", &[1.0], None, false).await.unwrap();
        assert_eq!(outcome, IndexOutcome::AlreadyIndexed);
        assert_eq!(index.writes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_index_item_writes_and_verifies() {
        let index = Arc::new(FakeIndex::default());
        let coord = coordinator(Arc::clone(&index), Arc::new(FakeSource::default()));

        // Warm the cache so the write must invalidate it
        assert!(coord.get_indexed_ids("notes").await.unwrap().is_empty());

        let outcome = coord.index_item("b", "notes", &[1.0], None, false).await.unwrap();
        assert_eq!(outcome, IndexOutcome::Indexed);
        assert_eq!(index.writes.load(Ordering::SeqCst), 1);
        assert!(coord.get_indexed_ids("notes").await.unwrap().contains("b"));
    }

    #[tokio::test]
    async fn test_lost_write_is_retried_once() {
        let index = Arc::new(FakeIndex::dropping(1));
        let coord = coordinator(Arc::clone(&index), Arc::new(FakeSource::default()));

        let outcome = coord.index_item("a", "notes", &[1.0], None, false).await.unwrap();
        assert_eq!(outcome, IndexOutcome::IndexedAfterRetry);
        assert_eq!(index.writes.load(Ordering::SeqCst), 2);
        assert_eq!(index.deletes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unverified_after_second_loss() {
        let index = Arc::new(FakeIndex::dropping(2));
        let coord = coordinator(Arc::clone(&index), Arc::new(FakeSource::default()));

        let outcome = coord.index_item("a", "notes", &[1.0], None, false).await.unwrap();
        assert_eq!(outcome, IndexOutcome::Unverified);
        assert_eq!(index.writes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_force_deletes_first() {
        let index = Arc::new(FakeIndex::with_ids("notes", &["a"]));
        let coord = coordinator(Arc::clone(&index), Arc::new(FakeSource::default()));

        let outcome = coord.index_item("a", "notes", &[1.0], None, true).await.unwrap();
        assert_eq!(outcome, IndexOutcome::Indexed);
        assert_eq!(index.deletes.load(Ordering::SeqCst), 1);
        assert_eq!(index.writes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_remove_item_invalidates() {
        let index = Arc::new(FakeIndex::with_ids("notes", &["a"]));
        let coord = coordinator(Arc::clone(&index), Arc::new(FakeSource::default()));

        assert!(coord.get_indexed_ids("notes").await.unwrap().contains("a"));
        assert!(coord.remove_item("a", "notes").await.unwrap());
        assert!(!coord.get_indexed_ids("notes").await.unwrap().contains("a"));
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_not_retried() {
        let store = Arc::new(VectorStore::in_memory());
        let coord = IndexCoordinator::new(
            Arc::clone(&store) as Arc<dyn EmbeddingIndex>,
            Arc::new(FakeSource::default()),
            &CacheConfig::default(),
        );

        coord.index_item("a", "notes", &[1.0, 0.0], None, false).await.unwrap();
        let err = coord
            .index_item("b", "notes", &vec![1.0; 200], None, false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 2, actual: 200, .. }));
        assert_eq!(store.get_all_document_ids("notes").await.unwrap(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_slow_read_does_not_mask_concurrent_write() {
        let index = Arc::new(FakeIndex {
            stall_first_read: Some(std::time::Duration::from_millis(100)),
            ..FakeIndex::default()
        });
        let coord = coordinator(Arc::clone(&index), Arc::new(FakeSource::default()));

        let (stale, outcome) = tokio::join!(coord.get_indexed_ids("notes"), async {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            coord.index_item("b", "notes", &[1.0], None, false).await
        });
        // The slow read began before the write and saw nothing
        assert!(stale.unwrap().is_empty());
        assert_eq!(outcome.unwrap(), IndexOutcome::Indexed);

        assert!(coord.get_indexed_ids("notes").await.unwrap().contains("b"));
    }

    #[tokio::test]
    async fn test_content_is_cached() {
        let source = Arc::new(FakeSource::default());
        let coord = coordinator(Arc::new(FakeIndex::default()), Arc::clone(&source));

        assert_eq!(coord.get_content("Notes/a.md").await.unwrap(), "content of Notes/a.md");
        coord.get_content("Notes/a.md").await.unwrap();
        assert_eq!(source.content_reads.load(Ordering::SeqCst), 1);

        coord.invalidate_content("Notes/a.md");
        coord.get_content("Notes/a.md").await.unwrap();
        assert_eq!(source.content_reads.load(Ordering::SeqCst), 2);
    }
}
