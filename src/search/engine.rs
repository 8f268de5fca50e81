//! Retrieval engine - owns the stores, the coordinator and the collaborators
//!
//! Constructed once at startup and shared by reference. Nothing is opened
//! until [`RetrievalEngine::initialize`] or the first operation.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::embedding::{EmbeddingProvider, HarmonicEmbedder};
use super::hybrid::{HybridHit, HybridSearch};
use super::vectordb::{CollectionInfo, SimilarityMatch, VectorStore};
use crate::config::EngineConfig;
use crate::core::docid::normalize_document_id;
use crate::core::note::{Note, VaultSource};
use crate::core::paths::VaultPaths;
use crate::core::source::{DocumentSource, SourceDocument};
use crate::error::{Error, Result};
use crate::graph::{DocumentMetadata, EntityExtractor, GraphStats, GraphStore, RuleBasedExtractor};
use crate::index::{EmbeddingIndex, IndexCoordinator, IndexOutcome, IndexingPlan};

const LAST_FULL_INDEX: &str = "last_full_index";

/// Indexing statistics
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexingStats {
    pub indexed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub duration_ms: u128,
}

/// Snapshot of both stores
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    pub collections: Vec<CollectionInfo>,
    pub graph_available: bool,
    pub graph: GraphStats,
    /// Unix seconds of the last namespace index run
    pub last_full_index: Option<i64>,
}

pub struct RetrievalEngine {
    config: EngineConfig,
    vectors: Arc<VectorStore>,
    graph: Arc<GraphStore>,
    coordinator: IndexCoordinator,
    hybrid: HybridSearch,
    embedder: Arc<dyn EmbeddingProvider>,
    extractor: Arc<dyn EntityExtractor>,
    source: Arc<dyn DocumentSource>,
}

impl RetrievalEngine {
    pub fn new(
        config: EngineConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        source: Arc<dyn DocumentSource>,
        extractor: Arc<dyn EntityExtractor>,
    ) -> Self {
        let vectors = Arc::new(VectorStore::open(
            config.vector.path.clone(),
            config.vector.dimension_tolerance,
        ));
        let graph = Arc::new(GraphStore::new(
            config.graph.connection.clone(),
            config.graph.entity_confidence_floor,
        ));
        let coordinator = IndexCoordinator::new(
            Arc::clone(&vectors) as Arc<dyn EmbeddingIndex>,
            Arc::clone(&source),
            &config.cache,
        );
        let hybrid = HybridSearch::new(Arc::clone(&vectors), Arc::clone(&graph), Arc::clone(&extractor));

        Self {
            config,
            vectors,
            graph,
            coordinator,
            hybrid,
            embedder,
            extractor,
            source,
        }
    }

    /// Engine over a Markdown vault with the built-in local collaborators
    pub fn for_vault(config: EngineConfig, paths: &VaultPaths) -> Self {
        let embedder = Arc::new(HarmonicEmbedder::new(config.embedding.dimension));
        let source = Arc::new(VaultSource::new(paths.root.clone(), config.notes_namespace.clone()));
        Self::new(config, embedder, source, Arc::new(RuleBasedExtractor::new()))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn vectors(&self) -> &VectorStore {
        &self.vectors
    }

    pub fn graph(&self) -> &GraphStore {
        &self.graph
    }

    /// Open the vector store and try the graph. An unreachable graph is not
    /// fatal; the engine runs vector-only until it comes back.
    pub async fn initialize(&self) -> Result<()> {
        self.vectors.initialize().await?;
        if !self.graph.is_available().await {
            warn!("Knowledge graph unavailable; continuing with vector search only");
        }
        info!("Retrieval engine initialized");
        Ok(())
    }

    pub async fn close(&self) {
        self.graph.disconnect().await;
        self.vectors.close().await;
        self.coordinator.invalidate_all();
    }

    /// Store an embedding directly, bypassing verification
    pub async fn store(
        &self,
        document_id: &str,
        collection: &str,
        vector: &[f32],
        metadata: Option<serde_json::Value>,
    ) -> Result<()> {
        let result = self.vectors.store_embedding(document_id, collection, vector, metadata).await;
        self.coordinator.invalidate(collection);
        result
    }

    /// Vector-only similarity search within one collection
    pub async fn search(
        &self,
        collection: &str,
        query: &[f32],
        limit: usize,
        id_filter: Option<&[String]>,
        threshold: Option<f32>,
    ) -> Result<Vec<SimilarityMatch>> {
        self.vectors.search_similar(collection, query, limit, id_filter, threshold).await
    }

    pub async fn delete_by_id(&self, document_id: &str, collection: &str) -> Result<bool> {
        self.coordinator.remove_item(document_id, collection).await
    }

    pub async fn delete_by_collection(&self, collection: &str) -> Result<usize> {
        let removed = self.vectors.clear_collection(collection).await;
        self.coordinator.invalidate(collection);
        removed
    }

    /// Indexed document IDs of a collection, sorted
    pub async fn get_all_ids(&self, collection: &str) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self
            .coordinator
            .get_indexed_ids(collection)
            .await?
            .iter()
            .cloned()
            .collect();
        ids.sort();
        Ok(ids)
    }

    pub async fn is_indexed(&self, document_id: &str, collection: &str) -> Result<bool> {
        Ok(self
            .coordinator
            .get_indexed_ids(collection)
            .await?
            .contains(&normalize_document_id(document_id)))
    }

    /// Fused vector + graph search
    pub async fn hybrid_search(
        &self,
        query_text: &str,
        query_vector: &[f32],
        namespace_filter: Option<&str>,
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<HybridHit>> {
        self.hybrid
            .search(query_text, query_vector, namespace_filter, threshold, limit)
            .await
    }

    pub async fn get_notes_needing_indexing(&self, namespace: &str) -> Result<IndexingPlan> {
        self.coordinator.get_items_needing_indexing(namespace).await
    }

    /// Index a single document: embedding first, then its graph node and
    /// entities. Graph failures are logged and do not fail the call.
    pub async fn index_document(
        &self,
        doc: &SourceDocument,
        namespace: &str,
        force: bool,
    ) -> Result<IndexOutcome> {
        if !force && self.is_indexed(&doc.id, namespace).await? {
            self.repair_graph(doc, namespace).await;
            return Ok(IndexOutcome::AlreadyIndexed);
        }

        let (content, note) = self.read_note(doc).await?;
        let embedding = self.embedder.generate_embedding(&note.embedding_text()).await?;
        let metadata = serde_json::json!({
            "title": note.title,
            "path": doc.path,
            "hub": note.hub,
            "tags": note.tags,
        });

        let outcome = self
            .coordinator
            .index_item(&doc.id, namespace, &embedding, Some(metadata), force)
            .await?;
        if !outcome.wrote() && self.graph.has_document(&doc.id, namespace).await != Some(false) {
            return Ok(outcome);
        }

        self.write_graph(doc, namespace, &note, &content, Some(embedding)).await;
        Ok(outcome)
    }

    /// Current content of a document, bypassing the content cache
    async fn read_note(&self, doc: &SourceDocument) -> Result<(String, Note)> {
        self.coordinator.invalidate_content(&doc.path);
        let content = self.coordinator.get_content(&doc.path).await?;
        let note = Note::parse(&content, &doc.title);
        Ok((content, note))
    }

    /// Document node and entities; failures are logged
    async fn write_graph(
        &self,
        doc: &SourceDocument,
        namespace: &str,
        note: &Note,
        content: &str,
        embedding: Option<Vec<f32>>,
    ) {
        let node = DocumentMetadata {
            title: note.title.clone(),
            path: doc.path.clone(),
            namespace: namespace.to_string(),
            embedding,
        };
        if !self.graph.ensure_document_node(&doc.id, &node).await {
            return;
        }
        match self.extractor.extract_entities(content).await {
            Ok(entities) => {
                let stored = self.graph.index_entities(&doc.id, &entities).await;
                debug!(document_id = %doc.id, stored, "Graph updated");
            }
            Err(e) => warn!(document_id = %doc.id, error = %e, "Entity extraction failed"),
        }
    }

    /// Rebuild the graph side of an already embedded document whose node is
    /// missing, e.g. because the graph was down when it was first indexed
    async fn repair_graph(&self, doc: &SourceDocument, namespace: &str) {
        if self.graph.has_document(&doc.id, namespace).await != Some(false) {
            return;
        }

        let loaded = async {
            let (content, note) = self.read_note(doc).await?;
            let embedding = self.vectors.get_embedding(&doc.id, namespace).await?;
            Ok::<_, Error>((content, note, embedding))
        }
        .await;
        match loaded {
            Ok((content, note, embedding)) => {
                info!(document_id = %doc.id, namespace, "Restoring missing graph node");
                self.write_graph(doc, namespace, &note, &content, embedding).await;
            }
            Err(e) => warn!(document_id = %doc.id, error = %e, "Could not restore graph node"),
        }
    }

    /// Index every document of a namespace that needs it (all of them when
    /// forced). Items are processed one at a time; a failing item is counted
    /// and skipped.
    pub async fn index_namespace(&self, namespace: &str, force: bool) -> Result<IndexingStats> {
        let start = std::time::Instant::now();

        let (items, mut skipped) = if force {
            (self.source.list_documents(namespace).await?, 0)
        } else {
            let plan = self.get_notes_needing_indexing(namespace).await?;
            if self.graph.is_available().await {
                for doc in &plan.already_indexed {
                    self.repair_graph(doc, namespace).await;
                }
            }
            (plan.needs_indexing, plan.already_indexed.len())
        };

        let mut indexed = 0;
        let mut failed = 0;
        for doc in &items {
            match self.index_document(doc, namespace, force).await {
                Ok(IndexOutcome::AlreadyIndexed) => skipped += 1,
                Ok(IndexOutcome::Unverified) => failed += 1,
                Ok(_) => indexed += 1,
                Err(e) => {
                    warn!(document_id = %doc.id, error = %e, "Failed to index document");
                    failed += 1;
                }
            }
        }

        let duration_ms = start.elapsed().as_millis();

        // Update metadata
        self.vectors
            .set_meta(LAST_FULL_INDEX, &chrono::Utc::now().timestamp().to_string())
            .await?;

        info!(namespace, indexed, skipped, failed, duration_ms = duration_ms as u64, "Indexing finished");
        Ok(IndexingStats {
            indexed,
            skipped,
            failed,
            duration_ms,
        })
    }

    /// Remove a document from both stores. Returns whether either held it.
    pub async fn remove_document(&self, document_id: &str, namespace: &str) -> Result<bool> {
        let from_vectors = self.coordinator.remove_item(document_id, namespace).await?;
        let from_graph = self.graph.delete_document_and_orphans(document_id).await;
        Ok(from_vectors || from_graph)
    }

    /// Drop a namespace from both stores. Returns the vector records removed.
    pub async fn remove_namespace(&self, namespace: &str) -> Result<usize> {
        let removed = self.delete_by_collection(namespace).await?;
        self.graph.delete_namespace_documents(namespace).await;
        Ok(removed)
    }

    /// Similarity sweep with the configured threshold and fan-out
    pub async fn build_similarity(&self, namespace: &str) -> usize {
        self.build_similarity_with(
            namespace,
            self.config.graph.similarity_threshold,
            self.config.graph.similarity_per_document,
        )
        .await
    }

    pub async fn build_similarity_with(
        &self,
        namespace: &str,
        threshold: f32,
        per_document_limit: usize,
    ) -> usize {
        self.graph
            .build_similarity_relationships(&self.vectors, namespace, threshold, per_document_limit)
            .await
    }

    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embedder.generate_embedding(text).await
    }

    /// Raw content of a file or note (cached)
    pub async fn content(&self, item_ref: &str) -> Result<String> {
        self.coordinator.get_content(item_ref).await
    }

    pub async fn status(&self) -> Result<EngineStatus> {
        Ok(EngineStatus {
            collections: self.vectors.list_collections().await?,
            graph_available: self.graph.is_available().await,
            graph: self.graph.stats().await,
            last_full_index: self
                .vectors
                .get_meta(LAST_FULL_INDEX)
                .await?
                .and_then(|v| v.parse().ok()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GraphConnection;
    use crate::graph::EntityKind;
    use std::fs;
    use tempfile::TempDir;

    fn vault() -> (TempDir, RetrievalEngine) {
        vault_with(EngineConfig::in_memory())
    }

    fn vault_with(config: EngineConfig) -> (TempDir, RetrievalEngine) {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("Notes")).unwrap();
        fs::write(
            dir.path().join("Notes/gpu.md"),
            "---\ntitle: GPU memory\ntags: [hardware]\n---\nUnified memory lets the GPU and [[CPU]] share pages.",
        )
        .unwrap();
        fs::write(
            dir.path().join("Notes/cpu.md"),
            "---\ntitle: CPU caches\ntags: [hardware]\n---\nThe [[CPU]] keeps hot data close.",
        )
        .unwrap();
        fs::write(dir.path().join("Notes/pasta.md"), "Boil water, add salt, cook pasta.").unwrap();

        let paths = VaultPaths::from_root(dir.path().to_path_buf());
        let engine = RetrievalEngine::for_vault(config, &paths);
        (dir, engine)
    }

    #[tokio::test]
    async fn test_index_namespace_then_incremental() {
        let (_dir, engine) = vault();
        engine.initialize().await.unwrap();

        let stats = engine.index_namespace("notes", false).await.unwrap();
        assert_eq!((stats.indexed, stats.skipped, stats.failed), (3, 0, 0));

        let again = engine.index_namespace("notes", false).await.unwrap();
        assert_eq!((again.indexed, again.skipped), (0, 3));

        let forced = engine.index_namespace("notes", true).await.unwrap();
        assert_eq!(forced.indexed, 3);
        assert_eq!(engine.get_all_ids("notes").await.unwrap().len(), 3);

        let status = engine.status().await.unwrap();
        assert!(status.last_full_index.is_some());
        assert_eq!(status.graph.documents, 3);
    }

    #[tokio::test]
    async fn test_index_document_populates_graph() {
        let (_dir, engine) = vault();
        let doc = SourceDocument {
            id: "Notes/gpu.md".into(),
            path: "Notes/gpu.md".into(),
            title: "gpu".into(),
        };

        let outcome = engine.index_document(&doc, "notes", false).await.unwrap();
        assert_eq!(outcome, IndexOutcome::Indexed);
        assert!(engine.is_indexed("notes/Notes/gpu.md", "notes").await.unwrap());

        let cpu = engine.graph().find_entity(EntityKind::Concept, "cpu").await.unwrap();
        assert_eq!(cpu.mention_count, 1);
        assert!(engine.graph().find_entity(EntityKind::Topic, "hardware").await.is_some());

        let again = engine.index_document(&doc, "notes", false).await.unwrap();
        assert_eq!(again, IndexOutcome::AlreadyIndexed);
    }

    #[tokio::test]
    async fn test_hybrid_search_finds_related_notes() {
        let (_dir, engine) = vault();
        engine.index_namespace("notes", false).await.unwrap();

        let query = engine.embed_query("GPU memory").await.unwrap();
        let hits = engine.hybrid_search("GPU memory", &query, Some("notes"), 0.0, 5).await.unwrap();
        assert!(!hits.is_empty());
        assert_eq!(hits[0].document_id, "Notes/gpu.md");
        assert!(!hits[0].is_graph_result);

        // Entity query: notes linking [[CPU]] that vector search did not return
        let hits = engine
            .hybrid_search("[[CPU]]", &query, Some("notes"), 0.99, 5)
            .await
            .unwrap();
        assert!(hits.iter().any(|h| h.is_graph_result && h.document_id == "Notes/cpu.md"));
    }

    #[tokio::test]
    async fn test_remove_document_and_namespace() {
        let (_dir, engine) = vault();
        engine.index_namespace("notes", false).await.unwrap();

        assert!(engine.remove_document("Notes/gpu.md", "notes").await.unwrap());
        assert!(!engine.is_indexed("Notes/gpu.md", "notes").await.unwrap());
        // [[CPU]] is still linked from cpu.md
        assert!(engine.graph().find_entity(EntityKind::Concept, "CPU").await.is_some());

        let plan = engine.get_notes_needing_indexing("notes").await.unwrap();
        assert_eq!(plan.needs_indexing.len(), 1);
        assert_eq!(plan.total, 3);

        assert_eq!(engine.remove_namespace("notes").await.unwrap(), 2);
        assert!(engine.get_all_ids("notes").await.unwrap().is_empty());
        assert_eq!(engine.graph().stats().await.entities, 0);
    }

    #[tokio::test]
    async fn test_similarity_sweep_links_hardware_notes() {
        let (_dir, engine) = vault();
        engine.index_namespace("notes", false).await.unwrap();

        let processed = engine.build_similarity_with("notes", -1.0, 1).await;
        assert_eq!(processed, 3);
        assert_eq!(engine.graph().similar_documents("Notes/gpu.md", 5).await.len(), 1);
    }

    #[tokio::test]
    async fn test_rerun_restores_graph_after_outage() {
        let blocked = TempDir::new().unwrap();
        let blocker = blocked.path().join("file");
        fs::write(&blocker, "not a directory").unwrap();

        let mut config = EngineConfig::in_memory();
        config.graph.connection =
            GraphConnection::new(blocker.join("graph.db").to_string_lossy().to_string());
        let (_dir, engine) = vault_with(config);

        let first = engine.index_namespace("notes", false).await.unwrap();
        assert_eq!(first.indexed, 3);
        assert_eq!(engine.graph().stats().await.documents, 0);

        engine.graph().configure(GraphConnection::in_memory()).await.unwrap();
        let retry = engine.index_namespace("notes", false).await.unwrap();
        assert_eq!((retry.indexed, retry.skipped), (0, 3));

        assert_eq!(engine.graph().stats().await.documents, 3);
        let cpu = engine.graph().find_entity(EntityKind::Concept, "CPU").await.unwrap();
        assert_eq!(cpu.mention_count, 2);
        assert_eq!(engine.graph().similar_documents("Notes/gpu.md", 5).await.len(), 0);
        assert_eq!(engine.build_similarity_with("notes", -1.0, 1).await, 3);

        // Single-document path repairs as well
        engine.graph().configure(GraphConnection::in_memory()).await.unwrap();
        let doc = SourceDocument {
            id: "Notes/pasta.md".into(),
            path: "Notes/pasta.md".into(),
            title: "pasta".into(),
        };
        let outcome = engine.index_document(&doc, "notes", false).await.unwrap();
        assert_eq!(outcome, IndexOutcome::AlreadyIndexed);
        assert_eq!(engine.graph().stats().await.documents, 1);
    }
}
