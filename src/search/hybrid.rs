//! Hybrid search: vector similarity first, graph relations after
//!
//! Vector hits and graph hits live on different scales (cosine vs. entity
//! match counts), so they are never compared with each other: each list is
//! ranked on its own and graph hits are appended after the vector hits.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

use super::vectordb::VectorStore;
use crate::error::Result;
use crate::graph::{EntityExtractor, GraphHit, GraphStore};

/// One fused search result
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HybridHit {
    pub document_id: String,
    pub namespace_id: String,
    pub score: f32,
    pub is_graph_result: bool,
}

impl HybridHit {
    fn from_graph(hit: GraphHit) -> Self {
        Self {
            document_id: hit.document_id,
            namespace_id: hit.namespace,
            score: hit.score,
            is_graph_result: true,
        }
    }
}

pub struct HybridSearch {
    vectors: Arc<VectorStore>,
    graph: Arc<GraphStore>,
    extractor: Arc<dyn EntityExtractor>,
}

impl HybridSearch {
    pub fn new(
        vectors: Arc<VectorStore>,
        graph: Arc<GraphStore>,
        extractor: Arc<dyn EntityExtractor>,
    ) -> Self {
        Self {
            vectors,
            graph,
            extractor,
        }
    }

    /// Search by meaning and by relationship, then fuse.
    ///
    /// Without a namespace every collection is searched and collections
    /// whose dimension cannot take `query_vector` are skipped. With one, a
    /// dimension mismatch is an error. An unavailable graph only removes the
    /// graph results.
    pub async fn search(
        &self,
        query_text: &str,
        query_vector: &[f32],
        namespace_filter: Option<&str>,
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<HybridHit>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let vector_hits = self.vector_hits(query_vector, namespace_filter, threshold, limit).await?;
        let graph_hits = self.graph_hits(query_text, query_vector, namespace_filter, threshold, limit).await;

        debug!(
            vector = vector_hits.len(),
            graph = graph_hits.len(),
            "Fusing hybrid results"
        );
        Ok(fuse_results(vector_hits, graph_hits, limit))
    }

    async fn vector_hits(
        &self,
        query_vector: &[f32],
        namespace_filter: Option<&str>,
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<HybridHit>> {
        let namespaces = match namespace_filter {
            Some(ns) => vec![ns.to_string()],
            None => self
                .vectors
                .list_collections()
                .await?
                .into_iter()
                .map(|c| c.name)
                .collect(),
        };

        let mut hits = Vec::new();
        for namespace in namespaces {
            let matches = match self
                .vectors
                .search_similar(&namespace, query_vector, limit, None, Some(threshold))
                .await
            {
                Ok(matches) => matches,
                Err(e) if e.is_dimension_mismatch() && namespace_filter.is_none() => {
                    warn!(collection = %namespace, error = %e, "Skipping collection");
                    continue;
                }
                Err(e) => return Err(e),
            };

            hits.extend(matches.into_iter().map(|m| HybridHit {
                document_id: m.document_id,
                namespace_id: namespace.clone(),
                score: m.similarity,
                is_graph_result: false,
            }));
        }
        Ok(hits)
    }

    async fn graph_hits(
        &self,
        query_text: &str,
        query_vector: &[f32],
        namespace_filter: Option<&str>,
        threshold: f32,
        limit: usize,
    ) -> Vec<HybridHit> {
        let entities = match self.extractor.extract_entities(query_text).await {
            Ok(entities) => entities,
            Err(e) => {
                warn!(error = %e, "Entity extraction failed for query");
                Vec::new()
            }
        };

        let hits = if entities.is_empty() {
            self.graph
                .find_similar_by_embedding(query_vector, namespace_filter, threshold, limit)
                .await
        } else {
            self.graph.find_by_query_entities(&entities, namespace_filter, limit).await
        };

        hits.into_iter().map(HybridHit::from_graph).collect()
    }
}

/// Merge vector and graph results.
///
/// Graph hits for documents already found by vector search are dropped, as
/// are repeated graph hits (highest score kept). Each list is sorted by
/// descending score, vector hits come first, and the whole is cut to `limit`.
pub fn fuse_results(
    mut vector: Vec<HybridHit>,
    graph: Vec<HybridHit>,
    limit: usize,
) -> Vec<HybridHit> {
    let seen: HashSet<&str> = vector.iter().map(|h| h.document_id.as_str()).collect();

    let mut best: HashMap<String, HybridHit> = HashMap::new();
    for hit in graph {
        if seen.contains(hit.document_id.as_str()) {
            continue;
        }
        match best.get(&hit.document_id) {
            Some(existing) if existing.score >= hit.score => {}
            _ => {
                best.insert(hit.document_id.clone(), hit);
            }
        }
    }
    let mut graph: Vec<HybridHit> = best.into_values().collect();

    let by_score = |a: &HybridHit, b: &HybridHit| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.document_id.cmp(&b.document_id))
    };
    vector.sort_by(by_score);
    graph.sort_by(by_score);

    vector.extend(graph);
    vector.truncate(limit);
    vector
}
