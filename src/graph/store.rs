//! Knowledge graph store
//!
//! Document and Entity nodes with typed relationships, kept in an embedded
//! SQLite database. The graph is an enrichment: when it cannot be reached,
//! operations log and return `false`, empty or `0` instead of failing the
//! caller. Only [`GraphStore::configure`] surfaces connection errors.

use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::collections::BTreeSet;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::schema::apply_migrations;
use super::types::{
    DocumentMetadata, EntityKind, EntityNode, ExtractedEntity, GraphHit, GraphStats,
};
use crate::config::GraphConnection;
use crate::core::docid::normalize_document_id;
use crate::db::{describe_open_failure, SqlitePool};
use crate::error::{Error, Result};
use crate::search::similarity::cosine_similarity;
use crate::search::vectordb::{blob_to_embedding, embedding_to_blob, VectorStore};

/// Entities extracted below this confidence are not stored
pub const DEFAULT_CONFIDENCE_FLOOR: f32 = 0.5;

/// Source excerpts kept per entity
const MAX_SNIPPETS: usize = 5;

pub struct GraphStore {
    connection: parking_lot::Mutex<GraphConnection>,
    pool: Mutex<Option<SqlitePool>>,
    confidence_floor: f32,
}

impl GraphStore {
    /// Store for `connection`; nothing is opened until first use
    pub fn new(connection: GraphConnection, confidence_floor: f32) -> Self {
        Self {
            connection: parking_lot::Mutex::new(connection),
            pool: Mutex::new(None),
            confidence_floor,
        }
    }

    /// In-memory graph (for testing)
    pub fn in_memory() -> Self {
        Self::new(GraphConnection::in_memory(), DEFAULT_CONFIDENCE_FLOOR)
    }

    async fn open_pool(connection: &GraphConnection) -> Result<SqlitePool> {
        let path = connection.database_path()?;
        tokio::task::spawn_blocking(move || {
            let pool = SqlitePool::open(&path)
                .map_err(|e| Error::GraphUnavailable(describe_open_failure(&path, &e)))?;
            pool.with_connection(|conn| {
                conn.query_row("SELECT 1", [], |_| Ok(()))?;
                apply_migrations(conn)
            })?;
            Ok(pool)
        })
        .await?
    }

    /// Shared connection, opened on first use.
    ///
    /// Concurrent first callers wait on the same lock and share the result;
    /// a failed attempt is retried by the next caller.
    async fn pool(&self) -> Option<SqlitePool> {
        let mut guard = self.pool.lock().await;
        if let Some(pool) = guard.as_ref() {
            return Some(pool.clone());
        }

        let connection = self.connection.lock().clone();
        match Self::open_pool(&connection).await {
            Ok(pool) => {
                info!(uri = %connection.uri, "Connected to knowledge graph");
                *guard = Some(pool.clone());
                Some(pool)
            }
            Err(e) => {
                warn!(uri = %connection.uri, error = %e, "Knowledge graph unavailable");
                None
            }
        }
    }

    /// Run `f` against the graph, degrading to `fallback` on any failure
    async fn with_graph<T, F>(&self, operation: &'static str, fallback: T, f: F) -> T
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let Some(pool) = self.pool().await else {
            return fallback;
        };
        match pool.run(f).await {
            Ok(value) => value,
            Err(e) => {
                warn!(operation, error = %e, "Graph operation failed");
                fallback
            }
        }
    }

    /// Whether the graph can currently be reached
    pub async fn is_available(&self) -> bool {
        self.pool().await.is_some()
    }

    /// Switch to a new connection, verifying it first.
    ///
    /// On failure the previous connection stays in place.
    pub async fn configure(&self, connection: GraphConnection) -> Result<()> {
        let pool = Self::open_pool(&connection).await.map_err(|e| match e {
            Error::GraphUnavailable(_) => e,
            other => Error::GraphUnavailable(other.to_string()),
        })?;

        info!(uri = %connection.uri, "Knowledge graph reconfigured");
        *self.connection.lock() = connection;
        *self.pool.lock().await = Some(pool);
        Ok(())
    }

    /// Drop the connection; the next operation reconnects
    pub async fn disconnect(&self) {
        if self.pool.lock().await.take().is_some() {
            info!("Disconnected from knowledge graph");
        }
    }

    /// Create or update a Document node. Returns whether it was written.
    pub async fn ensure_document_node(&self, document_id: &str, metadata: &DocumentMetadata) -> bool {
        let id = normalize_document_id(document_id);
        let metadata = metadata.clone();

        self.with_graph("ensure_document_node", false, move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO documents (id, title, path, namespace, embedding, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                    title = excluded.title,
                    path = excluded.path,
                    namespace = excluded.namespace,
                    embedding = COALESCE(excluded.embedding, documents.embedding),
                    updated_at = excluded.updated_at",
                params![
                    id,
                    metadata.title,
                    metadata.path,
                    metadata.namespace,
                    metadata.embedding.as_deref().map(embedding_to_blob),
                    chrono::Utc::now().timestamp(),
                ],
            )?;
            tx.execute(
                "INSERT OR IGNORE INTO document_namespaces (document_id, namespace) VALUES (?1, ?2)",
                params![id, metadata.namespace],
            )?;
            tx.commit()?;
            Ok(true)
        })
        .await
    }

    /// Whether `namespace` holds a Document node for `document_id`;
    /// `None` when the graph cannot be reached
    pub async fn has_document(&self, document_id: &str, namespace: &str) -> Option<bool> {
        let id = normalize_document_id(document_id);
        let ns = namespace.to_string();
        self.with_graph("has_document", None, move |conn| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM document_namespaces WHERE document_id = ?1 AND namespace = ?2)",
                params![id, ns],
                |row| row.get(0),
            )?;
            Ok(Some(exists))
        })
        .await
    }

    /// Replace the entity relationships of a document.
    ///
    /// Entities below the confidence floor are skipped. Returns the number
    /// stored; `0` when the document node does not exist.
    pub async fn index_entities(&self, document_id: &str, entities: &[ExtractedEntity]) -> usize {
        let id = normalize_document_id(document_id);
        let entities = entities.to_vec();
        let floor = self.confidence_floor;

        self.with_graph("index_entities", 0, move |conn| {
            let tx = conn.transaction()?;
            let exists: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM documents WHERE id = ?1)",
                params![id],
                |row| row.get(0),
            )?;
            if !exists {
                warn!(document_id = %id, "No document node; entities not stored");
                return Ok(0);
            }

            tx.execute("DELETE FROM mentions WHERE document_id = ?1", params![id])?;

            let now = chrono::Utc::now().timestamp();
            let mut stored = 0;
            for entity in &entities {
                let name = entity.name.trim();
                // NaN confidence fails the comparison and is skipped too
                if name.is_empty() || !(entity.confidence >= floor) {
                    continue;
                }

                let entity_id = upsert_entity(&tx, entity, name, now)?;
                tx.execute(
                    "INSERT INTO mentions (document_id, entity_id, relation, confidence, mention_count)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(document_id, entity_id) DO UPDATE SET
                        confidence = MAX(mentions.confidence, excluded.confidence),
                        mention_count = mentions.mention_count + excluded.mention_count",
                    params![
                        id,
                        entity_id,
                        entity.kind.relationship().as_str(),
                        entity.confidence as f64,
                        entity.mentions.max(1) as i64,
                    ],
                )?;
                stored += 1;
            }

            let pruned = prune_orphans(&tx)?;
            tx.commit()?;

            debug!(document_id = %id, stored, pruned, "Indexed entities");
            Ok(stored)
        })
        .await
    }

    /// Rebuild outgoing `SIMILAR_TO` edges for every document of `namespace`.
    ///
    /// Each document's own embedding is looked up in `vectors` (collection
    /// `namespace`) and its top peers at or above `threshold` replace its
    /// previous edges. Returns the number of documents processed.
    pub async fn build_similarity_relationships(
        &self,
        vectors: &VectorStore,
        namespace: &str,
        threshold: f32,
        per_document_limit: usize,
    ) -> usize {
        let Some(pool) = self.pool().await else {
            return 0;
        };

        let ns = namespace.to_string();
        let documents = match pool
            .run(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT document_id FROM document_namespaces WHERE namespace = ?1 ORDER BY document_id",
                )?;
                let ids = stmt
                    .query_map(params![ns], |row| row.get(0))?
                    .collect::<rusqlite::Result<Vec<String>>>()?;
                Ok(ids)
            })
            .await
        {
            Ok(documents) => documents,
            Err(e) => {
                warn!(namespace, error = %e, "Failed to list documents for similarity");
                return 0;
            }
        };

        let mut processed = 0;
        for document_id in &documents {
            match link_similar(&pool, vectors, document_id, namespace, threshold, per_document_limit)
                .await
            {
                Ok(true) => processed += 1,
                Ok(false) => debug!(document_id = %document_id, "No embedding; skipped"),
                Err(e) => {
                    warn!(document_id = %document_id, error = %e, "Similarity sweep failed for document")
                }
            }
        }

        info!(namespace, processed, total = documents.len(), "Built similarity relationships");
        processed
    }

    /// Outgoing `SIMILAR_TO` edges of a document, strongest first
    pub async fn similar_documents(&self, document_id: &str, limit: usize) -> Vec<GraphHit> {
        let id = normalize_document_id(document_id);

        self.with_graph("similar_documents", Vec::new(), move |conn| {
            let mut stmt = conn.prepare(
                "SELECT s.target_id, d.namespace, s.score
                 FROM similar_to s JOIN documents d ON d.id = s.target_id
                 WHERE s.source_id = ?1
                 ORDER BY s.score DESC, s.target_id
                 LIMIT ?2",
            )?;
            let hits = stmt
                .query_map(params![id, limit as i64], hit_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(hits)
        })
        .await
    }

    /// Documents whose node embedding is closest to `query`
    pub async fn find_similar_by_embedding(
        &self,
        query: &[f32],
        namespace_filter: Option<&str>,
        threshold: f32,
        limit: usize,
    ) -> Vec<GraphHit> {
        if limit == 0 || query.is_empty() {
            return Vec::new();
        }
        let query = query.to_vec();
        let namespace = namespace_filter.map(String::from);

        self.with_graph("find_similar_by_embedding", Vec::new(), move |conn| {
            let mut stmt = conn.prepare(
                "SELECT d.id, COALESCE(?1, d.namespace), d.embedding FROM documents d
                 WHERE d.embedding IS NOT NULL
                   AND (?1 IS NULL OR EXISTS (
                        SELECT 1 FROM document_namespaces dn
                        WHERE dn.document_id = d.id AND dn.namespace = ?1))",
            )?;
            let rows = stmt.query_map(params![namespace], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Vec<u8>>(2)?,
                ))
            })?;

            let mut hits = Vec::new();
            for row in rows {
                let (document_id, namespace, blob) = row?;
                let embedding = blob_to_embedding(&blob);
                if embedding.len() != query.len() {
                    continue;
                }
                let score = cosine_similarity(&query, &embedding);
                if score >= threshold {
                    hits.push(GraphHit {
                        document_id,
                        namespace,
                        score,
                    });
                }
            }

            hits.sort_by(|a, b| {
                b.score
                    .total_cmp(&a.score)
                    .then_with(|| a.document_id.cmp(&b.document_id))
            });
            hits.truncate(limit);
            Ok(hits)
        })
        .await
    }

    /// Documents related to the query entities.
    ///
    /// Entities match on `(kind, name)`, names case-insensitively. Score is
    /// the number of distinct matched entities per document.
    pub async fn find_by_query_entities(
        &self,
        entities: &[ExtractedEntity],
        namespace_filter: Option<&str>,
        limit: usize,
    ) -> Vec<GraphHit> {
        let keys: BTreeSet<(&'static str, String)> = entities
            .iter()
            .map(|e| (e.kind.as_str(), e.name.trim().to_lowercase()))
            .filter(|(_, name)| !name.is_empty())
            .collect();
        if keys.is_empty() || limit == 0 {
            return Vec::new();
        }
        let namespace = namespace_filter.map(String::from);

        self.with_graph("find_by_query_entities", Vec::new(), move |conn| {
            let matches = vec!["(e.kind = ? AND e.name = ?)"; keys.len()].join(" OR ");
            let (namespace_column, namespace_clause) = if namespace.is_some() {
                (
                    "dn.namespace",
                    "JOIN document_namespaces dn ON dn.document_id = d.id AND dn.namespace = ?",
                )
            } else {
                ("d.namespace", "")
            };
            let sql = format!(
                "SELECT m.document_id, {namespace_column}, COUNT(DISTINCT m.entity_id) AS score
                 FROM mentions m
                 JOIN entities e ON e.id = m.entity_id
                 JOIN documents d ON d.id = m.document_id
                 {namespace_clause}
                 WHERE {matches}
                 GROUP BY m.document_id
                 ORDER BY score DESC, m.document_id
                 LIMIT ?"
            );

            let mut values: Vec<rusqlite::types::Value> = Vec::new();
            if let Some(ns) = namespace {
                values.push(rusqlite::types::Value::Text(ns));
            }
            for (kind, name) in keys {
                values.push(rusqlite::types::Value::Text(kind.to_string()));
                values.push(rusqlite::types::Value::Text(name));
            }
            values.push(rusqlite::types::Value::Integer(limit as i64));

            let mut stmt = conn.prepare(&sql)?;
            let hits = stmt
                .query_map(params_from_iter(values), |row| {
                    Ok(GraphHit {
                        document_id: row.get(0)?,
                        namespace: row.get(1)?,
                        score: row.get::<_, i64>(2)? as f32,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(hits)
        })
        .await
    }

    /// Delete a Document node, then prune entities nothing references.
    ///
    /// The prune is best-effort and sweeps every orphan, so one left behind
    /// by an earlier failure is collected here. Returns whether the document
    /// existed.
    pub async fn delete_document_and_orphans(&self, document_id: &str) -> bool {
        let id = normalize_document_id(document_id);
        let removed = self
            .with_graph("delete_document", false, move |conn| {
                Ok(conn.execute("DELETE FROM documents WHERE id = ?1", params![id])? > 0)
            })
            .await;

        self.prune_orphans().await;
        removed
    }

    /// Detach every Document node from a namespace, then prune orphans.
    ///
    /// Nodes that another namespace still holds survive with that namespace
    /// as their own; the rest are deleted. Returns the number deleted.
    pub async fn delete_namespace_documents(&self, namespace: &str) -> usize {
        let ns = namespace.to_string();
        let removed = self
            .with_graph("delete_namespace_documents", 0, move |conn| {
                let tx = conn.transaction()?;
                tx.execute("DELETE FROM document_namespaces WHERE namespace = ?1", params![ns])?;
                tx.execute(
                    "UPDATE documents SET namespace = (
                        SELECT MIN(dn.namespace) FROM document_namespaces dn
                        WHERE dn.document_id = documents.id)
                     WHERE namespace = ?1
                       AND EXISTS (SELECT 1 FROM document_namespaces dn WHERE dn.document_id = documents.id)",
                    params![ns],
                )?;
                let removed = tx.execute(
                    "DELETE FROM documents
                     WHERE NOT EXISTS (SELECT 1 FROM document_namespaces dn WHERE dn.document_id = documents.id)",
                    [],
                )?;
                tx.commit()?;
                Ok(removed)
            })
            .await;

        self.prune_orphans().await;
        info!(namespace, removed, "Deleted namespace from graph");
        removed
    }

    async fn prune_orphans(&self) -> usize {
        let pruned = self.with_graph("prune_orphans", 0, |conn| prune_orphans(conn)).await;
        if pruned > 0 {
            debug!(pruned, "Pruned orphan entities");
        }
        pruned
    }

    /// Look up one entity by kind and (case-insensitive) name
    pub async fn find_entity(&self, kind: EntityKind, name: &str) -> Option<EntityNode> {
        let name = name.trim().to_string();
        self.with_graph("find_entity", None, move |conn| {
            Ok(conn
                .query_row(
                    &format!("{ENTITY_SELECT} WHERE e.kind = ?1 AND e.name = ?2"),
                    params![kind.as_str(), name],
                    entity_from_row,
                )
                .optional()?)
        })
        .await
    }

    /// Entities related to a document, most mentioned first
    pub async fn document_entities(&self, document_id: &str) -> Vec<EntityNode> {
        let id = normalize_document_id(document_id);
        self.with_graph("document_entities", Vec::new(), move |conn| {
            let mut stmt = conn.prepare(&format!(
                "{ENTITY_SELECT}
                 JOIN mentions dm ON dm.entity_id = e.id
                 WHERE dm.document_id = ?1
                 ORDER BY dm.mention_count DESC, e.name"
            ))?;
            let entities = stmt
                .query_map(params![id], entity_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(entities)
        })
        .await
    }

    pub async fn stats(&self) -> GraphStats {
        self.with_graph("stats", GraphStats::default(), |conn| {
            let count = |table: &str| -> Result<usize> {
                let n: i64 =
                    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
                Ok(n as usize)
            };
            Ok(GraphStats {
                documents: count("documents")?,
                entities: count("entities")?,
                relationships: count("mentions")?,
                similarities: count("similar_to")?,
            })
        })
        .await
    }
}

const ENTITY_SELECT: &str = "SELECT e.kind, e.name, e.description, e.confidence, e.snippets,
        (SELECT COALESCE(SUM(m.mention_count), 0) FROM mentions m WHERE m.entity_id = e.id)
     FROM entities e";

fn entity_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EntityNode> {
    let snippets: String = row.get(4)?;
    Ok(EntityNode {
        kind: EntityKind::from_label(&row.get::<_, String>(0)?),
        name: row.get(1)?,
        description: row.get(2)?,
        confidence: row.get::<_, f64>(3)? as f32,
        mention_count: row.get::<_, i64>(5)? as u64,
        snippets: serde_json::from_str(&snippets).unwrap_or_default(),
    })
}

fn hit_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<GraphHit> {
    Ok(GraphHit {
        document_id: row.get(0)?,
        namespace: row.get(1)?,
        score: row.get::<_, f64>(2)? as f32,
    })
}

/// Insert or merge an entity keyed by `(kind, name)`; returns its row id
fn upsert_entity(conn: &Connection, entity: &ExtractedEntity, name: &str, now: i64) -> Result<i64> {
    let existing: Option<(i64, String)> = conn
        .query_row(
            "SELECT id, snippets FROM entities WHERE kind = ?1 AND name = ?2",
            params![entity.kind.as_str(), name],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    match existing {
        Some((id, raw)) => {
            let mut snippets: Vec<String> = serde_json::from_str(&raw).unwrap_or_default();
            for snippet in &entity.snippets {
                if snippets.len() >= MAX_SNIPPETS {
                    break;
                }
                if !snippets.contains(snippet) {
                    snippets.push(snippet.clone());
                }
            }
            conn.execute(
                "UPDATE entities SET
                    description = COALESCE(?2, description),
                    confidence = MAX(confidence, ?3),
                    snippets = ?4,
                    updated_at = ?5
                 WHERE id = ?1",
                params![
                    id,
                    entity.description,
                    entity.confidence as f64,
                    serde_json::to_string(&snippets)?,
                    now,
                ],
            )?;
            Ok(id)
        }
        None => {
            let snippets: Vec<&String> = entity.snippets.iter().take(MAX_SNIPPETS).collect();
            conn.execute(
                "INSERT INTO entities (kind, name, description, confidence, snippets, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                params![
                    entity.kind.as_str(),
                    name,
                    entity.description,
                    entity.confidence as f64,
                    serde_json::to_string(&snippets)?,
                    now,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        }
    }
}

/// Delete every entity no document references
fn prune_orphans(conn: &Connection) -> Result<usize> {
    Ok(conn.execute(
        "DELETE FROM entities WHERE NOT EXISTS (SELECT 1 FROM mentions m WHERE m.entity_id = entities.id)",
        [],
    )?)
}

/// Replace the outgoing similarity edges of one document.
/// Returns `false` when the document has no stored embedding.
async fn link_similar(
    pool: &SqlitePool,
    vectors: &VectorStore,
    document_id: &str,
    namespace: &str,
    threshold: f32,
    per_document_limit: usize,
) -> Result<bool> {
    let Some(embedding) = vectors.get_embedding(document_id, namespace).await? else {
        return Ok(false);
    };

    let peers = vectors
        .search_similar(namespace, &embedding, per_document_limit + 1, None, Some(threshold))
        .await?;
    let edges: Vec<(String, f32)> = peers
        .into_iter()
        .filter(|m| m.document_id != document_id)
        .take(per_document_limit)
        .map(|m| (m.document_id, m.similarity))
        .collect();

    let source = document_id.to_string();
    pool.run(move |conn| {
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM similar_to WHERE source_id = ?1", params![source])?;
        let now = chrono::Utc::now().timestamp();
        for (target, score) in &edges {
            // Peers without a Document node get no edge
            tx.execute(
                "INSERT INTO similar_to (source_id, target_id, score, updated_at)
                 SELECT ?1, ?2, ?3, ?4 WHERE EXISTS (SELECT 1 FROM documents WHERE id = ?2)",
                params![source, target, *score as f64, now],
            )?;
        }
        tx.commit()?;
        Ok(())
    })
    .await?;

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(namespace: &str, embedding: Option<Vec<f32>>) -> DocumentMetadata {
        DocumentMetadata {
            title: "t".into(),
            path: "p.md".into(),
            namespace: namespace.into(),
            embedding,
        }
    }

    async fn graph_with(docs: &[(&str, &str)]) -> GraphStore {
        let graph = GraphStore::in_memory();
        for (id, ns) in docs {
            assert!(graph.ensure_document_node(id, &meta(ns, None)).await);
        }
        graph
    }

    #[tokio::test]
    async fn test_orphan_pruning_keeps_shared_entities() {
        let graph = graph_with(&[("X", "notes"), ("Y", "notes")]).await;
        let alice = ExtractedEntity::new(EntityKind::Person, "Alice", 0.9);
        let acme = ExtractedEntity::new(EntityKind::Organization, "Acme", 0.9);

        assert_eq!(graph.index_entities("X", &[alice, acme.clone()]).await, 2);
        assert_eq!(graph.index_entities("Y", &[acme]).await, 1);

        assert!(graph.delete_document_and_orphans("X").await);
        assert!(graph.find_entity(EntityKind::Person, "Alice").await.is_none());
        let acme = graph.find_entity(EntityKind::Organization, "acme").await.unwrap();
        assert_eq!(acme.mention_count, 1);

        assert!(!graph.delete_document_and_orphans("X").await);
    }

    #[tokio::test]
    async fn test_confidence_floor_and_case_merge() {
        let graph = graph_with(&[("a", "notes"), ("b", "notes")]).await;
        let weak = ExtractedEntity::new(EntityKind::Concept, "Maybe", 0.2);
        let rust = ExtractedEntity::new(EntityKind::Technology, "Rust", 0.8);
        let rust_lower = ExtractedEntity::new(EntityKind::Technology, "rust", 0.95);

        assert_eq!(graph.index_entities("a", &[weak, rust]).await, 1);
        assert_eq!(graph.index_entities("b", &[rust_lower]).await, 1);

        let stats = graph.stats().await;
        assert_eq!(stats.entities, 1);
        assert_eq!(stats.relationships, 2);

        let node = graph.find_entity(EntityKind::Technology, "RUST").await.unwrap();
        assert_eq!(node.name, "Rust");
        assert_eq!(node.mention_count, 2);
        assert!((node.confidence - 0.95).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_reindex_does_not_double_count() {
        let graph = graph_with(&[("a", "notes")]).await;
        let mut alice = ExtractedEntity::new(EntityKind::Person, "Alice", 0.9);
        alice.mentions = 3;

        graph.index_entities("a", &[alice.clone()]).await;
        graph.index_entities("a", &[alice]).await;
        let node = graph.find_entity(EntityKind::Person, "Alice").await.unwrap();
        assert_eq!(node.mention_count, 3);

        // Entities dropped from a document disappear when nothing else has them
        graph.index_entities("a", &[]).await;
        assert!(graph.find_entity(EntityKind::Person, "Alice").await.is_none());
    }

    #[tokio::test]
    async fn test_entities_need_document_node() {
        let graph = GraphStore::in_memory();
        let alice = ExtractedEntity::new(EntityKind::Person, "Alice", 0.9);
        assert_eq!(graph.index_entities("missing", &[alice]).await, 0);
    }

    #[tokio::test]
    async fn test_find_by_query_entities_scores_distinct_matches() {
        let graph = graph_with(&[("a", "notes"), ("b", "notes"), ("c", "hub")]).await;
        let alice = ExtractedEntity::new(EntityKind::Person, "Alice", 0.9);
        let acme = ExtractedEntity::new(EntityKind::Organization, "Acme", 0.9);
        graph.index_entities("a", &[alice.clone(), acme.clone()]).await;
        graph.index_entities("b", &[acme.clone()]).await;
        graph.index_entities("c", &[alice, acme]).await;

        let query = vec![
            ExtractedEntity::new(EntityKind::Person, "alice", 0.7),
            ExtractedEntity::new(EntityKind::Organization, "ACME", 0.7),
        ];
        let hits = graph.find_by_query_entities(&query, None, 10).await;
        let scored: Vec<_> = hits.iter().map(|h| (h.document_id.as_str(), h.score)).collect();
        assert_eq!(scored, vec![("a", 2.0), ("c", 2.0), ("b", 1.0)]);

        let filtered = graph.find_by_query_entities(&query, Some("hub"), 10).await;
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].document_id, "c");

        assert!(graph.find_by_query_entities(&[], None, 10).await.is_empty());
    }

    #[tokio::test]
    async fn test_embedding_kept_when_update_has_none() {
        let graph = GraphStore::in_memory();
        graph.ensure_document_node("a", &meta("notes", Some(vec![1.0, 0.0]))).await;
        graph.ensure_document_node("a", &meta("notes", None)).await;
        graph.ensure_document_node("b", &meta("notes", Some(vec![0.0, 1.0]))).await;

        let hits = graph.find_similar_by_embedding(&[1.0, 0.0], None, 0.5, 10).await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document_id, "a");

        let other_ns = graph.find_similar_by_embedding(&[1.0, 0.0], Some("hub"), -1.0, 10).await;
        assert!(other_ns.is_empty());
    }

    #[tokio::test]
    async fn test_similarity_sweep_replaces_edges() {
        let vectors = VectorStore::in_memory();
        let graph = GraphStore::in_memory();
        for (id, v) in [("a", [1.0, 0.0]), ("b", [0.95, 0.05]), ("c", [0.0, 1.0])] {
            vectors.store_embedding(id, "notes", &v, None).await.unwrap();
            graph.ensure_document_node(id, &meta("notes", None)).await;
        }
        // Node without an embedding is skipped
        graph.ensure_document_node("d", &meta("notes", None)).await;

        let processed = graph.build_similarity_relationships(&vectors, "notes", 0.8, 5).await;
        assert_eq!(processed, 3);

        let similar = graph.similar_documents("a", 5).await;
        assert_eq!(similar.len(), 1);
        assert_eq!(similar[0].document_id, "b");
        assert!(graph.similar_documents("c", 5).await.is_empty());

        // Rerun with a stricter threshold drops the edge
        graph.build_similarity_relationships(&vectors, "notes", 0.9999, 5).await;
        assert!(graph.similar_documents("a", 5).await.is_empty());
    }

    #[tokio::test]
    async fn test_delete_namespace() {
        let graph = graph_with(&[("a", "hub"), ("b", "hub"), ("c", "notes")]).await;
        let topic = ExtractedEntity::new(EntityKind::Topic, "gpu", 0.9);
        graph.index_entities("a", &[topic]).await;

        assert_eq!(graph.delete_namespace_documents("hub").await, 2);
        let stats = graph.stats().await;
        assert_eq!(stats.documents, 1);
        assert_eq!(stats.entities, 0);
    }

    #[tokio::test]
    async fn test_unreachable_graph_degrades() {
        let dir = tempfile::TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "not a directory").unwrap();
        let uri = blocker.join("graph.db").to_string_lossy().to_string();

        let graph = GraphStore::new(GraphConnection::new(uri.clone()), DEFAULT_CONFIDENCE_FLOOR);
        assert!(!graph.is_available().await);
        assert!(!graph.ensure_document_node("a", &meta("notes", None)).await);
        assert_eq!(graph.has_document("a", "notes").await, None);
        assert!(graph
            .find_by_query_entities(&[ExtractedEntity::new(EntityKind::Topic, "x", 0.9)], None, 5)
            .await
            .is_empty());
        assert_eq!(graph.delete_namespace_documents("notes").await, 0);
        assert_eq!(graph.stats().await, GraphStats::default());

        let err = graph.configure(GraphConnection::new(uri)).await.unwrap_err();
        assert!(matches!(err, Error::GraphUnavailable(_)));
    }

    #[tokio::test]
    async fn test_configure_switches_connection() {
        let dir = tempfile::TempDir::new().unwrap();
        let graph = GraphStore::in_memory();
        graph.ensure_document_node("a", &meta("notes", None)).await;

        let conn = GraphConnection {
            database: Some("kg".into()),
            ..GraphConnection::new(dir.path().to_string_lossy().to_string())
        };
        graph.configure(conn).await.unwrap();
        assert!(dir.path().join("kg.db").exists());
        assert_eq!(graph.stats().await.documents, 0);

        assert!(matches!(
            graph.configure(GraphConnection::new("bolt://localhost:7687")).await,
            Err(Error::GraphUnavailable(_))
        ));
        // Previous connection still in use
        assert!(graph.is_available().await);
    }

    #[tokio::test]
    async fn test_query_entity_matches_kind_and_name() {
        let graph = graph_with(&[("a", "notes"), ("b", "notes")]).await;
        graph
            .index_entities(
                "a",
                &[
                    ExtractedEntity::new(EntityKind::Technology, "Rust", 0.9),
                    ExtractedEntity::new(EntityKind::Topic, "rust", 0.9),
                ],
            )
            .await;
        graph
            .index_entities("b", &[ExtractedEntity::new(EntityKind::Topic, "Rust", 0.9)])
            .await;

        let hits = graph
            .find_by_query_entities(&[ExtractedEntity::new(EntityKind::Topic, "RUST", 0.7)], None, 10)
            .await;
        let scored: Vec<_> = hits.iter().map(|h| (h.document_id.as_str(), h.score)).collect();
        assert_eq!(scored, vec![("a", 1.0), ("b", 1.0)]);
    }

    #[tokio::test]
    async fn test_namespace_delete_keeps_nodes_other_namespaces_hold() {
        let graph = GraphStore::in_memory();
        graph.ensure_document_node("hub-a/x.md", &meta("notes", Some(vec![1.0, 0.0]))).await;
        graph.ensure_document_node("hub-a/x.md", &meta("hub-a", None)).await;
        graph.ensure_document_node("hub-a/y.md", &meta("hub-a", None)).await;
        graph
            .index_entities("hub-a/x.md", &[ExtractedEntity::new(EntityKind::Topic, "gpu", 0.9)])
            .await;
        assert_eq!(graph.has_document("hub-a/x.md", "notes").await, Some(true));
        assert_eq!(graph.has_document("hub-a/y.md", "notes").await, Some(false));

        assert_eq!(graph.delete_namespace_documents("hub-a").await, 1);
        assert_eq!(graph.has_document("hub-a/x.md", "notes").await, Some(true));
        assert_eq!(graph.has_document("hub-a/x.md", "hub-a").await, Some(false));
        assert!(graph.find_entity(EntityKind::Topic, "gpu").await.is_some());

        let hits = graph.find_similar_by_embedding(&[1.0, 0.0], Some("notes"), 0.5, 5).await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].namespace, "notes");

        assert_eq!(graph.delete_namespace_documents("notes").await, 1);
        assert_eq!(graph.stats().await, GraphStats::default());
    }
}
