//! Vector store using SQLite
//!
//! One table per collection (`vectors_<n>`, where `n` is the collection's
//! registry row id) holding embeddings as little-endian f32 BLOBs. Similarity
//! is computed in Rust over the collection, which is fine for the tens of
//! thousands of notes a desktop vault holds.

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::similarity::{cosine_similarity, reconcile_dimension};
use crate::core::docid::{normalize_document_id, record_key};
use crate::db::SqlitePool;
use crate::error::{Error, Result};

/// Length differences strictly below this are reconciled by padding/truncation
pub const DEFAULT_DIMENSION_TOLERANCE: usize = 100;

/// Embedding store partitioned into named collections
pub struct VectorStore {
    path: PathBuf,
    dimension_tolerance: usize,
    pool: OnceCell<SqlitePool>,
    physical_inits: AtomicUsize,
}

/// One hit of a similarity search
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilarityMatch {
    pub document_id: String,
    pub similarity: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Collection summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionInfo {
    pub name: String,
    pub dimension: usize,
    pub records: usize,
}

/// Registry row of a collection
#[derive(Debug, Clone, Copy)]
struct Collection {
    id: i64,
    dimension: usize,
}

impl Collection {
    fn table(&self) -> String {
        format!("vectors_{}", self.id)
    }
}

impl VectorStore {
    /// Store backed by the database at `path`. Nothing is opened until the
    /// first operation or an explicit [`initialize`](Self::initialize).
    pub fn open(path: impl Into<PathBuf>, dimension_tolerance: usize) -> Self {
        Self {
            path: path.into(),
            dimension_tolerance,
            pool: OnceCell::new(),
            physical_inits: AtomicUsize::new(0),
        }
    }

    /// In-memory store (for testing)
    pub fn in_memory() -> Self {
        Self::open(crate::db::MEMORY_PATH, DEFAULT_DIMENSION_TOLERANCE)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open the database and apply the schema.
    ///
    /// Idempotent; concurrent first callers share one in-flight
    /// initialization.
    pub async fn initialize(&self) -> Result<()> {
        self.pool().await.map(|_| ())
    }

    async fn pool(&self) -> Result<&SqlitePool> {
        self.pool
            .get_or_try_init(|| async {
                let path = self.path.clone();
                let pool = tokio::task::spawn_blocking(move || {
                    let pool = SqlitePool::open(&path)?;
                    pool.with_connection(|conn| init_schema(conn))?;
                    Ok::<_, Error>(pool)
                })
                .await??;

                self.physical_inits.fetch_add(1, Ordering::SeqCst);
                info!(path = %self.path.display(), "Vector store initialized");
                Ok::<_, Error>(pool)
            })
            .await
    }

    /// Number of times the database was physically opened
    pub fn physical_initializations(&self) -> usize {
        self.physical_inits.load(Ordering::SeqCst)
    }

    /// Insert or replace the embedding of `document_id` in `collection`.
    ///
    /// Creates the collection on first write with `vector.len()` as its
    /// dimension. Later writes are reconciled to that dimension or rejected
    /// with [`Error::DimensionMismatch`], in which case nothing is written.
    pub async fn store_embedding(
        &self,
        document_id: &str,
        collection: &str,
        vector: &[f32],
        metadata: Option<serde_json::Value>,
    ) -> Result<()> {
        validate_vector(vector)?;

        let document_id = normalize_document_id(document_id);
        let collection = collection.to_string();
        let vector = vector.to_vec();
        let metadata = metadata.map(|m| m.to_string());
        let tolerance = self.dimension_tolerance;

        self.pool()
            .await?
            .run(move |conn| {
                let tx = conn.transaction()?;
                let registered = ensure_collection(&tx, &collection, vector.len())?;
                let fitted = reconcile_dimension(&vector, registered.dimension, tolerance)?;
                if fitted.len() != vector.len() {
                    debug!(
                        collection = %collection,
                        from = vector.len(),
                        to = fitted.len(),
                        "Reconciled embedding dimension"
                    );
                }

                let table = registered.table();
                tx.execute(
                    &format!("DELETE FROM {table} WHERE document_id = ?1"),
                    params![document_id],
                )?;
                tx.execute(
                    &format!(
                        "INSERT INTO {table} (id, document_id, collection, vector, metadata, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
                    ),
                    params![
                        record_key(&collection, &document_id),
                        document_id,
                        collection,
                        embedding_to_blob(&fitted),
                        metadata,
                        chrono::Utc::now().timestamp(),
                    ],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await
    }

    /// Records of `collection` most similar to `query`, best first.
    ///
    /// `threshold` drops weaker matches before `limit` applies; `id_filter`
    /// restricts the candidates. A missing collection yields no results.
    pub async fn search_similar(
        &self,
        collection: &str,
        query: &[f32],
        limit: usize,
        id_filter: Option<&[String]>,
        threshold: Option<f32>,
    ) -> Result<Vec<SimilarityMatch>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        validate_vector(query)?;

        let collection = collection.to_string();
        let query = query.to_vec();
        let filter: Option<HashSet<String>> =
            id_filter.map(|ids| ids.iter().map(|id| normalize_document_id(id)).collect());
        let tolerance = self.dimension_tolerance;

        self.pool()
            .await?
            .run(move |conn| {
                let Some(registered) = lookup_collection(conn, &collection)? else {
                    return Ok(Vec::new());
                };
                let query = reconcile_dimension(&query, registered.dimension, tolerance)?;

                let mut stmt = conn.prepare(&format!(
                    "SELECT document_id, vector, metadata FROM {}",
                    registered.table()
                ))?;
                let rows = stmt.query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Vec<u8>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                    ))
                })?;

                let mut matches = Vec::new();
                for row in rows {
                    let (document_id, blob, metadata) = row?;
                    if let Some(filter) = &filter {
                        if !filter.contains(&document_id) {
                            continue;
                        }
                    }

                    let stored = blob_to_embedding(&blob);
                    if stored.len() != registered.dimension {
                        warn!(
                            collection = %collection,
                            document_id = %document_id,
                            len = stored.len(),
                            "Skipping stored vector with wrong dimension"
                        );
                        continue;
                    }

                    let similarity = cosine_similarity(&query, &stored);
                    if similarity.is_nan() || threshold.is_some_and(|t| similarity < t) {
                        continue;
                    }

                    matches.push(SimilarityMatch {
                        document_id,
                        similarity,
                        metadata: metadata.and_then(|m| serde_json::from_str(&m).ok()),
                    });
                }

                matches.sort_by(|a, b| {
                    b.similarity
                        .total_cmp(&a.similarity)
                        .then_with(|| a.document_id.cmp(&b.document_id))
                });
                matches.truncate(limit);
                Ok(matches)
            })
            .await
    }

    /// Remove one record. Returns whether anything was deleted.
    pub async fn delete_embedding(&self, document_id: &str, collection: &str) -> Result<bool> {
        let document_id = normalize_document_id(document_id);
        let collection = collection.to_string();

        self.pool()
            .await?
            .run(move |conn| {
                let Some(registered) = lookup_collection(conn, &collection)? else {
                    return Ok(false);
                };
                let removed = conn.execute(
                    &format!("DELETE FROM {} WHERE document_id = ?1", registered.table()),
                    params![document_id],
                )?;
                Ok(removed > 0)
            })
            .await
    }

    /// Drop a whole collection. Returns the number of records removed.
    pub async fn clear_collection(&self, collection: &str) -> Result<usize> {
        let name = collection.to_string();

        let removed = self
            .pool()
            .await?
            .run(move |conn| {
                let tx = conn.transaction()?;
                let Some(registered) = lookup_collection(&tx, &name)? else {
                    return Ok(0);
                };
                let table = registered.table();
                let count: i64 =
                    tx.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
                tx.execute_batch(&format!("DROP TABLE IF EXISTS {table};"))?;
                tx.execute("DELETE FROM collections WHERE id = ?1", params![registered.id])?;
                tx.commit()?;
                Ok(count as usize)
            })
            .await?;

        info!(collection = %collection, removed, "Cleared collection");
        Ok(removed)
    }

    /// Distinct document IDs stored in `collection`
    pub async fn get_all_document_ids(&self, collection: &str) -> Result<Vec<String>> {
        let collection = collection.to_string();

        self.pool()
            .await?
            .run(move |conn| {
                let Some(registered) = lookup_collection(conn, &collection)? else {
                    return Ok(Vec::new());
                };
                let mut stmt = conn.prepare(&format!(
                    "SELECT DISTINCT document_id FROM {} ORDER BY document_id",
                    registered.table()
                ))?;
                let ids = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<rusqlite::Result<Vec<String>>>()?;
                Ok(ids)
            })
            .await
    }

    pub async fn is_indexed(&self, document_id: &str, collection: &str) -> Result<bool> {
        Ok(self.get_embedding(document_id, collection).await?.is_some())
    }

    /// Stored (reconciled) vector of a document
    pub async fn get_embedding(&self, document_id: &str, collection: &str) -> Result<Option<Vec<f32>>> {
        let document_id = normalize_document_id(document_id);
        let collection = collection.to_string();

        self.pool()
            .await?
            .run(move |conn| {
                let Some(registered) = lookup_collection(conn, &collection)? else {
                    return Ok(None);
                };
                let blob: Option<Vec<u8>> = conn
                    .query_row(
                        &format!(
                            "SELECT vector FROM {} WHERE document_id = ?1 LIMIT 1",
                            registered.table()
                        ),
                        params![document_id],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(blob.map(|b| blob_to_embedding(&b)))
            })
            .await
    }

    /// Fixed dimension of a collection, if it exists
    pub async fn collection_dimension(&self, collection: &str) -> Result<Option<usize>> {
        let collection = collection.to_string();
        self.pool()
            .await?
            .run(move |conn| Ok(lookup_collection(conn, &collection)?.map(|c| c.dimension)))
            .await
    }

    pub async fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        self.pool()
            .await?
            .run(|conn| {
                let mut stmt =
                    conn.prepare("SELECT id, name, dimension FROM collections ORDER BY name")?;
                let registered = stmt
                    .query_map([], |row| {
                        Ok((
                            Collection {
                                id: row.get(0)?,
                                dimension: row.get::<_, i64>(2)? as usize,
                            },
                            row.get::<_, String>(1)?,
                        ))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;

                let mut infos = Vec::with_capacity(registered.len());
                for (collection, name) in registered {
                    let records: i64 = conn.query_row(
                        &format!("SELECT COUNT(*) FROM {}", collection.table()),
                        [],
                        |row| row.get(0),
                    )?;
                    infos.push(CollectionInfo {
                        name,
                        dimension: collection.dimension,
                        records: records as usize,
                    });
                }
                Ok(infos)
            })
            .await
    }

    /// Set index metadata
    pub async fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        let (key, value) = (key.to_string(), value.to_string());
        self.pool()
            .await?
            .run(move |conn| {
                conn.execute(
                    "INSERT INTO index_meta (key, value) VALUES (?1, ?2) ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                    params![key, value],
                )?;
                Ok(())
            })
            .await
    }

    /// Get index metadata
    pub async fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        self.pool()
            .await?
            .run(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT value FROM index_meta WHERE key = ?1",
                        params![key],
                        |row| row.get(0),
                    )
                    .optional()?)
            })
            .await
    }

    /// Checkpoint the write-ahead log; the handle itself closes on drop
    pub async fn close(&self) {
        let Some(pool) = self.pool.get() else {
            return;
        };
        let checkpoint = pool
            .run(|conn| {
                conn.query_row("PRAGMA wal_checkpoint(TRUNCATE);", [], |_| Ok(()))?;
                Ok(())
            })
            .await;
        match checkpoint {
            Ok(()) => info!(path = %self.path.display(), "Vector store closed"),
            Err(e) => warn!(error = %e, "Checkpoint on close failed"),
        }
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Collection registry; the row id names the collection's table
        CREATE TABLE IF NOT EXISTS collections (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            dimension INTEGER NOT NULL,
            created_at INTEGER NOT NULL
        );

        -- Index metadata
        CREATE TABLE IF NOT EXISTS index_meta (
            key TEXT PRIMARY KEY,
            value TEXT
        );
        "#,
    )?;
    Ok(())
}

fn lookup_collection(conn: &Connection, name: &str) -> Result<Option<Collection>> {
    Ok(conn
        .query_row(
            "SELECT id, dimension FROM collections WHERE name = ?1",
            params![name],
            |row| {
                Ok(Collection {
                    id: row.get(0)?,
                    dimension: row.get::<_, i64>(1)? as usize,
                })
            },
        )
        .optional()?)
}

/// Register the collection if missing and make sure its table exists.
///
/// A concurrent creator winning the insert is not an error: the registered
/// dimension is read back and the caller reconciles against it.
fn ensure_collection(conn: &Connection, name: &str, dimension: usize) -> Result<Collection> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO collections (name, dimension, created_at) VALUES (?1, ?2, ?3)",
        params![name, dimension as i64, chrono::Utc::now().timestamp()],
    )?;

    let collection = lookup_collection(conn, name)?
        .ok_or_else(|| Error::Sqlite(rusqlite::Error::QueryReturnedNoRows))?;

    let table = collection.table();
    conn.execute_batch(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS {table} (
            id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            collection TEXT NOT NULL,
            vector BLOB NOT NULL,
            metadata TEXT,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS {table}_document ON {table}(document_id);
        "#
    ))?;

    if inserted > 0 {
        info!(collection = %name, dimension, "Created collection");
    }
    Ok(collection)
}

fn validate_vector(vector: &[f32]) -> Result<()> {
    if vector.is_empty() {
        return Err(Error::InvalidVector("vector is empty".into()));
    }
    if vector.iter().any(|v| !v.is_finite()) {
        return Err(Error::InvalidVector("vector contains NaN or infinite values".into()));
    }
    Ok(())
}

/// Convert f32 embedding to BLOB
pub(crate) fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Convert BLOB to f32 embedding
pub(crate) fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}
