//! Graph database schema

use rusqlite::Connection;
use tracing::debug;

use crate::error::Result;

/// Apply the graph schema (idempotent)
pub fn apply_migrations(conn: &Connection) -> Result<()> {
    debug!("Applying graph schema");

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            path TEXT NOT NULL,
            namespace TEXT NOT NULL,
            embedding BLOB,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_documents_namespace ON documents(namespace);

        -- Every namespace that indexed a document; `documents.namespace` is the latest
        CREATE TABLE IF NOT EXISTS document_namespaces (
            document_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
            namespace TEXT NOT NULL,
            PRIMARY KEY (document_id, namespace)
        );
        CREATE INDEX IF NOT EXISTS idx_document_namespaces_ns ON document_namespaces(namespace);
        INSERT OR IGNORE INTO document_namespaces (document_id, namespace)
            SELECT id, namespace FROM documents;

        -- Entity identity is (kind, name) with case-insensitive names
        CREATE TABLE IF NOT EXISTS entities (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            kind TEXT NOT NULL,
            name TEXT NOT NULL COLLATE NOCASE,
            description TEXT,
            confidence REAL NOT NULL,
            snippets TEXT NOT NULL DEFAULT '[]',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            UNIQUE (kind, name)
        );
        CREATE INDEX IF NOT EXISTS idx_entities_name ON entities(name);

        CREATE TABLE IF NOT EXISTS mentions (
            document_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
            entity_id INTEGER NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
            relation TEXT NOT NULL CHECK (relation IN ('MENTIONS', 'CONTAINS_ENTITY')),
            confidence REAL NOT NULL,
            mention_count INTEGER NOT NULL DEFAULT 1,
            PRIMARY KEY (document_id, entity_id)
        );
        CREATE INDEX IF NOT EXISTS idx_mentions_entity ON mentions(entity_id);

        CREATE TABLE IF NOT EXISTS similar_to (
            source_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
            target_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
            score REAL NOT NULL,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (source_id, target_id)
        );
        CREATE INDEX IF NOT EXISTS idx_similar_target ON similar_to(target_id);
        "#,
    )?;

    Ok(())
}
