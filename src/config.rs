//! Engine configuration
//!
//! Loaded from `<vault>/.noteweave/config.yaml`. Every field has a default so
//! the file is optional; relative paths resolve against the vault root.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::core::paths::VaultPaths;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Namespace that holds the vault's own notes
    pub notes_namespace: String,
    pub vector: VectorConfig,
    pub graph: GraphConfig,
    pub cache: CacheConfig,
    pub search: SearchConfig,
    pub embedding: EmbeddingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorConfig {
    pub path: PathBuf,
    /// Length differences strictly below this are padded or truncated
    pub dimension_tolerance: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    #[serde(flatten)]
    pub connection: GraphConnection,
    /// Extracted entities below this confidence are not stored
    pub entity_confidence_floor: f32,
    pub similarity_threshold: f32,
    pub similarity_per_document: usize,
}

/// Graph database connection parameters
#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GraphConnection {
    /// File path, `sqlite://` URL or `:memory:`
    pub uri: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Graph file name inside the `uri` directory
    pub database: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub indexed_ids_ttl_secs: u64,
    pub content_ttl_secs: u64,
    pub content_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub default_limit: usize,
    pub threshold: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub dimension: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            notes_namespace: "notes".to_string(),
            vector: VectorConfig::default(),
            graph: GraphConfig::default(),
            cache: CacheConfig::default(),
            search: SearchConfig::default(),
            embedding: EmbeddingConfig::default(),
        }
    }
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".noteweave/vectors.db"),
            dimension_tolerance: 100,
        }
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            connection: GraphConnection::default(),
            entity_confidence_floor: 0.5,
            similarity_threshold: 0.75,
            similarity_per_document: 5,
        }
    }
}

impl Default for GraphConnection {
    fn default() -> Self {
        Self {
            uri: ".noteweave/graph.db".to_string(),
            username: None,
            password: None,
            database: None,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            indexed_ids_ttl_secs: 60,
            content_ttl_secs: 30 * 60,
            content_capacity: 200,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: 5,
            threshold: 0.0,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self { dimension: 384 }
    }
}

impl EngineConfig {
    /// Load the vault's config file, falling back to defaults when absent.
    /// Relative store paths are resolved against the vault root.
    pub fn load(paths: &VaultPaths) -> Result<Self> {
        let mut config = if paths.config_file.exists() {
            debug!(path = %paths.config_file.display(), "Loading config");
            let raw = std::fs::read_to_string(&paths.config_file)?;
            serde_yaml::from_str::<Self>(&raw)?
        } else {
            Self::default()
        };
        config.resolve_paths(&paths.root);
        config.validate()?;
        Ok(config)
    }

    /// Config with both stores in memory (tests, dry runs)
    pub fn in_memory() -> Self {
        let mut config = Self::default();
        config.vector.path = PathBuf::from(crate::db::MEMORY_PATH);
        config.graph.connection.uri = crate::db::MEMORY_PATH.to_string();
        config
    }

    fn resolve_paths(&mut self, root: &Path) {
        if self.vector.path.is_relative() && self.vector.path.to_str() != Some(crate::db::MEMORY_PATH) {
            self.vector.path = root.join(&self.vector.path);
        }
        self.graph.connection = self.graph.connection.resolved_against(root);
    }

    pub fn validate(&self) -> Result<()> {
        if self.notes_namespace.trim().is_empty() {
            return Err(Error::Config("notes_namespace must not be empty".into()));
        }
        if !(0.0..=1.0).contains(&self.graph.entity_confidence_floor) {
            return Err(Error::Config(format!(
                "graph.entity_confidence_floor must be within [0, 1], got {}",
                self.graph.entity_confidence_floor
            )));
        }
        if !(-1.0..=1.0).contains(&self.graph.similarity_threshold) {
            return Err(Error::Config(format!(
                "graph.similarity_threshold must be within [-1, 1], got {}",
                self.graph.similarity_threshold
            )));
        }
        if self.cache.content_capacity == 0 {
            return Err(Error::Config("cache.content_capacity must be positive".into()));
        }
        if self.embedding.dimension == 0 {
            return Err(Error::Config("embedding.dimension must be positive".into()));
        }
        Ok(())
    }
}

impl CacheConfig {
    pub fn indexed_ids_ttl(&self) -> Duration {
        Duration::from_secs(self.indexed_ids_ttl_secs)
    }

    pub fn content_ttl(&self) -> Duration {
        Duration::from_secs(self.content_ttl_secs)
    }
}

impl GraphConnection {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ..Self::default()
        }
    }

    pub fn in_memory() -> Self {
        Self::new(crate::db::MEMORY_PATH)
    }

    /// Resolve the connection into a database file path.
    ///
    /// Accepts a bare path, a `sqlite://` / `file://` URL or `:memory:`.
    /// Network schemes are rejected: the graph is embedded.
    pub fn database_path(&self) -> Result<PathBuf> {
        let uri = self.uri.trim();
        if uri == crate::db::MEMORY_PATH {
            return Ok(PathBuf::from(crate::db::MEMORY_PATH));
        }

        let location = if let Some(rest) = uri.strip_prefix("sqlite://") {
            rest
        } else if let Some(rest) = uri.strip_prefix("file://") {
            rest
        } else if uri.contains("://") {
            return Err(Error::GraphUnavailable(format!(
                "unsupported graph uri scheme: {}",
                uri.split("://").next().unwrap_or_default()
            )));
        } else {
            uri
        };

        if location.is_empty() {
            return Err(Error::GraphUnavailable("graph uri is empty".into()));
        }

        let base = PathBuf::from(location);
        Ok(match &self.database {
            Some(name) if !name.trim().is_empty() => base.join(format!("{}.db", name.trim())),
            _ => base,
        })
    }

    fn resolved_against(&self, root: &Path) -> Self {
        let mut resolved = self.clone();
        let uri = self.uri.trim();
        if uri != crate::db::MEMORY_PATH && !uri.contains("://") && Path::new(uri).is_relative() {
            resolved.uri = root.join(uri).to_string_lossy().to_string();
        }
        resolved
    }
}

impl std::fmt::Debug for GraphConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphConnection")
            .field("uri", &self.uri)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("database", &self.database)
            .finish()
    }
}
