//! Error types for the retrieval engine

use thiserror::Error;

/// Retrieval engine error type
#[derive(Error, Debug)]
pub enum Error {
    /// Vector length cannot be reconciled with the collection dimension
    #[error("Dimension mismatch: collection expects {expected}, got {actual} (tolerance {tolerance})")]
    DimensionMismatch {
        expected: usize,
        actual: usize,
        tolerance: usize,
    },

    /// Vector is empty or otherwise unusable
    #[error("Invalid vector: {0}")]
    InvalidVector(String),

    /// Graph database could not be reached or queried
    #[error("Graph unavailable: {0}")]
    GraphUnavailable(String),

    /// Failure reported by an external collaborator (embedder, source, extractor)
    #[error("Collaborator error: {0}")]
    Collaborator(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Underlying rusqlite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A blocking storage task panicked or was cancelled
    #[error("Storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Result type for retrieval operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Wrap a collaborator failure, keeping only its message
    pub fn collaborator(err: impl std::fmt::Display) -> Self {
        Self::Collaborator(err.to_string())
    }

    pub fn is_dimension_mismatch(&self) -> bool {
        matches!(self, Self::DimensionMismatch { .. })
    }
}
