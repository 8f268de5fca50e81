//! Authoritative document enumeration and raw content access

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A document as listed by the authoritative source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDocument {
    pub id: String,
    pub path: String,
    pub title: String,
}

/// External collaborator that knows which documents exist and how to read them
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Every document currently belonging to `namespace`
    async fn list_documents(&self, namespace: &str) -> Result<Vec<SourceDocument>>;

    /// Raw text of a file or note
    async fn get_item_content(&self, item_ref: &str) -> Result<String>;
}
