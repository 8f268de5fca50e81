use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::docid::normalize_document_id;
use super::frontmatter::Frontmatter;
use super::paths::VaultPaths;
use super::source::{DocumentSource, SourceDocument};
use crate::error::{Error, Result};

/// A Markdown note split into its indexable parts
#[derive(Debug, Clone)]
pub struct Note {
    pub title: String,
    pub hub: Option<String>,
    pub tags: Vec<String>,
    pub body: String,
}

impl Note {
    /// Parse raw note text; `fallback_title` is used when frontmatter has none
    pub fn parse(content: &str, fallback_title: &str) -> Self {
        let (frontmatter, body) = Frontmatter::split(content);
        let frontmatter = frontmatter.unwrap_or_default();

        Self {
            title: frontmatter.title.unwrap_or_else(|| fallback_title.to_string()),
            hub: frontmatter.hub,
            tags: frontmatter.tags,
            body: body.trim().to_string(),
        }
    }

    /// Text handed to the embedding provider
    pub fn embedding_text(&self) -> String {
        if self.body.is_empty() {
            self.title.clone()
        } else {
            format!("{}\n\n{}", self.title, self.body)
        }
    }
}

/// Filesystem-backed document source over a Markdown vault
pub struct VaultSource {
    paths: VaultPaths,
    notes_namespace: String,
}

impl VaultSource {
    pub fn new(root: PathBuf, notes_namespace: impl Into<String>) -> Self {
        Self {
            paths: VaultPaths::from_root(root),
            notes_namespace: notes_namespace.into(),
        }
    }

    /// Resolve an item reference inside the vault, refusing escapes
    fn resolve(&self, item_ref: &str) -> Result<PathBuf> {
        let relative = Path::new(item_ref.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
        {
            return Err(Error::Collaborator(format!(
                "item reference escapes the vault: {}",
                item_ref
            )));
        }
        Ok(self.paths.root.join(relative))
    }
}

#[async_trait]
impl DocumentSource for VaultSource {
    async fn list_documents(&self, namespace: &str) -> Result<Vec<SourceDocument>> {
        let dir = self.paths.namespace_dir(namespace, &self.notes_namespace);
        let paths = self.paths.clone();

        tokio::task::spawn_blocking(move || collect_markdown(&dir, &paths)).await?
    }

    async fn get_item_content(&self, item_ref: &str) -> Result<String> {
        let path = self.resolve(item_ref)?;
        Ok(tokio::fs::read_to_string(&path).await?)
    }
}

fn collect_markdown(dir: &Path, paths: &VaultPaths) -> Result<Vec<SourceDocument>> {
    if !dir.exists() {
        debug!(dir = %dir.display(), "Namespace folder does not exist");
        return Ok(Vec::new());
    }

    let mut documents = Vec::new();
    let walker = WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !paths.is_excluded(e.path()));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable vault entry");
                continue;
            }
        };
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().map(|e| e != "md").unwrap_or(true) {
            continue;
        }

        let relative = path.strip_prefix(&paths.root).unwrap_or(path);
        let relative = relative.to_string_lossy().replace('\\', "/");
        let title = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();

        documents.push(SourceDocument {
            id: normalize_document_id(&relative),
            path: relative,
            title,
        });
    }

    documents.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(documents)
}
