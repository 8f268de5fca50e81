use std::path::{Path, PathBuf};

/// Name of the per-vault data directory
pub const DATA_DIR: &str = ".noteweave";

#[derive(Debug, Clone)]
pub struct VaultPaths {
    pub root: PathBuf,
    pub data_dir: PathBuf,
    pub config_file: PathBuf,
}

impl VaultPaths {
    pub fn current() -> std::io::Result<Self> {
        Ok(Self::from_root(std::env::current_dir()?))
    }

    pub fn from_root(root: PathBuf) -> Self {
        let data_dir = root.join(DATA_DIR);
        Self {
            config_file: data_dir.join("config.yaml"),
            data_dir,
            root,
        }
    }

    /// Directory listed for a namespace: the notes namespace is the whole
    /// vault, any other namespace is the sub-folder of the same name.
    pub fn namespace_dir(&self, namespace: &str, notes_namespace: &str) -> PathBuf {
        if namespace == notes_namespace {
            self.root.clone()
        } else {
            self.root.join(namespace)
        }
    }

    /// Folders never scanned for documents
    pub fn is_excluded(&self, path: &Path) -> bool {
        path.strip_prefix(&self.root)
            .ok()
            .and_then(|rel| rel.components().next())
            .and_then(|c| c.as_os_str().to_str())
            .map(|first| first.starts_with('.'))
            .unwrap_or(false)
    }
}
