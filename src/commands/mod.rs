pub mod graph;
pub mod index;
pub mod search;
pub mod status;

use anyhow::{Context, Result};

use noteweave::{EngineConfig, RetrievalEngine, VaultPaths};

/// Engine for the vault in the current directory
pub fn open_engine() -> Result<(VaultPaths, RetrievalEngine)> {
    let paths = VaultPaths::current().context("Failed to resolve vault directory")?;
    let config = EngineConfig::load(&paths)
        .with_context(|| format!("Failed to load {}", paths.config_file.display()))?;
    let engine = RetrievalEngine::for_vault(config, &paths);
    Ok((paths, engine))
}

/// Truncate for display (char-aware for Unicode)
pub fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max_chars).collect::<String>())
    }
}
