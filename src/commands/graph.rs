//! Graph maintenance commands: similarity sweep and document removal

use anyhow::Result;
use colored::Colorize;

use super::open_engine;

/// Rebuild SIMILAR_TO relationships for a namespace
pub async fn similarity(
    namespace: Option<String>,
    threshold: Option<f32>,
    per_document: Option<usize>,
) -> Result<()> {
    let (_paths, engine) = open_engine()?;
    engine.initialize().await?;

    let config = &engine.config().graph;
    let namespace = namespace.unwrap_or_else(|| engine.config().notes_namespace.clone());
    let threshold = threshold.unwrap_or(config.similarity_threshold);
    let per_document = per_document.unwrap_or(config.similarity_per_document);

    if !engine.graph().is_available().await {
        anyhow::bail!("Knowledge graph is unavailable");
    }

    println!(
        "{} Linking similar documents in {} (threshold {:.2}, top {})...",
        "→".dimmed(),
        namespace.cyan(),
        threshold,
        per_document
    );
    let processed = engine.build_similarity_with(&namespace, threshold, per_document).await;
    let stats = engine.graph().stats().await;

    println!(
        "{} Processed {} documents, {} similarity links",
        "✓".green().bold(),
        processed.to_string().cyan(),
        stats.similarities
    );
    Ok(())
}

/// Remove one document from the vector index and the graph
pub async fn remove(document: &str, namespace: Option<String>) -> Result<()> {
    let (_paths, engine) = open_engine()?;
    engine.initialize().await?;

    let namespace = namespace.unwrap_or_else(|| engine.config().notes_namespace.clone());
    if engine.remove_document(document, &namespace).await? {
        println!("{} Removed {}", "✓".green().bold(), document.cyan());
    } else {
        println!("{} {} was not indexed", "→".dimmed(), document.cyan());
    }
    Ok(())
}
