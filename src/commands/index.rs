//! Index command - Build semantic search index

use anyhow::{Context, Result};
use colored::Colorize;

use super::open_engine;

const PENDING_PREVIEW: usize = 10;

/// Run index command
pub async fn run(status_only: bool, rebuild: bool, namespace: Option<String>, json: bool) -> Result<()> {
    let (_paths, engine) = open_engine()?;
    let namespace = namespace.unwrap_or_else(|| engine.config().notes_namespace.clone());

    engine.initialize().await.context("Failed to open index")?;

    if status_only {
        return show_plan(&engine, &namespace, json).await;
    }

    // Drop the namespace if rebuild requested
    if rebuild {
        let removed = engine.remove_namespace(&namespace).await?;
        if !json {
            println!("{} Removed {} existing embeddings", "→".dimmed(), removed);
        }
    }

    if !json {
        println!("{} Building search index for {}...", "→".dimmed(), namespace.cyan());
    }

    let stats = engine.index_namespace(&namespace, rebuild).await?;
    engine.close().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!();
        println!(
            "{} Indexed {} notes in {:.2}s",
            "✓".green().bold(),
            stats.indexed.to_string().cyan(),
            stats.duration_ms as f64 / 1000.0
        );
        if stats.skipped > 0 {
            println!("  {} {} notes already up to date", "→".dimmed(), stats.skipped);
        }
        if stats.failed > 0 {
            println!("  {} {} notes failed", "✗".red(), stats.failed);
        }
        println!(
            "  {} Index saved to: {}",
            "→".dimmed(),
            engine.vectors().path().display()
        );
    }

    Ok(())
}

/// Show what an index run would do
async fn show_plan(engine: &noteweave::RetrievalEngine, namespace: &str, json: bool) -> Result<()> {
    let plan = engine.get_notes_needing_indexing(namespace).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    println!("{}", "Index Status".bold());
    println!();
    println!("  {} Namespace: {}", "→".dimmed(), namespace.cyan());
    println!("  {} {} documents", "→".dimmed(), plan.total.to_string().cyan());
    println!(
        "  {} {} indexed",
        "→".dimmed(),
        plan.already_indexed.len().to_string().green()
    );

    if plan.needs_indexing.is_empty() {
        println!("  {} Nothing to index", "✓".green());
    } else {
        println!(
            "  {} {} need indexing",
            "!".yellow().bold(),
            plan.needs_indexing.len().to_string().yellow()
        );
        for doc in plan.needs_indexing.iter().take(PENDING_PREVIEW) {
            println!("      {}", doc.id.dimmed());
        }
        if plan.needs_indexing.len() > PENDING_PREVIEW {
            println!(
                "      {}",
                format!("... and {} more", plan.needs_indexing.len() - PENDING_PREVIEW).dimmed()
            );
        }
    }

    Ok(())
}
