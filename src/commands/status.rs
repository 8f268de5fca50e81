use anyhow::Result;
use colored::*;
use serde::Serialize;

use noteweave::search::EngineStatus;

use super::open_engine;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IndexStatus {
    #[serde(flatten)]
    engine: EngineStatus,
    namespace: String,
    pending: usize,
    total: usize,
}

pub async fn run(json: bool) -> Result<()> {
    let (_paths, engine) = open_engine()?;
    engine.initialize().await?;

    let namespace = engine.config().notes_namespace.clone();
    let plan = engine.get_notes_needing_indexing(&namespace).await?;
    let status = IndexStatus {
        engine: engine.status().await?,
        namespace,
        pending: plan.needs_indexing.len(),
        total: plan.total,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("{}", "Knowledge Base Status".bold());
    println!("{}", "=".repeat(60));
    println!();

    println!("{}", "Collections".bold());
    if status.engine.collections.is_empty() {
        println!("  {}", "(none)".dimmed());
    }
    for collection in &status.engine.collections {
        println!(
            "  {} {} records, dimension {}",
            format!("{:<20}", collection.name).cyan(),
            collection.records,
            collection.dimension
        );
    }
    println!();

    println!("{}", "Graph".bold());
    if status.engine.graph_available {
        let graph = &status.engine.graph;
        println!("  Documents:      {}", graph.documents);
        println!("  Entities:       {}", graph.entities);
        println!("  Relationships:  {}", graph.relationships);
        println!("  Similarities:   {}", graph.similarities);
    } else {
        println!("  {}", "unavailable (vector search only)".yellow());
    }
    println!();

    println!("{}", "Indexing".bold());
    if status.pending > 0 {
        println!(
            "  {} {} of {} documents in {} need indexing",
            "!".yellow().bold(),
            status.pending,
            status.total,
            status.namespace.cyan()
        );
    } else {
        println!("  {} All {} documents indexed", "✓".green(), status.total);
    }
    if let Some(ts) = status.engine.last_full_index {
        let dt = chrono::DateTime::from_timestamp(ts, 0)
            .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "Unknown".to_string());
        println!("  {} Last indexed: {}", "→".dimmed(), dt);
    }

    Ok(())
}
