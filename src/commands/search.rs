//! Search command - vector or hybrid search over the index

use anyhow::{Context, Result};
use colored::{ColoredString, Colorize};

use super::{open_engine, truncate};

pub struct SearchArgs {
    pub query: String,
    pub limit: Option<usize>,
    pub threshold: Option<f32>,
    pub namespace: Option<String>,
    pub vector_only: bool,
    pub json: bool,
}

pub async fn run(args: SearchArgs) -> Result<()> {
    let (_paths, engine) = open_engine()?;
    let limit = args.limit.unwrap_or(engine.config().search.default_limit);
    let threshold = args.threshold.unwrap_or(engine.config().search.threshold);

    engine.initialize().await.context("Failed to open index")?;
    let query_vector = engine
        .embed_query(&args.query)
        .await
        .context("Failed to embed query")?;

    if args.vector_only {
        let namespace = args
            .namespace
            .clone()
            .unwrap_or_else(|| engine.config().notes_namespace.clone());
        let results = engine
            .search(&namespace, &query_vector, limit, None, Some(threshold))
            .await?;

        if args.json {
            println!("{}", serde_json::to_string_pretty(&results)?);
            return Ok(());
        }
        if results.is_empty() {
            println!("{} No results found for: {}", "→".dimmed(), args.query.cyan());
            return Ok(());
        }

        println!("{} {} results for: {}", "→".dimmed(), results.len(), args.query.cyan());
        println!();
        for (i, result) in results.iter().enumerate() {
            let title = result
                .metadata
                .as_ref()
                .and_then(|m| m.get("title"))
                .and_then(|t| t.as_str())
                .unwrap_or(&result.document_id);
            println!(
                "{}. [{}] {}",
                (i + 1).to_string().bold(),
                colored_similarity(result.similarity),
                title.cyan()
            );
            println!("   {}", result.document_id.dimmed());
        }
        return Ok(());
    }

    let hits = engine
        .hybrid_search(&args.query, &query_vector, args.namespace.as_deref(), threshold, limit)
        .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&hits)?);
        return Ok(());
    }
    if hits.is_empty() {
        println!("{} No results found for: {}", "→".dimmed(), args.query.cyan());
        return Ok(());
    }

    println!("{} {} results for: {}", "→".dimmed(), hits.len(), args.query.cyan());
    println!();
    for (i, hit) in hits.iter().enumerate() {
        let score = if hit.is_graph_result {
            format!("graph {}", hit.score).magenta()
        } else {
            colored_similarity(hit.score)
        };
        println!(
            "{}. [{}] {} {}",
            (i + 1).to_string().bold(),
            score,
            truncate(&hit.document_id, 80).cyan(),
            format!("({})", hit.namespace_id).dimmed()
        );
    }

    Ok(())
}

fn colored_similarity(score: f32) -> ColoredString {
    let score_str = format!("{:.2}", score);
    if score > 0.8 {
        score_str.green()
    } else if score > 0.6 {
        score_str.yellow()
    } else {
        score_str.dimmed()
    }
}
