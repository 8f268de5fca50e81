mod commands;
#[cfg(feature = "mcp")]
mod mcp;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "noteweave")]
#[command(about = "Local-first semantic and graph search for a Markdown vault", long_about = None)]
#[command(version)]
struct Cli {
    #[arg(short, long, global = true, help = "Debug logging")]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build semantic search index
    Index {
        #[arg(long, help = "Show index status only")]
        status: bool,
        #[arg(long, help = "Force rebuild index")]
        rebuild: bool,
        #[arg(long, short, help = "Namespace to index (default: notes)")]
        namespace: Option<String>,
        #[arg(long, help = "JSON output")]
        json: bool,
    },
    /// Hybrid (vector + graph) search
    #[command(alias = "s")]
    Search {
        query: String,
        #[arg(long, short, help = "Limit results")]
        limit: Option<usize>,
        #[arg(long, short, help = "Minimum cosine similarity")]
        threshold: Option<f32>,
        #[arg(long, short, help = "Restrict to one namespace")]
        namespace: Option<String>,
        #[arg(long, help = "Vector similarity only, no graph results")]
        vector_only: bool,
        #[arg(long, help = "JSON output")]
        json: bool,
    },
    /// Show index and graph status
    Status {
        #[arg(long, help = "JSON output")]
        json: bool,
    },
    /// Rebuild SIMILAR_TO links between documents
    Similarity {
        #[arg(long, short, help = "Namespace to link (default: notes)")]
        namespace: Option<String>,
        #[arg(long, short, help = "Minimum cosine similarity")]
        threshold: Option<f32>,
        #[arg(long, help = "Links kept per document")]
        per_document: Option<usize>,
    },
    /// Remove a document from the index and graph
    Remove {
        document: String,
        #[arg(long, short, help = "Namespace (default: notes)")]
        namespace: Option<String>,
    },

    // ===== MCP Server =====
    /// Start MCP server for Claude integration
    #[cfg(feature = "mcp")]
    Mcp {
        #[arg(long, help = "Show Claude configuration instructions")]
        install: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging; stderr keeps the MCP stdio transport clean
    let log_level = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("noteweave={}", log_level)));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Index {
            status,
            rebuild,
            namespace,
            json,
        } => commands::index::run(status, rebuild, namespace, json).await,
        Commands::Search {
            query,
            limit,
            threshold,
            namespace,
            vector_only,
            json,
        } => {
            commands::search::run(commands::search::SearchArgs {
                query,
                limit,
                threshold,
                namespace,
                vector_only,
                json,
            })
            .await
        }
        Commands::Status { json } => commands::status::run(json).await,
        Commands::Similarity {
            namespace,
            threshold,
            per_document,
        } => commands::graph::similarity(namespace, threshold, per_document).await,
        Commands::Remove {
            document,
            namespace,
        } => commands::graph::remove(&document, namespace).await,

        // MCP Server
        #[cfg(feature = "mcp")]
        Commands::Mcp { install } => {
            if install {
                print_mcp_install_instructions();
                Ok(())
            } else {
                mcp::run_mcp_server(std::env::current_dir()?).await
            }
        }
    }
}

#[cfg(feature = "mcp")]
fn print_mcp_install_instructions() {
    use colored::Colorize;

    let vault_path = std::env::current_dir()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|_| "/path/to/your/vault".to_string());

    let binary_path = std::env::current_exe()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|_| "noteweave".to_string());

    println!("{}", "MCP Server Installation Guide".bold().cyan());
    println!();
    println!("Add the following to your MCP client configuration:");
    println!();
    println!(r#"{{
  "mcpServers": {{
    "noteweave": {{
      "command": "{}",
      "args": ["mcp"],
      "cwd": "{}"
    }}
  }}
}}"#, binary_path, vault_path);
    println!();
    println!("{}", "Available tools:".bold());
    println!("  • {} - Vector similarity search in one namespace", "kb_search".green());
    println!("  • {} - Vector + graph search", "kb_hybrid_search".green());
    println!("  • {} - Document content, entities and similar documents", "kb_get_document".green());
    println!("  • {} - Pending documents and store counts", "kb_index_status".green());
    println!("  • {} - Index new or all documents", "kb_reindex".green());
}
