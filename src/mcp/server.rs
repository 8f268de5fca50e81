//! Knowledge base MCP server implementation

use anyhow::{Context, Result};
use rmcp::{
    handler::server::{tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler, ServiceExt,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use noteweave::graph::{EntityNode, GraphHit};
use noteweave::{normalize_document_id, EngineConfig, RetrievalEngine, VaultPaths};

const MAX_LIMIT: usize = 100;

/// Parameters for kb_search and kb_hybrid_search
#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchParams {
    /// Natural language search query (e.g., "GPU memory sharing methods")
    #[schemars(description = "Natural language search query")]
    pub query: String,
    #[schemars(description = "Maximum number of results (default: 5, max: 100)")]
    #[serde(default)]
    pub limit: Option<usize>,
    #[schemars(description = "Restrict to one namespace (default: all for hybrid, notes for vector)")]
    #[serde(default)]
    pub namespace: Option<String>,
    #[schemars(description = "Minimum cosine similarity in [-1, 1]")]
    #[serde(default)]
    pub threshold: Option<f32>,
}

/// Parameters for kb_get_document
#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetDocumentParams {
    #[schemars(description = "Vault-relative path of the document (e.g., Notes/gpu.md)")]
    pub document: String,
}

/// Parameters for kb_index_status and kb_reindex
#[derive(Debug, Deserialize, JsonSchema)]
pub struct NamespaceParams {
    #[schemars(description = "Namespace to inspect or index (default: notes)")]
    #[serde(default)]
    pub namespace: Option<String>,
    #[schemars(description = "Re-embed every document, not only new ones")]
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DocumentJson {
    document_id: String,
    content: String,
    entities: Vec<EntityNode>,
    similar: Vec<GraphHit>,
}

/// Knowledge base MCP service
#[derive(Clone)]
pub struct KnowledgeService {
    engine: Arc<RetrievalEngine>,
    tool_router: ToolRouter<Self>,
}

impl KnowledgeService {
    pub fn new(engine: Arc<RetrievalEngine>) -> Self {
        Self {
            engine,
            tool_router: Self::tool_router(),
        }
    }

    /// Clamp limit: default from config, max 100
    fn limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.engine.config().search.default_limit)
            .clamp(1, MAX_LIMIT)
    }

    fn namespace(&self, requested: Option<String>) -> String {
        requested.unwrap_or_else(|| self.engine.config().notes_namespace.clone())
    }
}

fn internal(context: &str, err: impl std::fmt::Display) -> McpError {
    McpError::internal_error(format!("{}: {}", context, err), None)
}

fn json_result<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    let output = serde_json::to_string_pretty(value)
        .map_err(|e| internal("JSON serialization failed", e))?;
    Ok(CallToolResult::success(vec![Content::text(output)]))
}

#[tool_router]
impl KnowledgeService {
    /// Vector similarity search in one namespace
    #[tool(description = "Search the knowledge base by semantic similarity within one namespace. Returns document IDs with cosine similarity scores.")]
    async fn kb_search(&self, params: Parameters<SearchParams>) -> Result<CallToolResult, McpError> {
        let params = params.0;
        let limit = self.limit(params.limit);
        let namespace = self.namespace(params.namespace);

        let query = self
            .engine
            .embed_query(&params.query)
            .await
            .map_err(|e| internal("Embedding failed", e))?;
        let results = self
            .engine
            .search(&namespace, &query, limit, None, params.threshold)
            .await
            .map_err(|e| internal("Search failed", e))?;

        json_result(&results)
    }

    /// Hybrid vector + graph search
    #[tool(description = "Search the knowledge base by meaning and by relationship. Vector hits come first; graph hits (isGraphResult) add related documents found through shared entities.")]
    async fn kb_hybrid_search(
        &self,
        params: Parameters<SearchParams>,
    ) -> Result<CallToolResult, McpError> {
        let params = params.0;
        let limit = self.limit(params.limit);
        let threshold = params
            .threshold
            .unwrap_or(self.engine.config().search.threshold);

        let query = self
            .engine
            .embed_query(&params.query)
            .await
            .map_err(|e| internal("Embedding failed", e))?;
        let hits = self
            .engine
            .hybrid_search(&params.query, &query, params.namespace.as_deref(), threshold, limit)
            .await
            .map_err(|e| internal("Search failed", e))?;

        json_result(&hits)
    }

    /// Full content of a document with its graph neighbourhood
    #[tool(description = "Get the full content of a document together with its extracted entities and most similar documents.")]
    async fn kb_get_document(
        &self,
        params: Parameters<GetDocumentParams>,
    ) -> Result<CallToolResult, McpError> {
        let reference = params.0.document;
        let content = self
            .engine
            .content(&reference)
            .await
            .map_err(|e| McpError::invalid_params(format!("Document not found: {}", e), None))?;

        let document_id = normalize_document_id(&reference);
        let entities = self.engine.graph().document_entities(&document_id).await;
        let similar = self.engine.graph().similar_documents(&document_id, 5).await;

        json_result(&DocumentJson {
            document_id,
            content,
            entities,
            similar,
        })
    }

    /// Index state of a namespace
    #[tool(description = "Report collections, graph counts and how many documents of a namespace still need indexing.")]
    async fn kb_index_status(
        &self,
        params: Parameters<NamespaceParams>,
    ) -> Result<CallToolResult, McpError> {
        let namespace = self.namespace(params.0.namespace);
        let plan = self
            .engine
            .get_notes_needing_indexing(&namespace)
            .await
            .map_err(|e| internal("Listing failed", e))?;
        let status = self
            .engine
            .status()
            .await
            .map_err(|e| internal("Status failed", e))?;

        json_result(&serde_json::json!({
            "namespace": namespace,
            "total": plan.total,
            "indexed": plan.already_indexed.len(),
            "pending": plan.needs_indexing.iter().map(|d| &d.id).collect::<Vec<_>>(),
            "status": status,
        }))
    }

    /// Index new (or all) documents of a namespace
    #[tool(description = "Index documents of a namespace that are not yet indexed, or all of them with force=true.")]
    async fn kb_reindex(&self, params: Parameters<NamespaceParams>) -> Result<CallToolResult, McpError> {
        let namespace = self.namespace(params.0.namespace);
        let stats = self
            .engine
            .index_namespace(&namespace, params.0.force)
            .await
            .map_err(|e| internal("Indexing failed", e))?;

        json_result(&stats)
    }
}

#[tool_handler]
impl ServerHandler for KnowledgeService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "noteweave knowledge base. Semantic and graph-aware search over a Markdown vault.".to_string(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

/// Run the MCP server
pub async fn run_mcp_server(vault_path: PathBuf) -> Result<()> {
    use tokio::io::{stdin, stdout};

    let paths = VaultPaths::from_root(vault_path);
    let config = EngineConfig::load(&paths).context("Failed to load config")?;
    let engine = Arc::new(RetrievalEngine::for_vault(config, &paths));
    engine.initialize().await.context("Failed to open index")?;

    info!(vault = %paths.root.display(), "Starting MCP server on stdio");
    let service = KnowledgeService::new(Arc::clone(&engine));
    let transport = (stdin(), stdout());
    let server = service.serve(transport).await?;
    server.waiting().await?;

    engine.close().await;
    Ok(())
}
