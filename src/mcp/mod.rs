//! MCP server for the knowledge base
//!
//! Exposes search, document access and indexing as tools over stdio.

mod server;

pub use server::run_mcp_server;
