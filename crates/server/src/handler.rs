//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the appropriate implementations.
use std::sync::Arc;

use crate::runtime::Runtime;
use crate::tools::cache::{CacheKeysParams, CachePurgeParams, keys_impl, purge_impl};
use crate::tools::fetch::{CacheFetchParams, fetch_impl};
use crate::tools::lifecycle::{PostMessageParams, post_message_impl, status_impl};

use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};

/// The main MCP server handler for offgrid.
#[derive(Clone)]
pub struct OffgridServer {
    tool_router: ToolRouter<Self>,
    runtime: Arc<Runtime>,
}

#[tool_router]
impl OffgridServer {
    pub fn new(runtime: Arc<Runtime>) -> Self {
        Self { tool_router: Self::tool_router(), runtime }
    }

    #[tool(
        description = "Issue one application request through the offline cache. Returns status, headers, body and whether it came from cache, network, fallback or pass-through."
    )]
    async fn cache_fetch(&self, params: Parameters<CacheFetchParams>) -> Result<CallToolResult, McpError> {
        fetch_impl(&self.runtime, params.0).await
    }

    #[tool(description = "Report the lifecycle state, the current and controlling generations, and every stored generation.")]
    async fn lifecycle_status(&self) -> Result<CallToolResult, McpError> {
        status_impl(&self.runtime).await
    }

    #[tool(description = "Post a control message to the lifecycle, e.g. {\"type\": \"SKIP_WAITING\"}.")]
    async fn post_message(&self, params: Parameters<PostMessageParams>) -> Result<CallToolResult, McpError> {
        post_message_impl(&self.runtime, params.0)
    }

    #[tool(description = "List the cache keys stored in a generation (default: current).")]
    async fn cache_keys(&self, params: Parameters<CacheKeysParams>) -> Result<CallToolResult, McpError> {
        keys_impl(&self.runtime, params.0).await
    }

    #[tool(description = "Delete one stored generation other than the current one.")]
    async fn cache_purge(&self, params: Parameters<CachePurgeParams>) -> Result<CallToolResult, McpError> {
        purge_impl(&self.runtime, params.0).await
    }
}

impl ServerHandler for OffgridServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "offgrid".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}
