//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the appropriate implementations.
use std::sync::Arc;

use crate::tools::sw_fetch::{SwFetchParams, fetch_impl};
use crate::tools::sw_post_message::{SwPostMessageParams, post_message_impl};
use crate::tools::sw_status::status_impl;

use hearth_client::{CoordinationClient, Worker, WorkerHandle};
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
use tokio::sync::Mutex;

/// The main MCP server handler for hearth.
#[derive(Clone)]
pub struct HearthServer {
    worker: Arc<Worker>,
    /// The host's own foreground client.
    client: Arc<Mutex<CoordinationClient>>,
    tool_router: ToolRouter<Self>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl HearthServer {
    /// Create a new server handler connected to a running worker.
    pub async fn new(handle: &WorkerHandle) -> Self {
        Self {
            worker: Arc::clone(handle.worker()),
            client: Arc::new(Mutex::new(handle.connect().await)),
            tool_router: Self::tool_router(),
        }
    }

    /// Route a request through the worker.
    ///
    /// The response comes from the network, a cache, the precache or the
    /// offline page depending on the matched route and connectivity.
    #[tool(
        description = "Route a request through the offline cache worker. Returns status, headers, body and where the response came from (network, cache, precache, fallback)."
    )]
    async fn sw_fetch(&self, params: Parameters<SwFetchParams>) -> Result<CallToolResult, McpError> {
        fetch_impl(&self.worker, params.0).await
    }

    #[tool(
        description = "Post a control message (CLEAR_ONBOARDING_CACHE, CLEAR_ALL_CACHES, SKIP_WAITING) to the worker and wait for its acknowledgement."
    )]
    async fn sw_post_message(&self, params: Parameters<SwPostMessageParams>) -> Result<CallToolResult, McpError> {
        post_message_impl(&self.worker, &self.client, params.0).await
    }

    #[tool(description = "Report the worker's lifecycle state, connected clients and entry counts per cache.")]
    async fn sw_status(&self) -> Result<CallToolResult, McpError> {
        status_impl(&self.worker).await
    }
}

impl ServerHandler for HearthServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "hearth".into(),
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
