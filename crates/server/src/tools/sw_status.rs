//! sw_status tool implementation.
//!
//! Reports lifecycle state, connected clients and per-cache entry counts.

use hearth_client::Worker;
use hearth_core::CacheSummary;
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Output structure for sw_status tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SwStatusOutput {
    pub state: String,
    pub generation: String,
    pub clients: usize,
    pub caches: Vec<CacheSummary>,
}

/// Implementation of the sw_status tool.
pub async fn status_impl(worker: &Worker) -> Result<CallToolResult, McpError> {
    let status = worker.status().await?;

    let output = SwStatusOutput {
        state: status.state.as_str().to_string(),
        generation: status.generation,
        clients: status.clients,
        caches: status.caches,
    };

    Ok(CallToolResult::success(vec![Content::text(
        serde_json::to_string_pretty(&output).unwrap_or_default(),
    )]))
}
