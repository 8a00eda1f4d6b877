//! cache_purge tool implementation.
//!
//! Deletes one stale generation by hand. The configured generation and the
//! one still serving requests are refused.

use offgrid_core::CacheStore;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ToolError;
use crate::runtime::Runtime;
use crate::tools::json_result;

/// Parameters for the cache_purge tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CachePurgeParams {
    /// The generation to delete.
    pub generation: String,
}

/// Output from the cache_purge tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CachePurgeOutput {
    /// Number of entries deleted.
    pub deleted: u64,
}

pub async fn purge_impl(runtime: &Runtime, params: CachePurgeParams) -> Result<CallToolResult, McpError> {
    let generation = params.generation.trim();
    if generation.is_empty() {
        return Err(ToolError::InvalidInput("generation cannot be empty".into()).into());
    }
    if generation == runtime.generation() || runtime.serving_generation() == Some(generation) {
        return Err(ToolError::PurgeRefused(generation.to_string()).into());
    }

    let deleted = runtime.db.delete_generation(generation).await?;
    tracing::info!(generation, deleted, "purged generation");

    json_result(&CachePurgeOutput { deleted })
}
