//! cache_keys tool implementation.
//!
//! Lists the keys stored in one generation, in first-write order.

use offgrid_core::CacheStore;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ToolError;
use crate::runtime::Runtime;
use crate::tools::json_result;

/// Parameters for the cache_keys tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CacheKeysParams {
    /// Generation to list (default: current).
    #[serde(default)]
    pub generation: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheKeysOutput {
    pub generation: String,
    pub keys: Vec<String>,
}

pub async fn keys_impl(runtime: &Runtime, params: CacheKeysParams) -> Result<CallToolResult, McpError> {
    let generation = match params.generation {
        Some(generation) if generation.trim().is_empty() => {
            return Err(ToolError::InvalidInput("generation cannot be empty".into()).into());
        }
        Some(generation) => generation,
        None => runtime.generation().to_string(),
    };

    let keys = runtime.db.keys_of(&generation).await?;
    json_result(&CacheKeysOutput { generation, keys })
}
