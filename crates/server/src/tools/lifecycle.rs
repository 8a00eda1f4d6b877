//! lifecycle_status and post_message tools.

use offgrid_core::GenerationInfo;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;
use crate::runtime::Runtime;

/// Output from the lifecycle_status tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct LifecycleStatusOutput {
    /// installing, waiting, activating or active.
    pub state: String,
    pub generation: String,
    /// Generation answering requests right now; the last activated one until this one is active.
    pub serving: Option<String>,
    /// Origin of the controlled application.
    pub origin: String,
    /// Generation currently controlling open clients, if any has claimed them.
    pub controller: Option<String>,
    pub open_clients: usize,
    pub generations: Vec<GenerationInfo>,
}

pub async fn status_impl(runtime: &Runtime) -> Result<CallToolResult, McpError> {
    let controller = &runtime.controller;
    let output = LifecycleStatusOutput {
        state: controller.state().to_string(),
        generation: controller.generation().to_string(),
        serving: runtime.serving_generation().map(str::to_string),
        origin: runtime.config.origin.clone(),
        controller: controller.clients().controller(),
        open_clients: controller.clients().open_count(),
        generations: runtime.db.generation_info().await?,
    };

    json_result(&output)
}

/// Parameters for the post_message tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PostMessageParams {
    /// Message body, e.g. {"type": "SKIP_WAITING"}.
    pub message: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PostMessageOutput {
    /// False when the message was not recognized and was ignored.
    pub delivered: bool,
}

pub fn post_message_impl(runtime: &Runtime, params: PostMessageParams) -> Result<CallToolResult, McpError> {
    let delivered = runtime.controller.control().post(&params.message);
    json_result(&PostMessageOutput { delivered })
}
