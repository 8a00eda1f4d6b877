//! Errors raised by the tool layer itself.
//!
//! Cache and network failures arrive as `offgrid_core::Error` and have their
//! own mapping; these cover requests the tools refuse outright.

use rmcp::model::{ErrorCode, ErrorData as McpError};

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// Invalid tool parameters (e.g., an empty generation id).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// The generation serving requests cannot be purged by hand.
    #[error("PURGE_REFUSED: {0} is in use")]
    PurgeRefused(String),
}

impl From<ToolError> for McpError {
    fn from(err: ToolError) -> Self {
        let code = match &err {
            ToolError::InvalidInput(_) => -32602,
            ToolError::PurgeRefused(_) => -32016,
        };

        McpError { code: ErrorCode(code), message: err.to_string().into(), data: None }
    }
}
