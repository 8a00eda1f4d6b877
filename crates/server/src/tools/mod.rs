//! MCP tool implementations.

pub mod cache;
pub mod fetch;
pub mod lifecycle;

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use serde::Serialize;

/// Wrap a tool's output as pretty-printed JSON text.
pub(crate) fn json_result<T: Serialize>(output: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(output)
        .map_err(|e| offgrid_core::Error::InvalidInput(format!("Failed to serialize output: {e}")))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use async_trait::async_trait;
    use offgrid_client::{Fetcher, Request, Response};
    use offgrid_core::{AppConfig, CacheDb, Error};
    use rmcp::model::CallToolResult;
    use serde::de::DeserializeOwned;

    use crate::runtime::Runtime;

    /// A network that is always down.
    pub(crate) struct OfflineFetcher;

    #[async_trait]
    impl Fetcher for OfflineFetcher {
        async fn fetch(&self, request: &Request) -> Result<Response, Error> {
            Err(Error::NetworkFetch(format!("{} unreachable", request.url)))
        }
    }

    pub(crate) fn config() -> AppConfig {
        AppConfig { generation: "v1".into(), precache: Vec::new(), ..Default::default() }
    }

    pub(crate) async fn runtime() -> Runtime {
        let db = CacheDb::open_in_memory().await.unwrap();
        runtime_with(config(), db).await
    }

    pub(crate) async fn runtime_with(config: AppConfig, db: CacheDb) -> Runtime {
        Runtime::open(config, db, Arc::new(OfflineFetcher)).await.unwrap()
    }

    /// Parse the JSON text a tool returned.
    pub(crate) fn output<T: DeserializeOwned>(result: &CallToolResult) -> T {
        let content = serde_json::to_value(&result.content[0]).unwrap();
        let text = content
            .get("text")
            .and_then(|v| v.as_str())
            .expect("Expected text field in content");
        serde_json::from_str(text).unwrap()
    }
}
