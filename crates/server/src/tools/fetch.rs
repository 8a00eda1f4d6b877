//! cache_fetch tool implementation.
//!
//! Issues one request as the controlled application would and reports where
//! the answer came from.

use std::collections::BTreeMap;

use offgrid_client::{Request, Source, fetch::resolve};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;
use crate::runtime::Runtime;

/// Parameters for the cache_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheFetchParams {
    /// Absolute URL, or a path resolved against the application origin.
    pub url: String,

    /// HTTP method (default: GET).
    #[serde(default = "default_method")]
    pub method: String,

    /// Request destination; "document" marks a top-level navigation.
    #[serde(default)]
    pub destination: String,

    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

fn default_method() -> String {
    "GET".into()
}

/// Output from the cache_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheFetchOutput {
    /// Final URL of the response.
    pub url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub headers: Vec<(String, String)>,
    /// Body as text (lossy for binary content).
    pub body: String,
    pub body_bytes: usize,
    /// One of cache, network, fallback, pass_through.
    pub source: String,
    /// Generation that answered, or none when nothing is active yet.
    pub generation: Option<String>,
}

pub async fn fetch_impl(runtime: &Runtime, params: CacheFetchParams) -> Result<CallToolResult, McpError> {
    let origin = &runtime.engine.settings().origin;
    let url = resolve(&params.url, origin).map_err(offgrid_core::Error::from)?;
    let headers = params.headers.iter().map(|(k, v)| (k.as_str(), v.as_str()));
    let request = Request::from_parts(&params.method, url, &params.destination, headers)?;

    let served = runtime.handle(&request).await?;
    let response = served.response;

    let output = CacheFetchOutput {
        url: response.url.to_string(),
        status: response.status.as_u16(),
        content_type: response.content_type.clone(),
        headers: response
            .headers
            .iter()
            .filter_map(|(name, value)| Some((name.as_str().to_string(), value.to_str().ok()?.to_string())))
            .collect(),
        body: String::from_utf8_lossy(&response.body).into_owned(),
        body_bytes: response.body.len(),
        source: source_name(served.source).into(),
        generation: runtime.serving_generation().map(str::to_string),
    };

    json_result(&output)
}

fn source_name(source: Source) -> &'static str {
    match source {
        Source::Cache => "cache",
        Source::Network => "network",
        Source::Fallback => "fallback",
        Source::PassThrough => "pass_through",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::{self, output, runtime, runtime_with};
    use offgrid_client::LifecycleState;
    use offgrid_core::{AppConfig, CacheDb, CacheEntry, CacheStore};

    fn params(url: &str, destination: &str) -> CacheFetchParams {
        CacheFetchParams {
            url: url.into(),
            method: default_method(),
            destination: destination.into(),
            headers: BTreeMap::new(),
        }
    }

    async fn seed(runtime: &Runtime, path: &str, body: &str) {
        seed_into(&runtime.db, runtime.generation(), path, body).await;
    }

    async fn seed_into(db: &CacheDb, generation: &str, path: &str, body: &str) {
        let url = resolve(path, &testing::config().origin_url().unwrap()).unwrap();
        let key = Request::get(url.clone()).cache_key().unwrap();
        let entry = CacheEntry {
            key,
            method: "GET".into(),
            url: url.to_string(),
            status_code: 200,
            content_type: Some("text/html".into()),
            headers: vec![("content-type".into(), "text/html".into())],
            body: body.as_bytes().to_vec(),
            stored_at: "2026-01-01T00:00:00Z".into(),
        };
        db.put(generation, &entry).await.unwrap();
    }

    #[tokio::test]
    async fn test_previous_generation_serves_while_install_fails() {
        let db = CacheDb::open_in_memory().await.unwrap();
        seed_into(&db, "v1", "/index.html", "<html>v1 shell</html>").await;
        seed_into(&db, "v1", "/data.json", "v1 data").await;
        db.mark_active("v1").await.unwrap();

        let config = AppConfig { generation: "v2".into(), precache: vec!["/".into()], ..testing::config() };
        let runtime = runtime_with(config, db).await;
        assert!(runtime.controller.run().await.is_err());
        assert_eq!(runtime.controller.state(), LifecycleState::Installing);

        let result = fetch_impl(&runtime, params("/index.html", "document")).await.unwrap();
        let out: CacheFetchOutput = output(&result);
        assert_eq!(out.source, "cache");
        assert_eq!(out.body, "<html>v1 shell</html>");
        assert_eq!(out.generation.as_deref(), Some("v1"));

        let result = fetch_impl(&runtime, params("/todos/7", "document")).await.unwrap();
        let out: CacheFetchOutput = output(&result);
        assert_eq!(out.source, "fallback");

        let out: CacheFetchOutput = output(&fetch_impl(&runtime, params("/data.json", "")).await.unwrap());
        assert_eq!(out.body, "v1 data");
    }

    #[tokio::test]
    async fn test_restart_offline_keeps_serving_same_generation() {
        let db = CacheDb::open_in_memory().await.unwrap();
        seed_into(&db, "v1", "/index.html", "<html>shell</html>").await;
        db.mark_active("v1").await.unwrap();

        let config = AppConfig { precache: vec!["/index.html".into()], ..testing::config() };
        let runtime = runtime_with(config, db).await;
        assert!(runtime.controller.run().await.is_err());

        let out: CacheFetchOutput = output(&fetch_impl(&runtime, params("/index.html", "")).await.unwrap());
        assert_eq!(out.source, "cache");
        assert_eq!(out.body, "<html>shell</html>");
    }

    #[tokio::test]
    async fn test_new_generation_takes_over_once_active() {
        let db = CacheDb::open_in_memory().await.unwrap();
        seed_into(&db, "v1", "/index.html", "<html>v1</html>").await;
        db.mark_active("v1").await.unwrap();

        let runtime = runtime_with(AppConfig { generation: "v2".into(), ..testing::config() }, db).await;
        seed(&runtime, "/index.html", "<html>v2</html>").await;
        assert_eq!(runtime.serving_generation(), Some("v1"));

        runtime.controller.run().await.unwrap();
        assert_eq!(runtime.serving_generation(), Some("v2"));

        let out: CacheFetchOutput = output(&fetch_impl(&runtime, params("/index.html", "")).await.unwrap());
        assert_eq!(out.body, "<html>v2</html>");
        assert_eq!(out.generation.as_deref(), Some("v2"));
        assert_eq!(runtime.db.active_generation().await.unwrap().as_deref(), Some("v2"));
    }

    #[tokio::test]
    async fn test_nothing_activated_goes_to_network() {
        let runtime = runtime().await;
        seed(&runtime, "/index.html", "<html>never activated</html>").await;

        let result = fetch_impl(&runtime, params("/index.html", "")).await;
        assert!(result.is_err());
        assert_eq!(runtime.serving_generation(), None);
    }

    #[tokio::test]
    async fn test_serves_from_cache_when_active() {
        let runtime = runtime().await;
        runtime.controller.run().await.unwrap();
        seed(&runtime, "/index.html", "<html>cached</html>").await;

        let result = fetch_impl(&runtime, params("/index.html", "")).await.unwrap();
        let out: CacheFetchOutput = output(&result);
        assert_eq!(out.source, "cache");
        assert_eq!(out.status, 200);
        assert_eq!(out.body, "<html>cached</html>");
        assert_eq!(out.generation.as_deref(), Some("v1"));
    }

    #[tokio::test]
    async fn test_offline_navigation_gets_fallback() {
        let runtime = runtime().await;
        runtime.controller.run().await.unwrap();
        seed(&runtime, "/index.html", "<html>shell</html>").await;

        let result = fetch_impl(&runtime, params("/todos/42", "document")).await.unwrap();
        let out: CacheFetchOutput = output(&result);
        assert_eq!(out.source, "fallback");
        assert_eq!(out.body, "<html>shell</html>");
    }

    #[tokio::test]
    async fn test_rejects_bad_method() {
        let runtime = runtime().await;
        let mut p = params("/", "");
        p.method = "NOT VALID".into();
        assert!(fetch_impl(&runtime, p).await.is_err());
    }
}
