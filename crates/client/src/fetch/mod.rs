//! Network boundary for intercepted requests.
//!
//! ### Fetcher seam
//! - `Fetcher` is the only way the engine and the lifecycle reach the network.
//! - `FetchClient` implements it on reqwest; tests substitute an in-memory stub.
//!
//! ### Buffering
//! - Bodies are read fully into `Bytes` before the response is returned.
//! - Max body bytes: 5MB (configurable)
//!
//! ### Response type
//! - `basic` when the request and final URLs share the application origin,
//!   `cors` when cross-origin with `Access-Control-Allow-Origin`, else `opaque`.
//!
//! ### Failures
//! - Timeouts come from the HTTP layer and map to `FetchTimeout`; other
//!   transport failures map to `NetworkFetch`. HTTP error statuses are
//!   ordinary responses.

pub mod request;
pub mod response;
pub mod url;

use async_trait::async_trait;
use reqwest::{Client, header};
use std::time::{Duration, Instant};

pub use request::{Destination, Request};
pub use response::{Response, ResponseType};
pub use self::url::{UrlError, canonicalize, resolve};

use offgrid_core::{AppConfig, Error};

/// Issues outbound fetches on behalf of intercepted requests.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch with the same method, URL and headers as `request`.
    async fn fetch(&self, request: &Request) -> Result<Response, Error>;
}

/// Configuration for the fetch client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Origin of the controlled application
    pub origin: ::url::Url,

    /// User agent string (default: "offgrid/0.1")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 5MB)
    pub max_bytes: usize,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl FetchConfig {
    /// Defaults for everything except the origin.
    pub fn new(origin: ::url::Url) -> Self {
        Self {
            origin,
            user_agent: "offgrid/0.1".to_string(),
            max_bytes: 5 * 1024 * 1024,
            timeout: Duration::from_millis(20000),
            max_redirects: 5,
        }
    }

    pub fn from_app(config: &AppConfig) -> Result<Self, Error> {
        let origin = config.origin_url().map_err(|e| Error::InvalidInput(e.to_string()))?;
        Ok(Self {
            origin,
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_bytes,
            timeout: config.timeout(),
            max_redirects: config.max_redirects,
        })
    }
}

/// HTTP fetch client backed by reqwest.
pub struct FetchClient {
    http: Client,
    config: FetchConfig,
}

impl FetchClient {
    /// Create a new fetch client with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::NetworkFetch(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }
}

fn transport_error(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::FetchTimeout(err.to_string())
    } else {
        Error::NetworkFetch(format!("network error: {}", err))
    }
}

#[async_trait]
impl Fetcher for FetchClient {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        let start = Instant::now();
        let url = canonicalize(&request.url)?;

        let response = self
            .http
            .request(request.method.clone(), url.clone())
            .headers(request.headers.clone())
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_bytes
        {
            return Err(Error::FetchTooLarge(format!(
                "{} bytes exceeds {}",
                len, self.config.max_bytes
            )));
        }

        let final_url = response.url().clone();
        let headers = response.headers().clone();

        let body = response.bytes().await.map_err(transport_error)?;

        if body.len() > self.config.max_bytes {
            return Err(Error::FetchTooLarge(format!(
                "{} bytes exceeds {}",
                body.len(),
                self.config.max_bytes
            )));
        }

        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let response_type = ResponseType::classify(&self.config.origin, &url, &final_url, &headers);
        let redirected = final_url != url;

        tracing::debug!(
            method = %request.method,
            url = %url,
            final_url = %final_url,
            status = status.as_u16(),
            bytes = body.len(),
            fetch_ms = start.elapsed().as_millis() as u64,
            "fetched"
        );

        Ok(Response { url: final_url, status, headers, content_type, body, response_type, redirected })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_config_defaults() {
        let config = FetchConfig::new(::url::Url::parse("http://localhost:3000").unwrap());
        assert_eq!(config.user_agent, "offgrid/0.1");
        assert_eq!(config.max_bytes, 5 * 1024 * 1024);
        assert_eq!(config.timeout, Duration::from_millis(20000));
        assert_eq!(config.max_redirects, 5);
    }

    #[test]
    fn test_fetch_config_from_app() {
        let app = AppConfig { origin: "https://todo.example.com".into(), timeout_ms: 1500, ..Default::default() };
        let config = FetchConfig::from_app(&app).unwrap();
        assert_eq!(config.origin.host_str(), Some("todo.example.com"));
        assert_eq!(config.timeout, Duration::from_millis(1500));
    }

    #[tokio::test]
    async fn test_fetch_client_new() {
        let config = FetchConfig::new(::url::Url::parse("http://localhost:3000").unwrap());
        let client = FetchClient::new(config);
        assert!(client.is_ok());
    }

    #[tokio::test]
    async fn test_fetch_rejects_non_network_scheme() {
        let client = FetchClient::new(FetchConfig::new(::url::Url::parse("http://localhost:3000").unwrap())).unwrap();
        let request = Request::get(::url::Url::parse("chrome-extension://abc/x.js").unwrap());
        let result = client.fetch(&request).await;
        assert!(matches!(result, Err(Error::UnsupportedScheme(_))));
    }
}
