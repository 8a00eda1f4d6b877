//! Per-request interception: classify, look up, fetch, store, fall back.
//!
//! ### Cache-first
//! - A hit in the current generation is returned as-is: no network call and
//!   no freshness check. Entries live until their generation is deleted.
//! - On a miss the request goes to the network. A same-origin, non-redirected
//!   `basic` 200 is copied into the store before it is returned; anything
//!   else is returned untouched.
//!
//! ### Failures
//! - Store reads that fail count as misses.
//! - Store writes that fail are logged; the caller still gets the response.
//! - A failed fetch for a `document` navigation is answered with the cached
//!   fallback document if there is one. Sub-resource failures propagate.
//!
//! ### Concurrency
//! - Each request is independent; the store is the only shared state.
//!   Concurrent writes of the same key are last-write-wins.
//! - A store write runs on its own task so it completes even if the caller's
//!   future is dropped.

use std::sync::Arc;

use offgrid_core::{AppConfig, CacheStore, DocumentStrategy, Error, VersionManager, compute_cache_key};
use reqwest::Method;
use serde::Serialize;
use url::Url;

use crate::classify::{InterceptionDecision, RequestClassifier};
use crate::fetch::{Fetcher, Request, Response, canonicalize};

/// Where an intercepted response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Cache,
    Network,
    Fallback,
    PassThrough,
}

/// Response plus provenance.
#[derive(Debug, Clone)]
pub struct Intercepted {
    pub response: Response,
    pub source: Source,
}

/// Origin-level settings for an engine.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub origin: Url,
    pub fallback_document: Url,
    pub document_strategy: DocumentStrategy,
}

impl EngineSettings {
    pub fn from_config(config: &AppConfig) -> Result<Self, Error> {
        let invalid = |e: offgrid_core::ConfigError| Error::InvalidInput(e.to_string());
        Ok(Self {
            origin: config.origin_url().map_err(invalid)?,
            fallback_document: config.fallback_url().map_err(invalid)?,
            document_strategy: config.document_strategy,
        })
    }
}

/// Routes eligible requests through the current cache generation.
pub struct InterceptionEngine {
    store: Arc<dyn CacheStore>,
    fetcher: Arc<dyn Fetcher>,
    versions: VersionManager,
    classifier: RequestClassifier,
    settings: EngineSettings,
    fallback_key: String,
}

impl InterceptionEngine {
    pub fn new(
        store: Arc<dyn CacheStore>, fetcher: Arc<dyn Fetcher>, versions: VersionManager,
        classifier: RequestClassifier, settings: EngineSettings,
    ) -> Result<Self, Error> {
        let fallback = canonicalize(&settings.fallback_document)?;
        let fallback_key = compute_cache_key(Method::GET.as_str(), fallback.as_str());
        Ok(Self { store, fetcher, versions, classifier, settings, fallback_key })
    }

    /// Build an engine for `config.generation`.
    pub fn from_config(
        config: &AppConfig, store: Arc<dyn CacheStore>, fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self, Error> {
        let versions = VersionManager::new(config.generation.clone(), Arc::clone(&store));
        let classifier = RequestClassifier::from_config(config)?;
        let settings = EngineSettings::from_config(config)?;
        Self::new(store, fetcher, versions, classifier, settings)
    }

    pub fn generation(&self) -> &str {
        self.versions.current_generation()
    }

    pub fn classifier(&self) -> &RequestClassifier {
        &self.classifier
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Handle one request issued by the controlled application.
    pub async fn handle(&self, request: &Request) -> Result<Intercepted, Error> {
        match self.classifier.classify(request) {
            InterceptionDecision::PassThrough => self.pass_through(request).await,
            InterceptionDecision::CacheFirst
                if request.is_navigation() && self.settings.document_strategy == DocumentStrategy::NetworkFirst =>
            {
                self.network_first(request).await
            }
            InterceptionDecision::CacheFirst => self.cache_first(request).await,
        }
    }

    /// Forward to the network without touching the store.
    pub async fn pass_through(&self, request: &Request) -> Result<Intercepted, Error> {
        let response = self.fetcher.fetch(request).await?;
        Ok(Intercepted { response, source: Source::PassThrough })
    }

    async fn cache_first(&self, request: &Request) -> Result<Intercepted, Error> {
        let key = request.cache_key()?;

        if let Some(response) = self.lookup(&key).await {
            tracing::debug!(generation = self.generation(), url = %request.url, "cache hit");
            return Ok(Intercepted { response, source: Source::Cache });
        }
        tracing::debug!(generation = self.generation(), url = %request.url, "cache miss");

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                self.store_copy(request, &key, &response).await;
                Ok(Intercepted { response, source: Source::Network })
            }
            Err(err) if err.is_fetch_failure() => self.offline(request, err).await,
            Err(err) => Err(err),
        }
    }

    async fn network_first(&self, request: &Request) -> Result<Intercepted, Error> {
        let key = request.cache_key()?;

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                self.store_copy(request, &key, &response).await;
                Ok(Intercepted { response, source: Source::Network })
            }
            Err(err) if err.is_fetch_failure() => match self.lookup(&key).await {
                Some(response) => {
                    tracing::debug!(url = %request.url, error = %err, "network failed, serving cached document");
                    Ok(Intercepted { response, source: Source::Cache })
                }
                None => self.offline(request, err).await,
            },
            Err(err) => Err(err),
        }
    }

    /// Read `key` from the current generation; read failures count as misses.
    async fn lookup(&self, key: &str) -> Option<Response> {
        let entry = match self.store.get(self.generation(), key).await {
            Ok(entry) => entry?,
            Err(err) => {
                tracing::warn!(generation = self.generation(), key, error = %err, "cache read failed, treating as miss");
                return None;
            }
        };

        match Response::from_entry(entry) {
            Ok(response) => Some(response),
            Err(err) => {
                tracing::warn!(generation = self.generation(), key, error = %err, "stored entry unreadable");
                None
            }
        }
    }

    fn is_cacheable(&self, request: &Request, response: &Response) -> bool {
        response.is_cacheable() && request.url.origin() == self.settings.origin.origin()
    }

    /// Copy a cacheable response into the store. Never fails the request.
    async fn store_copy(&self, request: &Request, key: &str, response: &Response) {
        if !self.is_cacheable(request, response) {
            tracing::debug!(
                url = %request.url,
                status = response.status.as_u16(),
                response_type = ?response.response_type,
                "response not cacheable"
            );
            return;
        }

        let entry = response.to_entry(key, &request.method);
        let store = Arc::clone(&self.store);
        let generation = self.generation().to_string();

        let write = tokio::spawn(async move {
            if let Err(err) = store.put(&generation, &entry).await {
                tracing::warn!(generation = %generation, url = %entry.url, error = %err, "cache write failed");
            }
        });

        // dropping the caller leaves the write task running
        if let Err(err) = write.await {
            tracing::warn!(error = %err, "cache write task aborted");
        }
    }

    async fn offline(&self, request: &Request, err: Error) -> Result<Intercepted, Error> {
        if !request.is_navigation() {
            return Err(err);
        }

        match self.lookup(&self.fallback_key).await {
            Some(response) => {
                tracing::info!(url = %request.url, error = %err, "offline, serving fallback document");
                Ok(Intercepted { response, source: Source::Fallback })
            }
            None => Err(err),
        }
    }
}
