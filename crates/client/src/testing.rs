//! In-memory stand-ins for the network and a failing or stalled disk.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use offgrid_core::{CacheDb, CacheEntry, CacheStore, Error};
use reqwest::StatusCode;
use reqwest::header::{self, HeaderMap, HeaderValue};
use tokio::sync::Notify;
use url::Url;

use crate::fetch::{Fetcher, Request, Response, ResponseType};

pub(crate) const ORIGIN: &str = "http://localhost:3000";

pub(crate) fn url(path: &str) -> Url {
    Url::parse(ORIGIN).unwrap().join(path).unwrap()
}

pub(crate) fn response(url: &Url, status: u16, body: &str) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    let origin = Url::parse(ORIGIN).unwrap();
    Response {
        url: url.clone(),
        status: StatusCode::from_u16(status).unwrap(),
        headers: headers.clone(),
        content_type: Some("text/plain".to_string()),
        body: Bytes::from(body.to_string()),
        response_type: ResponseType::classify(&origin, url, url, &headers),
        redirected: false,
    }
}

#[derive(Debug, Clone, Copy)]
enum Failure {
    Unreachable,
    TooLarge,
}

/// Serves canned responses; unknown URLs get a 404.
#[derive(Default)]
pub(crate) struct StubFetcher {
    responses: Mutex<HashMap<String, Response>>,
    failing: Mutex<HashMap<String, Failure>>,
    offline: AtomicBool,
    calls: AtomicUsize,
}

impl StubFetcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn serve(&self, path: &str, body: &str) {
        let url = url(path);
        self.serve_response(response(&url, 200, body));
    }

    pub(crate) fn serve_response(&self, response: Response) {
        self.responses.lock().unwrap().insert(response.url.to_string(), response);
    }

    pub(crate) fn fail(&self, path: &str) {
        self.failing.lock().unwrap().insert(url(path).to_string(), Failure::Unreachable);
    }

    /// Answer `path` with a body over the size limit.
    pub(crate) fn too_large(&self, path: &str) {
        self.failing.lock().unwrap().insert(url(path).to_string(), Failure::TooLarge);
    }

    pub(crate) fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for StubFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let key = request.url.to_string();
        let failure = if self.offline.load(Ordering::SeqCst) {
            Some(Failure::Unreachable)
        } else {
            self.failing.lock().unwrap().get(&key).copied()
        };
        match failure {
            Some(Failure::Unreachable) => return Err(Error::NetworkFetch(format!("network error: {key} unreachable"))),
            Some(Failure::TooLarge) => return Err(Error::FetchTooLarge(format!("{key}: body exceeds limit"))),
            None => {}
        }

        let canned = self.responses.lock().unwrap().get(&key).cloned();
        Ok(canned.unwrap_or_else(|| response(&request.url, 404, "not found")))
    }
}

/// Wraps a real store and fails selected operations.
pub(crate) struct FailingStore {
    pub(crate) inner: CacheDb,
    pub(crate) fail_writes: bool,
    pub(crate) fail_reads: bool,
    pub(crate) fail_deletes: bool,
}

impl FailingStore {
    pub(crate) fn new(inner: CacheDb) -> Self {
        Self { inner, fail_writes: false, fail_reads: false, fail_deletes: false }
    }
}

#[async_trait]
impl CacheStore for FailingStore {
    async fn open(&self, generation: &str) -> Result<(), Error> {
        self.inner.open(generation).await
    }

    async fn get(&self, generation: &str, key: &str) -> Result<Option<CacheEntry>, Error> {
        if self.fail_reads {
            return Err(Error::StoreRead("disk I/O error".into()));
        }
        self.inner.get(generation, key).await
    }

    async fn put(&self, generation: &str, entry: &CacheEntry) -> Result<(), Error> {
        if self.fail_writes {
            return Err(Error::StoreWrite("quota exceeded".into()));
        }
        self.inner.put(generation, entry).await
    }

    async fn delete_generation(&self, generation: &str) -> Result<u64, Error> {
        if self.fail_deletes {
            return Err(Error::GenerationDelete { generation: generation.into(), reason: "locked".into() });
        }
        self.inner.delete_generation(generation).await
    }

    async fn keys_of(&self, generation: &str) -> Result<Vec<String>, Error> {
        self.inner.keys_of(generation).await
    }

    async fn list_generations(&self) -> Result<BTreeSet<String>, Error> {
        self.inner.list_generations().await
    }

    async fn mark_active(&self, generation: &str) -> Result<(), Error> {
        if self.fail_writes {
            return Err(Error::StoreWrite("quota exceeded".into()));
        }
        self.inner.mark_active(generation).await
    }

    async fn active_generation(&self) -> Result<Option<String>, Error> {
        self.inner.active_generation().await
    }
}

/// Wraps a real store and holds selected operations until released.
///
/// `entered` fires when a held operation starts; one `release` lets it finish.
pub(crate) struct GatedStore {
    inner: CacheDb,
    hold_puts: bool,
    hold_deletes: bool,
    pub(crate) entered: Arc<Notify>,
    pub(crate) release: Arc<Notify>,
}

impl GatedStore {
    pub(crate) fn holding_puts(inner: CacheDb) -> Self {
        Self { inner, hold_puts: true, hold_deletes: false, entered: Arc::default(), release: Arc::default() }
    }

    pub(crate) fn holding_deletes(inner: CacheDb) -> Self {
        Self { inner, hold_puts: false, hold_deletes: true, entered: Arc::default(), release: Arc::default() }
    }

    async fn hold(&self) {
        self.entered.notify_one();
        self.release.notified().await;
    }
}

#[async_trait]
impl CacheStore for GatedStore {
    async fn open(&self, generation: &str) -> Result<(), Error> {
        self.inner.open(generation).await
    }

    async fn get(&self, generation: &str, key: &str) -> Result<Option<CacheEntry>, Error> {
        self.inner.get(generation, key).await
    }

    async fn put(&self, generation: &str, entry: &CacheEntry) -> Result<(), Error> {
        if self.hold_puts {
            self.hold().await;
        }
        self.inner.put(generation, entry).await
    }

    async fn delete_generation(&self, generation: &str) -> Result<u64, Error> {
        if self.hold_deletes {
            self.hold().await;
        }
        self.inner.delete_generation(generation).await
    }

    async fn keys_of(&self, generation: &str) -> Result<Vec<String>, Error> {
        self.inner.keys_of(generation).await
    }

    async fn list_generations(&self) -> Result<BTreeSet<String>, Error> {
        self.inner.list_generations().await
    }

    async fn mark_active(&self, generation: &str) -> Result<(), Error> {
        self.inner.mark_active(generation).await
    }

    async fn active_generation(&self) -> Result<Option<String>, Error> {
        self.inner.active_generation().await
    }
}
