//! Install → wait → activate lifecycle of one deployment.
//!
//! ### States
//! `Installing → Waiting → Activating → Active`, driven by an explicit
//! transition table (`LifecycleState::on`). Events that the table does not
//! allow are rejected with `Error::InvalidTransition`.
//!
//! ### Install
//! - Opens the current generation and fetches the whole precache manifest.
//! - All or nothing: one failed fetch or one non-2xx status fails the
//!   install, nothing is written, and the state stays `Installing`.
//!
//! ### Waiting
//! - Ends when every client controlled by an older generation has closed,
//!   or when a skip-waiting message arrives on the control channel.
//!
//! ### Activate
//! - Records the current generation as the active one. The record survives
//!   restarts and names the generation to serve from while a later
//!   deployment is still installing.
//! - Deletes every stale generation (failures are logged, not fatal), then
//!   claims all open clients for the current generation.
//!
//! Install and activate hold a lock shared by every deployment built through
//! `redeploy`, so they never overlap across deployments. Request handling
//! does not take this lock.

pub mod clients;
pub mod control;

use std::fmt;
use std::sync::Arc;

use futures_util::future::try_join_all;
use offgrid_core::{AppConfig, CacheEntry, CacheStore, Error, VersionManager};
use reqwest::Method;
use serde::Serialize;
use tokio::sync::{Mutex, mpsc, watch};
use url::Url;

pub use clients::{ClientHandle, Clients};
pub use control::{ControlHandle, ControlMessage};

use crate::fetch::{Fetcher, Request};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Installing,
    Waiting,
    Activating,
    Active,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Precache completed.
    Installed,
    /// Clients of the previous generation have all closed.
    Released,
    /// Skip-waiting requested.
    SkipWaiting,
    /// Stale generations evicted and clients claimed.
    Activated,
}

impl LifecycleState {
    /// Transition table. `None` means the event is not allowed in this state.
    pub fn on(self, event: LifecycleEvent) -> Option<LifecycleState> {
        use LifecycleEvent as E;
        use LifecycleState as S;

        match (self, event) {
            (S::Installing, E::Installed) => Some(S::Waiting),
            (S::Waiting, E::Released | E::SkipWaiting) => Some(S::Activating),
            (S::Activating, E::Activated) => Some(S::Active),
            _ => None,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Installing => "installing",
            LifecycleState::Waiting => "waiting",
            LifecycleState::Activating => "activating",
            LifecycleState::Active => "active",
        };
        f.write_str(name)
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleEvent::Installed => "installed",
            LifecycleEvent::Released => "released",
            LifecycleEvent::SkipWaiting => "skip_waiting",
            LifecycleEvent::Activated => "activated",
        };
        f.write_str(name)
    }
}

/// Drives one deployment's cache generation from install to active.
pub struct LifecycleController {
    versions: VersionManager,
    store: Arc<dyn CacheStore>,
    fetcher: Arc<dyn Fetcher>,
    manifest: Vec<Url>,
    skip_waiting: bool,
    clients: Clients,
    lock: Arc<Mutex<()>>,
    state: watch::Sender<LifecycleState>,
    control_tx: mpsc::UnboundedSender<ControlMessage>,
    control_rx: Mutex<mpsc::UnboundedReceiver<ControlMessage>>,
}

impl LifecycleController {
    pub fn new(
        generation: impl Into<String>, store: Arc<dyn CacheStore>, fetcher: Arc<dyn Fetcher>, manifest: Vec<Url>,
    ) -> Self {
        Self::with_shared(
            VersionManager::new(generation, Arc::clone(&store)),
            store,
            fetcher,
            manifest,
            Clients::new(),
            Arc::new(Mutex::new(())),
        )
    }

    /// Build a controller for `config.generation` and its precache manifest.
    pub fn from_config(
        config: &AppConfig, store: Arc<dyn CacheStore>, fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self, Error> {
        let manifest = config.precache_urls().map_err(|e| Error::InvalidInput(e.to_string()))?;
        Ok(Self::new(config.generation.clone(), store, fetcher, manifest).with_skip_waiting(config.skip_waiting))
    }

    fn with_shared(
        versions: VersionManager, store: Arc<dyn CacheStore>, fetcher: Arc<dyn Fetcher>, manifest: Vec<Url>,
        clients: Clients, lock: Arc<Mutex<()>>,
    ) -> Self {
        let (state, _) = watch::channel(LifecycleState::Installing);
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        Self {
            versions,
            store,
            fetcher,
            manifest,
            skip_waiting: false,
            clients,
            lock,
            state,
            control_tx,
            control_rx: Mutex::new(control_rx),
        }
    }

    /// Leave `Waiting` as soon as install succeeds.
    pub fn with_skip_waiting(mut self, skip_waiting: bool) -> Self {
        self.skip_waiting = skip_waiting;
        self
    }

    /// Share an existing client registry.
    pub fn with_clients(mut self, clients: Clients) -> Self {
        self.clients = clients;
        self
    }

    /// Controller for the next deployment, starting over at `Installing`.
    ///
    /// Shares the store, network, manifest, clients and lifecycle lock.
    pub fn redeploy(&self, generation: impl Into<String>) -> Self {
        Self::with_shared(
            VersionManager::new(generation, Arc::clone(&self.store)),
            Arc::clone(&self.store),
            Arc::clone(&self.fetcher),
            self.manifest.clone(),
            self.clients.clone(),
            Arc::clone(&self.lock),
        )
        .with_skip_waiting(self.skip_waiting)
    }

    pub fn generation(&self) -> &str {
        self.versions.current_generation()
    }

    pub fn versions(&self) -> &VersionManager {
        &self.versions
    }

    pub fn clients(&self) -> &Clients {
        &self.clients
    }

    pub fn manifest(&self) -> &[Url] {
        &self.manifest
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Sender for skip-waiting and other control messages.
    pub fn control(&self) -> ControlHandle {
        ControlHandle { tx: self.control_tx.clone() }
    }

    /// Resolves once the lifecycle reaches `Active`.
    pub async fn active(&self) {
        let mut state = self.state.subscribe();
        // the sender lives in `self`, so the channel cannot close here
        let _ = state.wait_for(|state| *state == LifecycleState::Active).await;
    }

    /// Run install, wait and activate in order.
    pub async fn run(&self) -> Result<(), Error> {
        self.install().await?;
        self.wait().await?;
        self.activate().await
    }

    /// Precache the manifest into the current generation.
    pub async fn install(&self) -> Result<(), Error> {
        let _serial = self.lock.lock().await;
        self.ensure_allowed(LifecycleEvent::Installed)?;

        tracing::info!(generation = self.generation(), urls = self.manifest.len(), "installing");

        self.store.open(self.generation()).await?;

        let entries = try_join_all(self.manifest.iter().map(|url| self.precache(url)))
            .await
            .inspect_err(|err| tracing::error!(generation = self.generation(), error = %err, "install failed"))?;

        self.store
            .put_all(self.generation(), &entries)
            .await
            .inspect_err(|err| tracing::error!(generation = self.generation(), error = %err, "install failed"))?;

        self.transition(LifecycleEvent::Installed)?;
        Ok(())
    }

    async fn precache(&self, url: &Url) -> Result<CacheEntry, Error> {
        let request = Request::get(url.clone());
        let key = request.cache_key()?;

        let response = self
            .fetcher
            .fetch(&request)
            .await
            .map_err(|e| Error::PrecacheFetch { url: url.to_string(), reason: e.to_string() })?;

        if !response.status.is_success() {
            return Err(Error::PrecacheFetch {
                url: url.to_string(),
                reason: format!("status {}", response.status.as_u16()),
            });
        }

        tracing::debug!(generation = self.generation(), url = %url, bytes = response.body.len(), "precached");
        Ok(response.to_entry(&key, &Method::GET))
    }

    /// Wait for old clients to close or for a skip-waiting message.
    pub async fn wait(&self) -> Result<(), Error> {
        self.ensure_allowed(LifecycleEvent::Released)?;

        if self.skip_waiting {
            self.transition(LifecycleEvent::SkipWaiting)?;
            return Ok(());
        }

        let mut control = self.control_rx.lock().await;
        let event = tokio::select! {
            _ = self.clients.released(self.generation()) => LifecycleEvent::Released,
            _ = next_skip_waiting(&mut control) => LifecycleEvent::SkipWaiting,
        };

        self.transition(event)?;
        Ok(())
    }

    /// Evict stale generations and claim clients.
    pub async fn activate(&self) -> Result<(), Error> {
        let _serial = self.lock.lock().await;
        self.ensure_allowed(LifecycleEvent::Activated)?;

        // recorded before eviction so a crash in between never points at a deleted generation
        if let Err(err) = self.versions.mark_current_active().await {
            tracing::warn!(generation = self.generation(), error = %err, "failed to record active generation");
        }

        let stale = match self.versions.stale_generations().await {
            Ok(stale) => stale,
            Err(err) => {
                tracing::warn!(generation = self.generation(), error = %err, "could not list stale generations");
                Default::default()
            }
        };

        for generation in &stale {
            match self.store.delete_generation(generation).await {
                Ok(removed) => tracing::info!(stale = %generation, removed, "deleted stale generation"),
                Err(err) => tracing::warn!(stale = %generation, error = %err, "failed to delete stale generation"),
            }
        }

        let claimed = self.clients.claim(self.generation());
        tracing::info!(generation = self.generation(), claimed, "claimed clients");

        self.transition(LifecycleEvent::Activated)?;
        Ok(())
    }

    fn ensure_allowed(&self, event: LifecycleEvent) -> Result<LifecycleState, Error> {
        let current = self.state();
        current
            .on(event)
            .ok_or_else(|| Error::InvalidTransition { state: current.to_string(), event: event.to_string() })
    }

    fn transition(&self, event: LifecycleEvent) -> Result<LifecycleState, Error> {
        let from = self.state();
        let to = self.ensure_allowed(event)?;
        self.state.send_replace(to);
        tracing::info!(generation = self.generation(), %from, %to, %event, "lifecycle transition");
        Ok(to)
    }
}

async fn next_skip_waiting(control: &mut mpsc::UnboundedReceiver<ControlMessage>) {
    match control.recv().await {
        Some(ControlMessage::SkipWaiting) => {}
        // every controller holds a sender, so this only happens during teardown
        None => std::future::pending::<()>().await,
    }
}
