//! Registry of open application clients and the generation controlling them.

use std::sync::Arc;

use tokio::sync::watch;

#[derive(Debug)]
struct Inner {
    open: watch::Sender<usize>,
    controller: watch::Sender<Option<String>>,
}

/// Shared view of the clients a deployment controls.
///
/// Cloning shares the registry, so successive deployments see the same clients.
#[derive(Debug, Clone)]
pub struct Clients {
    inner: Arc<Inner>,
}

impl Default for Clients {
    fn default() -> Self {
        Self::new()
    }
}

impl Clients {
    pub fn new() -> Self {
        let (open, _) = watch::channel(0);
        let (controller, _) = watch::channel(None);
        Self { inner: Arc::new(Inner { open, controller }) }
    }

    /// Register an open client. It stays open until the handle is dropped.
    pub fn connect(&self) -> ClientHandle {
        self.inner.open.send_modify(|open| *open += 1);
        ClientHandle { inner: Arc::clone(&self.inner) }
    }

    pub fn open_count(&self) -> usize {
        *self.inner.open.borrow()
    }

    /// Generation currently controlling the clients, if any has claimed them.
    pub fn controller(&self) -> Option<String> {
        self.inner.controller.borrow().clone()
    }

    /// Point every open and future client at `generation`.
    ///
    /// Returns the number of open clients taken over.
    pub fn claim(&self, generation: &str) -> usize {
        self.inner.controller.send_replace(Some(generation.to_string()));
        self.open_count()
    }

    /// Resolves once no client controlled by a generation other than
    /// `generation` remains open.
    pub async fn released(&self, generation: &str) {
        let previous = self.controller();
        if previous.as_deref().is_none_or(|controller| controller == generation) {
            return;
        }

        let mut open = self.inner.open.subscribe();
        // the sender lives in `self`, so the channel cannot close here
        let _ = open.wait_for(|count| *count == 0).await;
    }
}

/// An open client. Dropping it closes the client.
#[derive(Debug)]
pub struct ClientHandle {
    inner: Arc<Inner>,
}

impl Drop for ClientHandle {
    fn drop(&mut self) {
        self.inner.open.send_modify(|open| *open = open.saturating_sub(1));
    }
}
