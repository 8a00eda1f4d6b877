//! Long-lived state shared by every tool call.

use std::sync::Arc;

use offgrid_client::{Fetcher, Intercepted, InterceptionEngine, LifecycleController, LifecycleState, Request};
use offgrid_core::{AppConfig, CacheDb, CacheStore, Error};

pub struct Runtime {
    pub config: AppConfig,
    pub db: CacheDb,
    /// Engine for the configured generation, used once it is active.
    pub engine: InterceptionEngine,
    /// Engine for the generation recorded by the last activation, used until then.
    pub previous: Option<InterceptionEngine>,
    pub controller: Arc<LifecycleController>,
}

impl Runtime {
    pub async fn open(config: AppConfig, db: CacheDb, fetcher: Arc<dyn Fetcher>) -> Result<Self, Error> {
        let store: Arc<dyn CacheStore> = Arc::new(db.clone());
        let engine = InterceptionEngine::from_config(&config, Arc::clone(&store), Arc::clone(&fetcher))?;
        let controller = Arc::new(LifecycleController::from_config(
            &config,
            Arc::clone(&store),
            Arc::clone(&fetcher),
        )?);

        let recorded = match controller.versions().active_generation().await {
            Ok(recorded) => recorded,
            Err(err) => {
                tracing::warn!(error = %err, "could not read active generation, nothing served until activation");
                None
            }
        };

        let previous = match recorded {
            Some(generation) => {
                tracing::info!(previous = %generation, generation = %config.generation, "serving last active generation");
                let config = AppConfig { generation, ..config.clone() };
                Some(InterceptionEngine::from_config(&config, store, fetcher)?)
            }
            None => None,
        };

        Ok(Self { config, db, engine, previous, controller })
    }

    pub fn generation(&self) -> &str {
        self.engine.generation()
    }

    /// Generation requests are answered from right now, if any.
    pub fn serving_generation(&self) -> Option<&str> {
        self.serving().map(InterceptionEngine::generation)
    }

    fn serving(&self) -> Option<&InterceptionEngine> {
        if self.controller.state() == LifecycleState::Active {
            Some(&self.engine)
        } else {
            self.previous.as_ref()
        }
    }

    /// Route one application request.
    ///
    /// The configured generation takes over once its lifecycle is active.
    /// Before that the last activated generation keeps serving; with none
    /// recorded, requests go straight to the network.
    pub async fn handle(&self, request: &Request) -> Result<Intercepted, Error> {
        match self.serving() {
            Some(engine) => engine.handle(request).await,
            None => self.engine.pass_through(request).await,
        }
    }
}
