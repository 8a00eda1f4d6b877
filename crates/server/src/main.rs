//! offgrid server entry point.
//!
//! Boots the cache lifecycle in the background and serves the MCP tools on
//! stdio. Logging goes to stderr to avoid interfering with the JSON-RPC
//! protocol on stdout.

use std::sync::Arc;

use anyhow::Result;
use offgrid_client::{FetchClient, FetchConfig};
use offgrid_core::{AppConfig, CacheDb};
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tracing_subscriber::EnvFilter;

mod error;
mod handler;
mod runtime;
mod tools;

use runtime::Runtime;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    tracing::info!(generation = %config.generation, origin = %config.origin, db = %config.db_path.display(), "starting offgrid");

    let db = CacheDb::open(&config.db_path).await?;
    let fetcher = Arc::new(FetchClient::new(FetchConfig::from_app(&config)?)?);
    let runtime = Arc::new(Runtime::open(config, db, fetcher).await?);

    // the MCP session is the one client this process controls
    let _session = runtime.controller.clients().connect();

    let controller = Arc::clone(&runtime.controller);
    tokio::spawn(async move {
        match controller.run().await {
            Ok(()) => tracing::info!(generation = controller.generation(), "cache active"),
            Err(err) => tracing::error!(
                generation = controller.generation(),
                state = %controller.state(),
                error = %err,
                "lifecycle stopped"
            ),
        }
    });

    let handler = handler::OffgridServer::new(runtime);
    let server = serve_server(handler, stdio()).await?;

    server.waiting().await?;

    Ok(())
}
