//! hearth server entry point.
//!
//! Boots the cache worker (install, activate) and exposes it as an MCP
//! server on stdio transport.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::Result;
use hearth_client::{FetchClient, FetchConfig, QueryNormalizer, Transport, Worker, WorkerOptions};
use hearth_core::{AppConfig, CacheStore, RouteTable};
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tracing_subscriber::EnvFilter;

mod handler;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    tracing::info!(db = %config.db_path.display(), generation = %config.generation, "Starting hearth on stdio transport");

    let store = CacheStore::open(&config.db_path).await?;
    let transport: Arc<dyn Transport> = Arc::new(FetchClient::new(FetchConfig::from(&config))?);
    let routes = RouteTable::standard(&config.routes)?;
    let normalizer = QueryNormalizer::new(&config.ignored_query_params)?;
    let options = WorkerOptions::from_config(&config)?;

    let worker = Arc::new(Worker::new(store, transport, routes, normalizer, options));
    worker.install().await?;

    let handle = Arc::clone(&worker).start();
    let server = serve_server(handler::HearthServer::new(&handle).await, stdio()).await?;

    server.waiting().await?;

    handle.shutdown(true).await;

    Ok(())
}
