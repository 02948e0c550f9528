//! shelter server entry point.
//!
//! Boots the offline caching worker and exposes its lifecycle signals as MCP
//! tools on stdio. Logging goes to stderr to avoid interfering with the
//! JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::Result;
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use shelter_client::{FetchConfig, HttpFetcher, RecordingHost, ServiceWorker};
use shelter_core::{AppConfig, CacheDb};
use tracing_subscriber::EnvFilter;

mod error;
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

    tracing::info!(
        app = %config.app_name,
        version = %config.version,
        origin = %config.origin,
        db = %config.db_path.display(),
        "Starting shelter on stdio transport"
    );

    let mut db = CacheDb::open(&config.db_path).await?;
    if let Some(quota) = config.cache_quota_bytes {
        db = db.with_quota_bytes(quota);
    }

    let network = Arc::new(HttpFetcher::new(FetchConfig::from(&config))?);
    let host = Arc::new(RecordingHost::new());
    let worker = Arc::new(ServiceWorker::new(config, Arc::new(db.clone()), network, host)?);

    let handler = handler::ShelterServer::new(worker, db);
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    server.waiting().await?;

    Ok(())
}
