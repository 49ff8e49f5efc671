//! offcache server entry point.
//!
//! Boots the worker host from configuration, then serves MCP on stdio.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use anyhow::Result;
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tracing_subscriber::EnvFilter;

use offcache_core::AppConfig;

mod error;
mod handler;
mod state;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    config.validate()?;

    tracing::info!(
        cache_name = %config.cache_name,
        origin = %config.origin,
        in_memory = config.in_memory,
        "Starting offcache server on stdio transport"
    );

    let state = state::AppState::boot(config).await?;
    let handler = handler::OffcacheServer::new(state);
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    server.waiting().await?;

    Ok(())
}
