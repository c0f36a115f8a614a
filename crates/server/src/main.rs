//! sitekey-mcp server entry point.
//!
//! This is the main binary that boots the MCP server on stdio transport.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::Result;
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use sitekey_client::{ReqwestHttpClient, TransportConfig};
use sitekey_core::{AppConfig, SiteKeysConfiguration};
use tokio::runtime::Handle;
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
        user_agent = %config.user_agent,
        force_checks = config.force_checks,
        "Starting sitekey-mcp server on stdio transport"
    );

    let transport = ReqwestHttpClient::new(TransportConfig::from(&config), Handle::current())?;
    let configuration = Arc::new(SiteKeysConfiguration::with_defaults(Arc::new(transport.clone())));
    configuration.set_force_checks(config.force_checks);

    let handler = handler::SiteKeyServer::new(configuration.clone(), transport);
    let server = serve_server(handler, stdio()).await?;

    server.waiting().await?;
    configuration.dispose();

    Ok(())
}
