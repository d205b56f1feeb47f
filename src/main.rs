//! Minimal binary wiring: load configuration, build the registry, run until
//! `Ctrl-C`, then cancel every in-flight query and exit.
//!
//! This is not an MCP server — tool registration and transport are out of
//! scope (see [`snowflake_mcp_registry::tools`]). It demonstrates the
//! embedding an MCP server would build on top of.

use std::sync::Arc;
use std::time::Duration;

use snowflake_mcp_registry::connection::SnowflakeConnectionProvider;
use snowflake_mcp_registry::driver::SnowflakeHttpDriver;
use snowflake_mcp_registry::{QueryRegistry, RegistryConfig, RegistryDefaults};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = RegistryConfig::from_env()?;

    let driver = Arc::new(SnowflakeHttpDriver::new());
    let connections = Arc::new(SnowflakeConnectionProvider::new(config.snowflake.clone()));
    let defaults = RegistryDefaults::from(&config.registry);

    let registry = QueryRegistry::new(driver, connections, defaults);
    let _pruner = registry.spawn_background_pruner(Duration::from_secs(300));

    tracing::info!("snowflake-mcp-server ready, awaiting shutdown signal");
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received, cancelling in-flight queries");

    registry.close().await;
    Ok(())
}
