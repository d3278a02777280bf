use anyhow::{Context, Result};
use crafting_core::catalog::{Catalog, PgCatalog};
use crafting_core::clients::{MarketDataClient, TokenCache};
use crafting_core::db::{create_pool, DbPoolConfig, RetryPolicy};
use crafting_core::RefreshOrchestrator;
use dotenv::dotenv;
use price_refresh_rust::api::{self, AppState};
use price_refresh_rust::config::Config;
use price_refresh_rust::scheduler;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting price refresh service...");

    let config = Config::from_env()?;

    // Catalog
    let pool = create_pool(&config.database_url, &DbPoolConfig::from_env()).await?;
    let catalog: Arc<dyn Catalog> = Arc::new(PgCatalog::new(pool, RetryPolicy::from_env()));

    // Clients
    let tokens = TokenCache::new(&config.market)?;
    let market = MarketDataClient::new(&config.market)?;

    let orchestrator = Arc::new(RefreshOrchestrator::new(
        config.market.credentials(),
        Box::new(tokens),
        Arc::new(market),
        catalog.clone(),
    ));

    // Scheduled refresh
    tokio::spawn(scheduler::run_refresh_schedule(
        orchestrator.clone(),
        config.refresh_interval_mins,
        config.refresh_on_startup,
    ));

    // HTTP
    let app = api::router(Arc::new(AppState {
        orchestrator,
        catalog,
    }));
    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("Price refresh service stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal"),
        Err(err) => error!("Unable to listen for shutdown signal: {}", err),
    }
}
