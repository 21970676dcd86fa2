use std::sync::Arc;

use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use jobharvest_client::default_registry;
use jobharvest_core::orchestrator::Orchestrator;
use jobharvest_core::rate_limiter::RateLimiters;
use jobharvest_core::service::JobScraper;
use jobharvest_core::ScraperConfig;
use jobharvest_db::{Database, DatabaseConfig};
use jobharvest_server::routes;
use jobharvest_server::state::{AppState, Launcher};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("jobharvest=info".parse()?))
        .with_target(false)
        .init();

    let admin_token = std::env::var("JOBHARVEST_ADMIN_TOKEN")
        .ok()
        .filter(|t| !t.trim().is_empty());
    if admin_token.is_none() {
        tracing::warn!("JOBHARVEST_ADMIN_TOKEN not set, POST /v1/scrape is disabled");
    }
    let port = std::env::var("JOBHARVEST_SERVER_PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("0.0.0.0:{port}");

    let db = Database::connect(&DatabaseConfig::from_env()?).await?;
    db.migrate().await?;

    let config = ScraperConfig::from_env()?;
    let orchestrator = Orchestrator::new(
        default_registry(),
        RateLimiters::new(config.rate_limit),
        config.pipeline,
        db.job_store(),
    );
    let scraper = JobScraper::new(orchestrator, launcher().await?);

    let state = Arc::new(AppState {
        db,
        scraper,
        admin_token,
    });

    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    tracing::info!("Starting server on {addr}");
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

#[cfg(feature = "browser")]
async fn launcher() -> anyhow::Result<Launcher> {
    Ok(Launcher::new().await?)
}

#[cfg(not(feature = "browser"))]
async fn launcher() -> anyhow::Result<Launcher> {
    Ok(Launcher::new())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
