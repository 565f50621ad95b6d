// Main entry point for the scrape server

use anyhow::{Context, Result};
use scrape_server::{build_app, build_service, ServerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,scrape_engine=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting scrape server");

    // Load configuration
    let config = ServerConfig::from_env().context("Failed to load configuration")?;
    tracing::info!(
        concurrency = config.scheduler.concurrency,
        inter_request_delay_ms = config.scheduler.inter_request_delay_ms,
        robots_policy = ?config.scheduler.compliance_policy,
        "Configuration loaded"
    );

    let service = build_service(&config)
        .await
        .context("Failed to build scrape service")?;
    let app = build_app(service);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Starting server on {}", addr);
    tracing::info!("Health check: http://localhost:{}/health", config.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
