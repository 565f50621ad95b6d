//! Application setup: live strategies, collaborators, and the router.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    extract::Extension,
    routing::{get, post},
    Router,
};
use scrape_engine::{
    HeadlessRenderStrategy, HttpFetchStrategy, HttpRobotsSource, MemoryRecordStore,
    RenderingApiStrategy, ScrapeService, SourceRegistry, Strategy, StrategyKind, StrategySet,
};
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::routes::{health_handler, scrape_handler};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ScrapeService>,
}

/// Wire the engine against live backends.
///
/// Records go to an in-memory sink; an external store plugs in through
/// [`scrape_engine::RecordSink`].
pub async fn build_service(config: &ServerConfig) -> Result<ScrapeService> {
    let scheduler = config.scheduler.clone();

    let strategies = StrategySet::new().with_strategy(
        StrategyKind::HttpFetch,
        Strategy::HttpFetch(HttpFetchStrategy::new().context("Failed to build HTTP client")?),
    );

    // Headless slot only when a renderer is running, so escalation skips it
    let strategies = match headless_strategy(&scheduler.user_agent).await {
        Some(headless) => strategies.with_strategy(StrategyKind::HeadlessRender, Strategy::HeadlessRender(headless)),
        None => strategies,
    };

    // Rendering API only when a key is configured
    let strategies = match config.rendering_api.clone() {
        Some(api) => match RenderingApiStrategy::new(api) {
            Ok(strategy) => strategies.with_strategy(StrategyKind::RenderingApi, Strategy::RenderingApi(strategy)),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to create rendering API strategy, continuing without it");
                strategies
            }
        },
        None => {
            tracing::info!("RENDERING_API_KEY not set; rendering-api strategy disabled");
            strategies
        }
    };

    let robots = HttpRobotsSource::new(
        &scheduler.user_agent,
        Duration::from_millis(scheduler.fetch_timeout_ms),
    )
    .context("Failed to build robots client")?;

    Ok(ScrapeService::new(
        scheduler,
        SourceRegistry::builtin(),
        strategies,
        Arc::new(robots),
        Arc::new(MemoryRecordStore::new()),
    ))
}

#[cfg(feature = "chromium")]
async fn headless_strategy(user_agent: &str) -> Option<HeadlessRenderStrategy> {
    match scrape_engine::ChromiumRenderer::launch(user_agent).await {
        Ok(renderer) => Some(HeadlessRenderStrategy::new(Arc::new(renderer))),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to launch Chromium, headless-render disabled");
            None
        }
    }
}

#[cfg(not(feature = "chromium"))]
async fn headless_strategy(_user_agent: &str) -> Option<HeadlessRenderStrategy> {
    tracing::info!("Built without the chromium feature; headless-render disabled");
    None
}

/// Build the Axum application router
pub fn build_app(service: ScrapeService) -> Router {
    let state = AppState {
        service: Arc::new(service),
    };

    Router::new()
        .route("/scrape", post(scrape_handler))
        .route("/health", get(health_handler))
        .layer(Extension(state))
        .layer(TraceLayer::new_for_http())
}
