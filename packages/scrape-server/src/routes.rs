//! HTTP routes.

use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use scrape_engine::{EngineError, ScrapeInvocation};
use serde::Serialize;
use serde_json::json;

use crate::app::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
}

/// Liveness check
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Run a scrape invocation.
///
/// Returns 200 whenever the batch ran, however many requests failed; 400 for
/// structural errors (unknown source or strategy, bad date range, bad
/// configuration).
pub async fn scrape_handler(
    Extension(state): Extension<AppState>,
    Json(invocation): Json<ScrapeInvocation>,
) -> Response {
    let source = invocation.source.clone();
    let test_mode = invocation.options.test_mode;
    tracing::info!(source = %source, test_mode, keys = invocation.options.target_keys.len(), "Scrape invoked");

    match state.service.invoke(invocation).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => {
            tracing::warn!(source = %source, error = %e, "Scrape invocation rejected");
            (status_for(&e), Json(json!({ "error": e.to_string() }))).into_response()
        }
    }
}

fn status_for(error: &EngineError) -> StatusCode {
    match error {
        EngineError::HttpClient(_) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_REQUEST,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use axum::Router;
    use scrape_engine::testing::{MemoryRecordStore, StaticRobotsSource};
    use scrape_engine::{SchedulerConfig, ScrapeService, SourceRegistry, StrategySet};
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::app::build_app;

    fn app() -> Router {
        build_app(ScrapeService::new(
            SchedulerConfig::new().with_concurrency(1),
            SourceRegistry::builtin(),
            StrategySet::new(),
            Arc::new(StaticRobotsSource::new()),
            Arc::new(MemoryRecordStore::new()),
        ))
    }

    async fn post_scrape(body: Value) -> (u16, Value) {
        let response = app()
            .oneshot(
                Request::post("/scrape")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status().as_u16();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let response = app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status().as_u16(), 200);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_scrape_in_test_mode() {
        let (status, body) = post_scrape(serde_json::json!({
            "source": "ccass",
            "options": {"targetKeys": ["00700"], "testMode": true}
        }))
        .await;

        assert_eq!(status, 200);
        assert_eq!(body["success"], true);
        assert!(body["recordsInserted"].as_u64().unwrap() >= 1);
        assert_eq!(body["perRequestDetail"][0]["targetKey"], "00700");
        assert_eq!(body["perRequestDetail"][0]["outcome"], "succeeded");
    }

    #[tokio::test]
    async fn test_per_request_failures_still_return_ok() {
        let (status, body) = post_scrape(serde_json::json!({
            "source": "ccass",
            "options": {"targetKeys": ["00700", "not-a-code"], "testMode": true}
        }))
        .await;

        assert_eq!(status, 200);
        assert_eq!(body["recordsFailed"], 1);
    }

    #[tokio::test]
    async fn test_unknown_source_is_bad_request() {
        let (status, body) = post_scrape(serde_json::json!({
            "source": "edgar",
            "options": {"targetKeys": ["1"]}
        }))
        .await;

        assert_eq!(status, 400);
        assert!(body["error"].as_str().unwrap().contains("edgar"));
    }

    #[tokio::test]
    async fn test_unknown_strategy_is_bad_request() {
        let (status, _) = post_scrape(serde_json::json!({
            "source": "ccass",
            "strategy": "carrier-pigeon",
            "options": {"targetKeys": ["00700"]}
        }))
        .await;

        assert_eq!(status, 400);
    }
}
