//! Integration tests for batch runs through the scheduler.
//!
//! These tests verify:
//! 1. Compliance denials short-circuit before any fetch
//! 2. Short content escalates up the strategy ladder unless strict
//! 3. Transient failures retry within the attempt bound
//! 4. Concurrency, pacing, and robots caching across a batch
//! 5. Cancellation reports undispatched requests and stops further attempts
//! 6. Re-running a batch against one sink updates rather than duplicates

mod common;

use std::time::Duration;

use common::{ccass_requests, fast_config, Harness, HKEX_SDW};
use scrape_engine::testing::{MockResponse, StaticRobotsSource};
use scrape_engine::types::AttemptPurpose;
use scrape_engine::{
    CompliancePolicy, EngineError, FailureReason, FetchError, HeadlessRenderStrategy, OutcomeKind,
    ScrapeRequest, Strategy, StrategyKind, StrategySet,
};
use tokio_util::sync::CancellationToken;

// ============================================================================
// Compliance
// ============================================================================

#[tokio::test]
async fn test_disallowed_path_makes_no_fetch() {
    let harness = Harness::new().with_robots(
        StaticRobotsSource::new().with_document(HKEX_SDW, "User-agent: *\nDisallow: /sdw/\n"),
    );

    let report = harness
        .scheduler(fast_config())
        .run(ccass_requests(&["00700"]))
        .await
        .unwrap();

    let outcome = report.outcome_for("00700").unwrap();
    assert_eq!(outcome.outcome, OutcomeKind::Failed);
    assert_eq!(outcome.reason, Some(FailureReason::ComplianceDisallowed));
    assert!(outcome.attempts.is_empty());
    assert_eq!(report.records_failed, 1);
    assert_eq!(harness.mock.call_count(), 0);
    assert!(harness.store.is_empty());
}

#[tokio::test]
async fn test_unreachable_robots_follows_policy() {
    let robots = StaticRobotsSource::new().with_unreachable(HKEX_SDW);

    let closed = Harness::new().with_robots(robots.clone());
    let report = closed
        .scheduler(fast_config().with_compliance_policy(CompliancePolicy::FailClosed))
        .run(ccass_requests(&["00700"]))
        .await
        .unwrap();
    assert!(report.has_reason(FailureReason::ComplianceDisallowed));
    assert_eq!(closed.mock.call_count(), 0);

    let open = Harness::new().with_robots(robots);
    let report = open
        .scheduler(fast_config().with_compliance_policy(CompliancePolicy::FailOpen))
        .run(ccass_requests(&["00700"]))
        .await
        .unwrap();
    assert_eq!(report.succeeded(), 1);
}

#[tokio::test]
async fn test_robots_fetched_once_per_domain() {
    let harness = Harness::new();

    let report = harness
        .scheduler(fast_config().with_concurrency(3))
        .run(ccass_requests(&["00700", "00005", "00388", "00001", "00939"]))
        .await
        .unwrap();

    assert_eq!(report.succeeded(), 5);
    assert_eq!(harness.robots.fetch_count(HKEX_SDW), 1);
    assert_eq!(harness.robots.total_fetches(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_crawl_delay_paces_same_domain() {
    let harness = Harness::new().with_robots(
        StaticRobotsSource::new().with_document(HKEX_SDW, "User-agent: *\nCrawl-delay: 2\n"),
    );

    let started = tokio::time::Instant::now();
    let report = harness
        .scheduler(fast_config().with_concurrency(2))
        .run(ccass_requests(&["00700", "00005"]))
        .await
        .unwrap();

    assert_eq!(report.succeeded(), 2);
    assert!(started.elapsed() >= Duration::from_secs(2));
}

// ============================================================================
// Escalation and retry
// ============================================================================

#[tokio::test]
async fn test_short_content_escalates_to_next_strategy() {
    let harness = Harness::new();
    harness.mock.script_for(
        StrategyKind::HttpFetch,
        &harness.url("ccass", "00700"),
        vec![MockResponse::html("<html><body></body></html>")],
    );

    let report = harness
        .scheduler(fast_config())
        .run(ccass_requests(&["00700"]))
        .await
        .unwrap();

    let outcome = report.outcome_for("00700").unwrap();
    assert_eq!(outcome.outcome, OutcomeKind::Succeeded);
    assert_eq!(outcome.strategy_used, Some(StrategyKind::HeadlessRender));
    let kinds: Vec<StrategyKind> = outcome.attempts.iter().map(|a| a.strategy_used).collect();
    assert_eq!(kinds, vec![StrategyKind::HttpFetch, StrategyKind::HeadlessRender]);
    assert_eq!(outcome.attempts[1].ordinal, 2);
}

#[tokio::test]
async fn test_strict_request_does_not_escalate() {
    let harness = Harness::new();
    harness.mock.script_for(
        StrategyKind::HttpFetch,
        &harness.url("ccass", "00700"),
        vec![MockResponse::html("<html></html>")],
    );

    let report = harness
        .scheduler(fast_config())
        .run(vec![ScrapeRequest::new("ccass", "00700").with_strict(true)])
        .await
        .unwrap();

    let outcome = report.outcome_for("00700").unwrap();
    assert_eq!(outcome.reason, Some(FailureReason::EmptyContent));
    assert_eq!(outcome.attempts.len(), 1);
    assert_eq!(harness.mock.calls_for(StrategyKind::HeadlessRender), 0);
}

#[tokio::test]
async fn test_transient_failure_retries_then_succeeds() {
    let harness = Harness::new();
    let url = harness.url("ccass", "00700");
    harness.mock.script(
        &url,
        vec![
            MockResponse::error(FetchError::NetworkTimeout { elapsed_ms: 30_000 }),
            MockResponse::html(harness.fixture("ccass", "00700")),
        ],
    );

    let report = harness
        .scheduler(fast_config())
        .run(ccass_requests(&["00700"]))
        .await
        .unwrap();

    let outcome = report.outcome_for("00700").unwrap();
    assert_eq!(outcome.outcome, OutcomeKind::Succeeded);
    assert_eq!(outcome.attempts.len(), 2);
    assert!(!outcome.attempts[0].is_success());
    // Retries stay on the same rung
    assert_eq!(outcome.strategy_used, Some(StrategyKind::HttpFetch));
}

#[tokio::test]
async fn test_attempts_bounded_by_retry_budget() {
    let harness = Harness::new();
    harness.mock.script(
        &harness.url("ccass", "00700"),
        vec![MockResponse::error(FetchError::NetworkTimeout { elapsed_ms: 10 })],
    );

    let config = fast_config().with_max_retries(2);
    let report = harness.scheduler(config.clone()).run(ccass_requests(&["00700"])).await.unwrap();

    let outcome = report.outcome_for("00700").unwrap();
    assert_eq!(outcome.reason, Some(FailureReason::NetworkTimeout));
    assert_eq!(outcome.fetch_attempts(), config.fetch_budget());
    assert!(outcome.attempts.len() <= config.max_retries_per_request as usize + 2);
}

#[tokio::test]
async fn test_non_transient_status_is_not_retried() {
    let harness = Harness::new();
    harness.mock.script(
        &harness.url("ccass", "00700"),
        vec![MockResponse::error(FetchError::HttpStatus { status: 403 })],
    );

    let report = harness
        .scheduler(fast_config().with_max_retries(3))
        .run(ccass_requests(&["00700"]))
        .await
        .unwrap();

    let outcome = report.outcome_for("00700").unwrap();
    assert_eq!(outcome.reason, Some(FailureReason::HttpStatus));
    assert_eq!(outcome.attempts.len(), 1);
    assert_eq!(outcome.attempts[0].http_status, Some(403));
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_honours_retry_after() {
    let harness = Harness::new();
    harness.mock.script(
        &harness.url("ccass", "00700"),
        vec![
            MockResponse::error(FetchError::RateLimited {
                retry_after: Some(Duration::from_secs(3)),
            }),
            MockResponse::html(harness.fixture("ccass", "00700")),
        ],
    );

    let started = tokio::time::Instant::now();
    let report = harness
        .scheduler(fast_config())
        .run(ccass_requests(&["00700"]))
        .await
        .unwrap();

    assert_eq!(report.succeeded(), 1);
    assert!(started.elapsed() >= Duration::from_secs(3));
}

#[tokio::test]
async fn test_missing_strategy_slot_is_unavailable() {
    let harness = Harness::new();
    let only_http = StrategySet::new().with_strategy(
        StrategyKind::HttpFetch,
        Strategy::Mock(harness.mock.impersonating(StrategyKind::HttpFetch)),
    );

    let report = harness
        .scheduler_with(fast_config(), only_http)
        .run(vec![
            ScrapeRequest::new("ccass", "00700").with_strategy_hint(StrategyKind::RenderingApi)
        ])
        .await
        .unwrap();

    let outcome = report.outcome_for("00700").unwrap();
    assert_eq!(outcome.reason, Some(FailureReason::StrategyUnavailable));
    assert!(outcome.attempts.is_empty());
}

#[tokio::test]
async fn test_dead_headless_slot_escalates_to_rendering_api() {
    let harness = Harness::new();
    harness.mock.script_for(
        StrategyKind::HttpFetch,
        &harness.url("ccass", "00700"),
        vec![MockResponse::html("<html><body></body></html>")],
    );
    let strategies = StrategySet::new()
        .with_strategy(
            StrategyKind::HttpFetch,
            Strategy::Mock(harness.mock.impersonating(StrategyKind::HttpFetch)),
        )
        .with_strategy(
            StrategyKind::HeadlessRender,
            Strategy::HeadlessRender(HeadlessRenderStrategy::unavailable()),
        )
        .with_strategy(
            StrategyKind::RenderingApi,
            Strategy::Mock(harness.mock.impersonating(StrategyKind::RenderingApi)),
        );

    let report = harness
        .scheduler_with(fast_config(), strategies)
        .run(ccass_requests(&["00700"]))
        .await
        .unwrap();

    let outcome = report.outcome_for("00700").unwrap();
    assert_eq!(outcome.outcome, OutcomeKind::Succeeded);
    assert_eq!(outcome.strategy_used, Some(StrategyKind::RenderingApi));
    let kinds: Vec<StrategyKind> = outcome.attempts.iter().map(|a| a.strategy_used).collect();
    assert_eq!(
        kinds,
        vec![StrategyKind::HttpFetch, StrategyKind::HeadlessRender, StrategyKind::RenderingApi]
    );
    assert_eq!(harness.mock.calls_for(StrategyKind::RenderingApi), 1);
}

#[tokio::test]
async fn test_dead_slot_at_top_of_ladder_reports_unavailable() {
    let harness = Harness::new();
    let strategies = StrategySet::new().with_strategy(
        StrategyKind::HeadlessRender,
        Strategy::HeadlessRender(HeadlessRenderStrategy::unavailable()),
    );

    let report = harness
        .scheduler_with(fast_config(), strategies)
        .run(vec![
            ScrapeRequest::new("ccass", "00700").with_strategy_hint(StrategyKind::HeadlessRender)
        ])
        .await
        .unwrap();

    let outcome = report.outcome_for("00700").unwrap();
    assert_eq!(outcome.reason, Some(FailureReason::StrategyUnavailable));
    assert_eq!(outcome.attempts.len(), 1);
}

// ============================================================================
// Batch behaviour
// ============================================================================

#[tokio::test]
async fn test_concurrency_limit_is_respected() {
    let harness = Harness::new();
    let slow = harness.mock.clone().with_default_delay(Duration::from_millis(40));
    let strategies = StrategySet::all_mock(slow.clone());

    let keys = ["00700", "00005", "00388", "00001", "00939", "02318"];
    let report = harness
        .scheduler_with(fast_config().with_concurrency(2), strategies)
        .run(ccass_requests(&keys))
        .await
        .unwrap();

    assert_eq!(report.outcomes.len(), keys.len());
    assert_eq!(report.succeeded(), keys.len());
    assert!(slow.max_in_flight() <= 2);
    assert!(slow.max_in_flight() >= 1);
}

#[tokio::test]
async fn test_every_request_has_exactly_one_outcome() {
    let harness = Harness::new().with_robots(
        StaticRobotsSource::new().with_document(HKEX_SDW, "User-agent: *\nDisallow: /sdw/\n"),
    );

    let requests = vec![
        ScrapeRequest::new("ccass", "00700"),
        ScrapeRequest::new("ccass", "bad key"),
        ScrapeRequest::new("statistics", "310-31001"),
    ];
    let report = harness.scheduler(fast_config()).run(requests).await.unwrap();

    assert_eq!(report.outcomes.len(), 3);
    assert_eq!(
        report.outcome_for("bad key").unwrap().reason,
        Some(FailureReason::ValidationFailed)
    );
    assert_eq!(
        report.outcome_for("00700").unwrap().reason,
        Some(FailureReason::ComplianceDisallowed)
    );
    assert_eq!(report.outcome_for("310-31001").unwrap().outcome, OutcomeKind::Succeeded);
    assert_eq!(report.records_failed, 2);
}

#[tokio::test]
async fn test_unknown_source_rejects_batch() {
    let harness = Harness::new();
    let result = harness
        .scheduler(fast_config())
        .run(vec![ScrapeRequest::new("edgar", "0000320193")])
        .await;

    assert!(matches!(result, Err(EngineError::UnknownSource(_))));
    assert_eq!(harness.mock.call_count(), 0);
}

#[tokio::test]
async fn test_invalid_config_rejects_batch() {
    let harness = Harness::new();
    let result = harness
        .scheduler(fast_config().with_concurrency(0))
        .run(ccass_requests(&["00700"]))
        .await;

    assert!(matches!(result, Err(EngineError::InvalidConfig(_))));
}

#[tokio::test]
async fn test_rerun_updates_instead_of_inserting() {
    let harness = Harness::new();
    let scheduler = harness.scheduler(fast_config());

    let first = scheduler.run(ccass_requests(&["00700", "00005"])).await.unwrap();
    let keys_after_first = harness.store.keys();
    let second = scheduler.run(ccass_requests(&["00700", "00005"])).await.unwrap();

    assert!(first.records_inserted > 0);
    assert_eq!(first.records_updated, 0);
    assert_eq!(second.records_inserted, 0);
    assert_eq!(second.records_updated, first.records_inserted);
    assert_eq!(harness.store.keys(), keys_after_first);
    assert_ne!(first.run_id, second.run_id);
}

#[tokio::test]
async fn test_storage_failure_is_reported_per_request() {
    let harness = Harness::new();
    harness.store.set_unavailable(true);

    let report = harness
        .scheduler(fast_config())
        .run(ccass_requests(&["00700"]))
        .await
        .unwrap();

    let outcome = report.outcome_for("00700").unwrap();
    assert_eq!(outcome.reason, Some(FailureReason::StorageFailed));
    assert_eq!(outcome.attempts.len(), 1);
    assert_eq!(report.records_failed, 1);
}

#[tokio::test]
async fn test_fetch_attempts_exclude_healing_validation() {
    let harness = Harness::new();
    let report = harness
        .scheduler(fast_config())
        .run(ccass_requests(&["00700"]))
        .await
        .unwrap();

    let outcome = report.outcome_for("00700").unwrap();
    assert!(outcome
        .attempts
        .iter()
        .all(|a| a.purpose == AttemptPurpose::Fetch));
    assert_eq!(outcome.fetch_attempts(), 1);
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test]
async fn test_cancelled_before_start_dispatches_nothing() {
    let harness = Harness::new();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = harness
        .scheduler(fast_config())
        .run_with_cancel(ccass_requests(&["00700", "00005", "00388"]), cancel)
        .await
        .unwrap();

    assert_eq!(report.outcomes.len(), 3);
    assert!(report
        .outcomes
        .iter()
        .all(|o| o.reason == Some(FailureReason::Cancelled)));
    assert_eq!(harness.mock.call_count(), 0);
    assert_eq!(report.records_failed, 3);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_mid_run_lets_in_flight_finish() {
    let harness = Harness::new();
    let slow = harness.mock.clone().with_default_delay(Duration::from_millis(100));
    let cancel = CancellationToken::new();

    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let report = harness
        .scheduler_with(fast_config(), StrategySet::all_mock(slow.clone()))
        .run_with_cancel(ccass_requests(&["00700", "00005", "00388", "00001"]), cancel)
        .await
        .unwrap();

    assert_eq!(report.outcomes.len(), 4);
    assert_eq!(report.outcome_for("00700").unwrap().outcome, OutcomeKind::Succeeded);
    for key in ["00005", "00388", "00001"] {
        assert_eq!(
            report.outcome_for(key).unwrap().reason,
            Some(FailureReason::Cancelled)
        );
    }
    assert_eq!(slow.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_pacing_wait_stops_escalation() {
    let harness = Harness::new();
    harness.mock.script_for(
        StrategyKind::HttpFetch,
        &harness.url("ccass", "00700"),
        vec![MockResponse::html("<html><body></body></html>")],
    );
    let cancel = CancellationToken::new();

    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        canceller.cancel();
    });

    let started = tokio::time::Instant::now();
    let report = harness
        .scheduler(fast_config().with_inter_request_delay_ms(5_000))
        .run_with_cancel(ccass_requests(&["00700"]), cancel)
        .await
        .unwrap();

    let outcome = report.outcome_for("00700").unwrap();
    assert_eq!(outcome.reason, Some(FailureReason::Cancelled));
    assert_eq!(outcome.attempts.len(), 1);
    assert_eq!(harness.mock.calls_for(StrategyKind::HeadlessRender), 0);
    assert!(started.elapsed() < Duration::from_secs(5));
}
