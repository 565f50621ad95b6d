//! Integration tests for selector healing inside a batch.
//!
//! These tests verify:
//! 1. A renamed column is healed once and the replacement is reused for the run
//! 2. Healed selectors are listed in the report for promotion
//! 3. Healing runs at most once per request and failures end in `selector-exhausted`
//! 4. Overrides do not leak into the next run

mod common;

use std::sync::Arc;

use common::{ccass_requests, fast_config, Harness};
use scrape_engine::strategies::FixtureFn;
use scrape_engine::testing::StaticSuggestionGenerator;
use scrape_engine::types::AttemptPurpose;
use scrape_engine::{
    CcassAdapter, FailureReason, FetchTarget, HealingSuggestion, OutcomeKind, SourceAdapter,
    SourceRegistry,
};

/// CCASS fixture with the shareholding column's class renamed.
fn renamed_column_fixture() -> FixtureFn {
    Arc::new(|target: &FetchTarget| {
        Some(
            CcassAdapter::new()
                .fixture_page(&target.target_key, None)
                .replace(
                    r#"class="col-shareholding text-right""#,
                    r#"class="col-shareholding-amount text-right""#,
                ),
        )
    })
}

fn renamed_harness() -> Harness {
    Harness::with_fixture(SourceRegistry::builtin(), renamed_column_fixture())
}

#[tokio::test]
async fn test_renamed_column_is_healed_and_reused() {
    let harness = renamed_harness();

    let report = harness
        .scheduler(fast_config())
        .run(ccass_requests(&["00700", "00005"]))
        .await
        .unwrap();

    assert_eq!(report.succeeded(), 2);
    assert!(!report.has_reason(FailureReason::SelectorExhausted));

    assert_eq!(report.healed_selectors.len(), 1);
    let healed = &report.healed_selectors[0];
    assert_eq!(healed.source, "ccass");
    assert_eq!(healed.field, "row.shareholding");
    assert_eq!(healed.previous, "td.col-shareholding .mobile-list-body");
    assert_eq!(healed.replacement, "td.col-shareholding-amount .mobile-list-body");

    // Only the first request paid for healing
    let first = report.outcome_for(&healed.target_key).unwrap();
    let validations: Vec<_> = first
        .attempts
        .iter()
        .filter(|a| a.purpose == AttemptPurpose::HealingValidation)
        .collect();
    assert_eq!(validations.len(), 1);
    assert!(validations[0].is_success());
    assert_eq!(
        validations[0].selector_used.as_deref(),
        Some("td.col-shareholding-amount .mobile-list-body")
    );

    let other_key = if healed.target_key == "00700" { "00005" } else { "00700" };
    let second = report.outcome_for(other_key).unwrap();
    assert!(second
        .attempts
        .iter()
        .all(|a| a.purpose == AttemptPurpose::Fetch));
}

#[tokio::test]
async fn test_healed_records_carry_values() {
    let harness = renamed_harness();

    let report = harness
        .scheduler(fast_config())
        .run(ccass_requests(&["00700"]))
        .await
        .unwrap();

    assert_eq!(report.outcome_for("00700").unwrap().outcome, OutcomeKind::Succeeded);
    assert!(report.records_inserted >= 1);
    assert!(harness.store.keys().iter().all(|k| k.starts_with("ccass:00700:")));
}

#[tokio::test]
async fn test_override_does_not_outlive_run() {
    let harness = renamed_harness();
    let scheduler = harness.scheduler(fast_config());

    let first = scheduler.run(ccass_requests(&["00700"])).await.unwrap();
    let second = scheduler.run(ccass_requests(&["00005"])).await.unwrap();

    assert_eq!(first.healed_selectors.len(), 1);
    assert_eq!(second.healed_selectors.len(), 1);
}

#[tokio::test]
async fn test_unvalidated_suggestions_exhaust() {
    let harness = renamed_harness();
    let generator = Arc::new(StaticSuggestionGenerator::new(vec![
        HealingSuggestion::new("td.does-not-exist .mobile-list-body", 90),
    ]));

    let report = harness
        .scheduler(fast_config())
        .with_suggestion_generator(generator.clone())
        .run(ccass_requests(&["00700"]))
        .await
        .unwrap();

    let outcome = report.outcome_for("00700").unwrap();
    assert_eq!(outcome.reason, Some(FailureReason::SelectorExhausted));
    assert!(report.healed_selectors.is_empty());
    assert_eq!(
        generator.requests(),
        vec![("ccass".to_string(), "row.shareholding".to_string())]
    );

    let last = outcome.attempts.last().unwrap();
    assert_eq!(last.purpose, AttemptPurpose::HealingValidation);
    assert!(!last.is_success());
    assert_eq!(outcome.fetch_attempts(), 1);
    assert!(harness.store.is_empty());
}

#[tokio::test]
async fn test_no_suggestions_exhaust_without_validation_attempt() {
    let harness = renamed_harness();
    let generator = Arc::new(StaticSuggestionGenerator::new(Vec::new()));

    let report = harness
        .scheduler(fast_config())
        .with_suggestion_generator(generator)
        .run(ccass_requests(&["00700"]))
        .await
        .unwrap();

    let outcome = report.outcome_for("00700").unwrap();
    assert_eq!(outcome.reason, Some(FailureReason::SelectorExhausted));
    assert_eq!(outcome.attempts.len(), 1);
}
