//! Invocation contract.
//!
//! [`ScrapeService`] accepts the external `{ source, strategy?, options }`
//! body, expands it into one [`ScrapeRequest`] per target key, runs the batch,
//! and condenses the [`BatchReport`] into a [`ScrapeResponse`].
//!
//! In test mode every strategy slot is served by a [`MockStrategy`] that
//! renders the adapter's fixture page for each key, robots rules come from
//! [`StaticRobotsSource::allow_all`], no inter-request delay is applied, and
//! records go to a fresh [`MemoryRecordStore`] that is dropped with the run.
//! Repeating a test-mode invocation yields the same counts every time and
//! never touches the service's own sink.

use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::adapters::SourceRegistry;
use crate::compliance::{RobotsSource, StaticRobotsSource};
use crate::error::{EngineError, FailureReason};
use crate::scheduler::{BatchScheduler, SchedulerConfig};
use crate::store::{MemoryRecordStore, RecordSink};
use crate::strategies::{FetchTarget, FixtureFn, MockStrategy, StrategySet};
use crate::types::{BatchReport, DateRange, OutcomeKind, RequestOptions, ScrapeRequest, StrategyKind};

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeInvocation {
    pub source: String,
    #[serde(default)]
    pub strategy: Option<String>,
    pub options: InvocationOptions,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationOptions {
    pub target_keys: Vec<String>,
    #[serde(default)]
    pub date_range: Option<DateRange>,
    #[serde(default)]
    pub test_mode: bool,
    #[serde(default)]
    pub strict: bool,
    #[serde(default)]
    pub allow_partial: bool,
}

impl ScrapeInvocation {
    pub fn new(source: impl Into<String>, target_keys: Vec<String>) -> Self {
        Self {
            source: source.into(),
            strategy: None,
            options: InvocationOptions {
                target_keys,
                ..InvocationOptions::default()
            },
        }
    }

    pub fn with_strategy(mut self, strategy: impl Into<String>) -> Self {
        self.strategy = Some(strategy.into());
        self
    }

    pub fn with_date_range(mut self, range: DateRange) -> Self {
        self.options.date_range = Some(range);
        self
    }

    pub fn with_test_mode(mut self, test_mode: bool) -> Self {
        self.options.test_mode = test_mode;
        self
    }

    /// Expand into one request per target key, rejecting structural problems.
    pub fn into_requests(self, registry: &SourceRegistry) -> Result<Vec<ScrapeRequest>, EngineError> {
        registry.get(&self.source)?;

        let strategy_hint = self
            .strategy
            .as_deref()
            .map(StrategyKind::from_str)
            .transpose()?;
        let date_range = self
            .options
            .date_range
            .map(|r| DateRange::new(r.start, r.end))
            .transpose()?;
        if self.options.target_keys.is_empty() {
            return Err(EngineError::InvalidConfig(
                "options.targetKeys must list at least one key".to_string(),
            ));
        }

        let options = RequestOptions {
            strict: self.options.strict,
            allow_partial: self.options.allow_partial,
        };
        Ok(self
            .options
            .target_keys
            .into_iter()
            .map(|key| ScrapeRequest {
                source: self.source.clone(),
                target_key: key,
                date_range,
                strategy_hint,
                options,
            })
            .collect())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestDetail {
    pub target_key: String,
    pub outcome: OutcomeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<FailureReason>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeResponse {
    /// The batch ran; per-request failures are in the detail list
    pub success: bool,
    pub records_inserted: usize,
    pub records_updated: usize,
    pub records_failed: usize,
    pub per_request_detail: Vec<RequestDetail>,
}

impl From<&BatchReport> for ScrapeResponse {
    fn from(report: &BatchReport) -> Self {
        Self {
            success: true,
            records_inserted: report.records_inserted,
            records_updated: report.records_updated,
            records_failed: report.records_failed,
            per_request_detail: report
                .outcomes
                .iter()
                .map(|o| RequestDetail {
                    target_key: o.target_key.clone(),
                    outcome: o.outcome,
                    reason: o.reason,
                })
                .collect(),
        }
    }
}

/// Entry point shared by the HTTP surface and embedding callers.
pub struct ScrapeService {
    config: SchedulerConfig,
    registry: SourceRegistry,
    strategies: StrategySet,
    robots: Arc<dyn RobotsSource>,
    sink: Arc<dyn RecordSink>,
}

impl ScrapeService {
    pub fn new(
        config: SchedulerConfig,
        registry: SourceRegistry,
        strategies: StrategySet,
        robots: Arc<dyn RobotsSource>,
        sink: Arc<dyn RecordSink>,
    ) -> Self {
        Self {
            config,
            registry,
            strategies,
            robots,
            sink,
        }
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    pub fn strategies(&self) -> &StrategySet {
        &self.strategies
    }

    /// Run an invocation and return the full report.
    pub async fn execute(&self, invocation: ScrapeInvocation) -> Result<BatchReport, EngineError> {
        let test_mode = invocation.options.test_mode;
        let date_range = invocation.options.date_range;
        let requests = invocation.into_requests(&self.registry)?;

        let scheduler = if test_mode {
            info!(requests = requests.len(), "Running batch in test mode");
            self.test_mode_scheduler(date_range, Arc::new(MemoryRecordStore::new()))
        } else {
            BatchScheduler::new(
                self.config.clone(),
                self.registry.clone(),
                self.strategies.clone(),
                Arc::clone(&self.robots),
                Arc::clone(&self.sink),
            )
        };

        scheduler.run(requests).await
    }

    /// Run an invocation and return the response contract.
    pub async fn invoke(&self, invocation: ScrapeInvocation) -> Result<ScrapeResponse, EngineError> {
        let report = self.execute(invocation).await?;
        Ok(ScrapeResponse::from(&report))
    }

    fn test_mode_scheduler(&self, date_range: Option<DateRange>, sink: Arc<dyn RecordSink>) -> BatchScheduler {
        BatchScheduler::new(
            self.config.clone().with_inter_request_delay_ms(0),
            self.registry.clone(),
            StrategySet::all_mock(self.fixture_strategy(date_range)),
            Arc::new(StaticRobotsSource::allow_all()),
            sink,
        )
    }

    fn fixture_strategy(&self, date_range: Option<DateRange>) -> MockStrategy {
        let registry = self.registry.clone();
        let fixture: FixtureFn = Arc::new(move |target: &FetchTarget| {
            registry
                .get(&target.source)
                .ok()
                .map(|adapter| adapter.fixture_page(&target.target_key, date_range.as_ref()))
        });
        MockStrategy::new().with_fixture(fixture)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn service() -> ScrapeService {
        ScrapeService::new(
            SchedulerConfig::new().with_concurrency(1),
            SourceRegistry::builtin(),
            StrategySet::new(),
            Arc::new(StaticRobotsSource::new()),
            Arc::new(MemoryRecordStore::new()),
        )
    }

    #[test]
    fn test_invocation_body_parses() {
        let body = serde_json::json!({
            "source": "ccass",
            "strategy": "http-fetch",
            "options": {
                "targetKeys": ["00700", "00005"],
                "dateRange": {"start": "2024-03-01", "end": "2024-03-01"},
                "testMode": true
            }
        });
        let invocation: ScrapeInvocation = serde_json::from_value(body).unwrap();
        let requests = invocation.into_requests(&SourceRegistry::builtin()).unwrap();

        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].target_key, "00005");
        assert_eq!(requests[0].strategy_hint, Some(StrategyKind::HttpFetch));
        assert_eq!(
            requests[0].date_range.unwrap().end,
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
        );
    }

    #[test]
    fn test_structural_errors() {
        let registry = SourceRegistry::builtin();

        let unknown_source = ScrapeInvocation::new("edgar", vec!["1".into()]);
        assert!(matches!(
            unknown_source.into_requests(&registry),
            Err(EngineError::UnknownSource(_))
        ));

        let unknown_strategy = ScrapeInvocation::new("ccass", vec!["1".into()]).with_strategy("telepathy");
        assert!(matches!(
            unknown_strategy.into_requests(&registry),
            Err(EngineError::UnknownStrategy(_))
        ));

        let backwards = ScrapeInvocation::new("ccass", vec!["1".into()]).with_date_range(DateRange {
            start: NaiveDate::from_ymd_opt(2024, 3, 2).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        });
        assert!(matches!(
            backwards.into_requests(&registry),
            Err(EngineError::InvalidConfig(_))
        ));

        let empty = ScrapeInvocation::new("ccass", Vec::new());
        assert!(empty.into_requests(&registry).is_err());
    }

    #[tokio::test]
    async fn test_mode_uses_fixtures() {
        let response = service()
            .invoke(ScrapeInvocation::new("ccass", vec!["00700".into()]).with_test_mode(true))
            .await
            .unwrap();

        assert!(response.success);
        assert!(response.records_inserted >= 1);
        assert_eq!(response.records_failed, 0);
        assert_eq!(response.per_request_detail[0].outcome, OutcomeKind::Succeeded);
    }

    #[tokio::test]
    async fn test_mode_repeats_identically_and_leaves_sink_alone() {
        let live = Arc::new(MemoryRecordStore::new());
        let service = ScrapeService::new(
            SchedulerConfig::new().with_concurrency(1),
            SourceRegistry::builtin(),
            StrategySet::new(),
            Arc::new(StaticRobotsSource::new()),
            live.clone(),
        );
        let invocation = ScrapeInvocation::new("ccass", vec!["00700".into()]).with_test_mode(true);

        let first = service.invoke(invocation.clone()).await.unwrap();
        let second = service.invoke(invocation).await.unwrap();

        assert!(first.records_inserted >= 1);
        assert_eq!(first.records_updated, 0);
        assert_eq!(first, second);
        assert!(live.is_empty());
    }

    #[tokio::test]
    async fn test_mode_normalizes_the_same_rows_each_run() {
        let service = service();
        let requests = || {
            ScrapeInvocation::new("ccass", vec!["00700".into(), "00005".into()])
                .into_requests(service.registry())
                .unwrap()
        };

        let mut runs = Vec::new();
        for _ in 0..2 {
            let store = Arc::new(MemoryRecordStore::new());
            service
                .test_mode_scheduler(None, store.clone())
                .run(requests())
                .await
                .unwrap();
            runs.push(store);
        }

        assert!(!runs[0].is_empty());
        assert_eq!(runs[0].keys(), runs[1].keys());
        for key in runs[0].keys() {
            assert_eq!(runs[0].get(&key), runs[1].get(&key));
        }
    }

    #[test]
    fn test_response_serializes_camel_case() {
        let response = ScrapeResponse {
            success: true,
            records_inserted: 1,
            records_updated: 0,
            records_failed: 1,
            per_request_detail: vec![RequestDetail {
                target_key: "00700".to_string(),
                outcome: OutcomeKind::Failed,
                reason: Some(FailureReason::ComplianceDisallowed),
            }],
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["recordsInserted"], 1);
        assert_eq!(json["perRequestDetail"][0]["reason"], "compliance-disallowed");
        assert_eq!(json["perRequestDetail"][0]["outcome"], "failed");
    }
}
