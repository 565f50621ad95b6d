//! Shared harness for scheduler integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use scrape_engine::strategies::FixtureFn;
use scrape_engine::testing::{MemoryRecordStore, MockStrategy, StaticRobotsSource};
use scrape_engine::{
    BatchScheduler, FetchTarget, SchedulerConfig, ScrapeRequest, SourceRegistry, Strategy,
    StrategyKind, StrategySet,
};

pub const HKEX_SDW: &str = "https://www3.hkexnews.hk";

/// Mock strategy, robots source, and store wired into a scheduler.
pub struct Harness {
    pub registry: SourceRegistry,
    pub mock: MockStrategy,
    pub robots: StaticRobotsSource,
    pub store: Arc<MemoryRecordStore>,
}

impl Harness {
    /// Mock serving every adapter's fixture page; robots allow everything.
    pub fn new() -> Self {
        let registry = SourceRegistry::builtin();
        let fixture_registry = registry.clone();
        let fixture: FixtureFn = Arc::new(move |target: &FetchTarget| {
            fixture_registry
                .get(&target.source)
                .ok()
                .map(|adapter| adapter.fixture_page(&target.target_key, None))
        });
        Self::with_fixture(registry, fixture)
    }

    pub fn with_fixture(registry: SourceRegistry, fixture: FixtureFn) -> Self {
        Self {
            registry,
            mock: MockStrategy::new().with_fixture(fixture),
            robots: StaticRobotsSource::allow_all(),
            store: Arc::new(MemoryRecordStore::new()),
        }
    }

    pub fn with_robots(mut self, robots: StaticRobotsSource) -> Self {
        self.robots = robots;
        self
    }

    /// Every ladder slot backed by the shared mock, reporting its own kind.
    pub fn strategies(&self) -> StrategySet {
        StrategyKind::LADDER
            .into_iter()
            .fold(StrategySet::new(), |set, kind| {
                set.with_strategy(kind, Strategy::Mock(self.mock.impersonating(kind)))
            })
    }

    pub fn scheduler(&self, config: SchedulerConfig) -> BatchScheduler {
        self.scheduler_with(config, self.strategies())
    }

    pub fn scheduler_with(&self, config: SchedulerConfig, strategies: StrategySet) -> BatchScheduler {
        BatchScheduler::new(
            config,
            self.registry.clone(),
            strategies,
            Arc::new(self.robots.clone()),
            self.store.clone(),
        )
    }

    /// Target URL the mock sees for a request.
    pub fn url(&self, source: &str, key: &str) -> String {
        self.registry
            .get(source)
            .and_then(|adapter| adapter.target_url(key, None))
            .map(|url| url.to_string())
            .unwrap()
    }

    pub fn fixture(&self, source: &str, key: &str) -> String {
        self.registry.get(source).unwrap().fixture_page(key, None)
    }
}

/// Fast config: no pacing gap and millisecond backoff.
pub fn fast_config() -> SchedulerConfig {
    SchedulerConfig::new()
        .with_concurrency(1)
        .with_inter_request_delay_ms(0)
        .with_backoff(1, 5)
}

pub fn ccass_requests(keys: &[&str]) -> Vec<ScrapeRequest> {
    keys.iter().map(|key| ScrapeRequest::new("ccass", *key)).collect()
}
