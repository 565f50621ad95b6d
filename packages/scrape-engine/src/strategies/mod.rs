//! Extraction strategies.
//!
//! Strategies are a closed enum: every variant honours the same
//! [`Strategy::fetch`] contract and always returns an [`ExtractionAttempt`],
//! never an `Err`. A [`StrategySet`] maps each [`StrategyKind`] slot to the
//! configured backend for one run.

mod headless;
mod http;
mod mock;
mod rendering_api;

pub use headless::{HeadlessRenderStrategy, PageRenderer};
#[cfg(feature = "chromium")]
pub use headless::ChromiumRenderer;
pub use http::HttpFetchStrategy;
pub use mock::{FixtureFn, MockResponse, MockStrategy};
pub use rendering_api::{RenderingApiConfig, RenderingApiStrategy};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use url::Url;

use crate::types::{ExtractionAttempt, StrategyKind};

/// What to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTarget {
    pub url: Url,
    pub source: String,
    pub target_key: String,
}

impl FetchTarget {
    pub fn new(url: Url, source: impl Into<String>, target_key: impl Into<String>) -> Self {
        Self {
            url,
            source: source.into(),
            target_key: target_key.into(),
        }
    }
}

/// Per-attempt knobs shared by all strategies.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub fetch_timeout: Duration,
    pub render_timeout: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: crate::scheduler::DEFAULT_USER_AGENT.to_string(),
            fetch_timeout: Duration::from_secs(30),
            render_timeout: Duration::from_secs(60),
        }
    }
}

/// A configured extraction backend.
pub enum Strategy {
    HttpFetch(HttpFetchStrategy),
    HeadlessRender(HeadlessRenderStrategy),
    RenderingApi(RenderingApiStrategy),
    Mock(MockStrategy),
}

impl Strategy {
    /// Kind recorded in attempt logs.
    pub fn kind(&self) -> StrategyKind {
        match self {
            Self::HttpFetch(_) => StrategyKind::HttpFetch,
            Self::HeadlessRender(_) => StrategyKind::HeadlessRender,
            Self::RenderingApi(_) => StrategyKind::RenderingApi,
            Self::Mock(m) => m.reported_kind(),
        }
    }

    pub async fn fetch(&self, target: &FetchTarget, config: &FetchConfig) -> ExtractionAttempt {
        match self {
            Self::HttpFetch(s) => s.fetch(target, config).await,
            Self::HeadlessRender(s) => s.fetch(target, config).await,
            Self::RenderingApi(s) => s.fetch(target, config).await,
            Self::Mock(s) => s.fetch(target, config).await,
        }
    }
}

/// Strategy slots for one run.
#[derive(Clone, Default)]
pub struct StrategySet {
    slots: HashMap<StrategyKind, Arc<Strategy>>,
}

impl StrategySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_strategy(mut self, slot: StrategyKind, strategy: Strategy) -> Self {
        self.slots.insert(slot, Arc::new(strategy));
        self
    }

    /// Route every ladder slot (and the `mock` slot) through one mock.
    ///
    /// Clones share scripts and call tracking, so assertions on `mock` see
    /// every slot's calls.
    pub fn all_mock(mock: MockStrategy) -> Self {
        let mut set = Self::new();
        for slot in StrategyKind::LADDER {
            set = set.with_strategy(slot, Strategy::Mock(mock.clone()));
        }
        set.with_strategy(StrategyKind::Mock, Strategy::Mock(mock))
    }

    pub fn get(&self, slot: StrategyKind) -> Option<Arc<Strategy>> {
        self.slots.get(&slot).cloned()
    }

    pub fn has(&self, slot: StrategyKind) -> bool {
        self.slots.contains_key(&slot)
    }

    /// Next configured slot up the ladder from `slot`.
    pub fn escalate_from(&self, slot: StrategyKind) -> Option<StrategyKind> {
        let mut next = slot.escalate();
        while let Some(candidate) = next {
            if self.has(candidate) {
                return Some(candidate);
            }
            next = candidate.escalate();
        }
        None
    }
}

/// Parse a `Retry-After` header given in delta-seconds.
pub(crate) fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escalation_skips_unconfigured_slots() {
        let mock = MockStrategy::new();
        let set = StrategySet::new()
            .with_strategy(StrategyKind::HttpFetch, Strategy::Mock(mock.clone()))
            .with_strategy(StrategyKind::RenderingApi, Strategy::Mock(mock));

        assert_eq!(
            set.escalate_from(StrategyKind::HttpFetch),
            Some(StrategyKind::RenderingApi)
        );
        assert_eq!(set.escalate_from(StrategyKind::RenderingApi), None);
        assert!(!set.has(StrategyKind::HeadlessRender));
    }

    #[test]
    fn test_retry_after_header() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, "7".parse().unwrap());
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(7)));

        headers.insert(RETRY_AFTER, "Wed, 21 Oct 2015 07:28:00 GMT".parse().unwrap());
        assert_eq!(retry_after(&headers), None);
    }
}
