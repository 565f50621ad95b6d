//! Deterministic mock strategy.
//!
//! Serves scripted responses per URL, falling back to a fixture generator.
//! Test mode uses this strategy with adapter fixture pages; tests script it to
//! simulate escalation, transient failures, and slow fetches.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use super::{FetchConfig, FetchTarget};
use crate::error::FetchError;
use crate::types::{ExtractionAttempt, StrategyKind};

/// Generates a page for a target, or `None` when it has no fixture.
pub type FixtureFn = Arc<dyn Fn(&FetchTarget) -> Option<String> + Send + Sync>;

/// One canned reply.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub result: Result<String, FetchError>,
    pub delay: Duration,
}

impl MockResponse {
    pub fn html(body: impl Into<String>) -> Self {
        Self {
            result: Ok(body.into()),
            delay: Duration::ZERO,
        }
    }

    pub fn error(error: FetchError) -> Self {
        Self {
            result: Err(error),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

type ScriptKey = (Option<StrategyKind>, String);

#[derive(Default)]
struct MockState {
    /// Queued replies; the last entry repeats once the queue drains
    scripts: RwLock<HashMap<ScriptKey, VecDeque<MockResponse>>>,
    calls: RwLock<Vec<(StrategyKind, String)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// Scriptable strategy with call tracking. Clones share state.
#[derive(Clone)]
pub struct MockStrategy {
    state: Arc<MockState>,
    fixture: Option<FixtureFn>,
    default_delay: Duration,
    reported_kind: StrategyKind,
}

impl Default for MockStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl MockStrategy {
    pub fn new() -> Self {
        Self {
            state: Arc::new(MockState::default()),
            fixture: None,
            default_delay: Duration::ZERO,
            reported_kind: StrategyKind::Mock,
        }
    }

    /// Mock whose unscripted replies come from `fixture`.
    pub fn with_fixture(mut self, fixture: FixtureFn) -> Self {
        self.fixture = Some(fixture);
        self
    }

    /// Delay applied to fixture replies.
    pub fn with_default_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    /// Clone sharing state that records attempts as `kind`.
    ///
    /// Scripts registered with [`MockStrategy::script_for`] for `kind` apply
    /// only to this slot.
    pub fn impersonating(&self, kind: StrategyKind) -> Self {
        Self {
            reported_kind: kind,
            ..self.clone()
        }
    }

    pub fn reported_kind(&self) -> StrategyKind {
        self.reported_kind
    }

    /// Script replies for a URL on every slot.
    pub fn script(&self, url: &str, responses: Vec<MockResponse>) -> &Self {
        self.push_script((None, url.to_string()), responses);
        self
    }

    /// Script replies for a URL on one impersonated slot.
    pub fn script_for(&self, kind: StrategyKind, url: &str, responses: Vec<MockResponse>) -> &Self {
        self.push_script((Some(kind), url.to_string()), responses);
        self
    }

    fn push_script(&self, key: ScriptKey, responses: Vec<MockResponse>) {
        self.state
            .scripts
            .write()
            .unwrap()
            .entry(key)
            .or_default()
            .extend(responses);
    }

    pub fn call_count(&self) -> usize {
        self.state.calls.read().unwrap().len()
    }

    pub fn calls(&self) -> Vec<(StrategyKind, String)> {
        self.state.calls.read().unwrap().clone()
    }

    pub fn calls_for(&self, kind: StrategyKind) -> usize {
        self.state
            .calls
            .read()
            .unwrap()
            .iter()
            .filter(|(k, _)| *k == kind)
            .count()
    }

    /// Highest number of simultaneous fetches observed.
    pub fn max_in_flight(&self) -> usize {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_scripted(&self, url: &str) -> Option<MockResponse> {
        let mut scripts = self.state.scripts.write().unwrap();
        let specific = (Some(self.reported_kind), url.to_string());
        let shared = (None, url.to_string());

        let queue = if scripts.contains_key(&specific) {
            scripts.get_mut(&specific)
        } else {
            scripts.get_mut(&shared)
        }?;

        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }

    pub(crate) async fn fetch(&self, target: &FetchTarget, _config: &FetchConfig) -> ExtractionAttempt {
        let started = Instant::now();
        let url = target.url.to_string();
        self.state
            .calls
            .write()
            .unwrap()
            .push((self.reported_kind, url.clone()));

        let now = self.state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let response = self.next_scripted(&url).unwrap_or_else(|| {
            match self.fixture.as_ref().and_then(|f| f(target)) {
                Some(body) => MockResponse::html(body).with_delay(self.default_delay),
                None => MockResponse::error(FetchError::HttpStatus { status: 404 }),
            }
        });

        if !response.delay.is_zero() {
            tokio::time::sleep(response.delay).await;
        }
        self.state.in_flight.fetch_sub(1, Ordering::SeqCst);

        let elapsed = started.elapsed().as_millis() as u64;
        match response.result {
            Ok(body) => {
                ExtractionAttempt::content(self.reported_kind, body, elapsed).with_http_status(200)
            }
            Err(error) => ExtractionAttempt::failed(self.reported_kind, error, elapsed),
        }
    }
}
