//! Batch scheduling.
//!
//! [`BatchScheduler::run`] drives a set of [`ScrapeRequest`]s through the
//! per-request pipeline under a concurrency limit, per-domain pacing, and a
//! bounded retry budget. Every request ends in exactly one outcome in the
//! returned [`BatchReport`], listed in completion order.
//!
//! # Example
//!
//! ```rust,ignore
//! use scrape_engine::{BatchScheduler, SchedulerConfig, ScrapeRequest, SourceRegistry};
//!
//! let scheduler = BatchScheduler::new(
//!     SchedulerConfig::new().with_concurrency(2),
//!     SourceRegistry::builtin(),
//!     strategies,
//!     robots,
//!     sink,
//! );
//! let report = scheduler.run(vec![ScrapeRequest::new("ccass", "00700")]).await?;
//! ```

mod config;
mod context;
mod pipeline;

pub use config::{SchedulerConfig, DEFAULT_USER_AGENT};
pub use context::{DomainPacer, RunContext};

use std::sync::{Arc, Mutex};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::adapters::SourceRegistry;
use crate::aggregator::ResultAggregator;
use crate::compliance::{ComplianceGate, RobotsSource};
use crate::error::{EngineError, FailureReason};
use crate::extract::{Extractor, HtmlExtractor};
use crate::healing::{HeuristicSuggestionGenerator, SelectorHealer, SuggestionGenerator};
use crate::store::RecordSink;
use crate::strategies::StrategySet;
use crate::types::{BatchReport, RequestOutcome, ScrapeRequest};
use pipeline::{Processed, RequestPipeline};

/// Runs batches of scrape requests.
pub struct BatchScheduler {
    config: SchedulerConfig,
    registry: SourceRegistry,
    strategies: StrategySet,
    robots: Arc<dyn RobotsSource>,
    sink: Arc<dyn RecordSink>,
    extractor: Arc<dyn Extractor>,
    generator: Arc<dyn SuggestionGenerator>,
}

impl BatchScheduler {
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
            extractor: Arc::new(HtmlExtractor),
            generator: Arc::new(HeuristicSuggestionGenerator),
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_suggestion_generator(mut self, generator: Arc<dyn SuggestionGenerator>) -> Self {
        self.generator = generator;
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Run a batch to completion.
    pub async fn run(&self, requests: Vec<ScrapeRequest>) -> Result<BatchReport, EngineError> {
        self.run_with_cancel(requests, CancellationToken::new()).await
    }

    /// Run a batch, stopping new dispatches and retries once `cancel` fires.
    ///
    /// Attempts already in flight complete; requests never dispatched are
    /// reported as `cancelled`.
    pub async fn run_with_cancel(
        &self,
        requests: Vec<ScrapeRequest>,
        cancel: CancellationToken,
    ) -> Result<BatchReport, EngineError> {
        self.config.validate()?;
        for request in &requests {
            self.registry.get(&request.source)?;
        }

        let gate = ComplianceGate::new(Arc::clone(&self.robots), self.config.compliance_policy);
        let ctx = Arc::new(RunContext::new(gate, cancel.clone()));
        let pipeline = Arc::new(RequestPipeline {
            config: self.config.clone(),
            fetch_config: self.config.fetch_config(),
            registry: self.registry.clone(),
            strategies: self.strategies.clone(),
            extractor: Arc::clone(&self.extractor),
            healer: SelectorHealer::new(Arc::clone(&self.generator), Arc::clone(&self.extractor)),
            sink: Arc::clone(&self.sink),
            ctx: Arc::clone(&ctx),
        });

        info!(
            run_id = %ctx.run_id,
            requests = requests.len(),
            concurrency = self.config.concurrency,
            "Starting batch run"
        );

        let aggregator = Arc::new(Mutex::new(ResultAggregator::new(ctx.run_id)));
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let mut tasks = JoinSet::new();
        let mut pending = requests.into_iter();

        for request in pending.by_ref() {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                record_cancelled(&aggregator, request);
                break;
            };

            let pipeline = Arc::clone(&pipeline);
            let aggregator = Arc::clone(&aggregator);
            tasks.spawn(async move {
                let Processed { outcome, healed } = pipeline.process(request).await;
                drop(permit);

                let mut aggregator = aggregator.lock().unwrap();
                if let Some(healed) = healed {
                    aggregator.record_healed(healed);
                }
                aggregator.record(outcome);
            });
        }

        for request in pending {
            record_cancelled(&aggregator, request);
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Request task failed");
            }
        }

        let finished = std::mem::replace(
            &mut *aggregator.lock().unwrap(),
            ResultAggregator::new(ctx.run_id),
        );
        Ok(finished.finish())
    }
}

fn record_cancelled(aggregator: &Mutex<ResultAggregator>, request: ScrapeRequest) {
    aggregator.lock().unwrap().record(RequestOutcome::failed(
        request.source,
        request.target_key,
        FailureReason::Cancelled,
        "run cancelled before dispatch",
        Vec::new(),
    ));
}
