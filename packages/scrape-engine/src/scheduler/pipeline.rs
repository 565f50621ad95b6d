//! One request's path: compliance, fetch with retry and escalation,
//! extraction with at most one healing pass, normalization, upsert.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use super::{RunContext, SchedulerConfig};
use crate::adapters::{domain_of, AttemptMetadata, SourceAdapter, SourceRegistry};
use crate::error::{FailureReason, FetchError};
use crate::extract::{Extractor, RawFields};
use crate::healing::{SelectorHealer, SelectorHealingRequest};
use crate::store::RecordSink;
use crate::strategies::{FetchConfig, FetchTarget, StrategySet};
use crate::types::{
    AttemptOutcome, ExtractionAttempt, HealedSelector, OutcomeKind, Provenance, RequestOutcome,
    ScrapeRequest, StrategyKind,
};

/// Terminal result of one request, plus any selector it healed.
pub(crate) struct Processed {
    pub outcome: RequestOutcome,
    pub healed: Option<HealedSelector>,
}

impl From<RequestOutcome> for Processed {
    fn from(outcome: RequestOutcome) -> Self {
        Self {
            outcome,
            healed: None,
        }
    }
}

/// Shared, cloneable pieces a spawned request needs.
pub(crate) struct RequestPipeline {
    pub config: SchedulerConfig,
    pub fetch_config: FetchConfig,
    pub registry: SourceRegistry,
    pub strategies: StrategySet,
    pub extractor: Arc<dyn Extractor>,
    pub healer: SelectorHealer,
    pub sink: Arc<dyn RecordSink>,
    pub ctx: Arc<RunContext>,
}

/// Content that passed the shape check.
struct Fetched {
    body: Arc<str>,
    strategy: StrategyKind,
}

impl RequestPipeline {
    pub async fn process(&self, request: ScrapeRequest) -> Processed {
        let fail = |reason: FailureReason, detail: String, attempts: Vec<ExtractionAttempt>| {
            Processed::from(RequestOutcome::failed(
                &request.source,
                &request.target_key,
                reason,
                detail,
                attempts,
            ))
        };

        let adapter = match self.registry.get(&request.source) {
            Ok(adapter) => adapter,
            Err(e) => return fail(FailureReason::ValidationFailed, e.to_string(), Vec::new()),
        };
        let url = match adapter.target_url(&request.target_key, request.date_range.as_ref()) {
            Ok(url) => url,
            Err(e) => return fail(FailureReason::ValidationFailed, e.to_string(), Vec::new()),
        };

        let domain = domain_of(&url);
        let path = match url.query() {
            Some(query) => format!("{}?{query}", url.path()),
            None => url.path().to_string(),
        };
        let decision = self
            .ctx
            .gate
            .evaluate(&domain, &path, &self.config.user_agent)
            .await;
        if !decision.allowed {
            info!(
                source = %request.source,
                target_key = %request.target_key,
                reasons = ?decision.reasons,
                "Request denied by compliance gate"
            );
            return fail(
                FailureReason::ComplianceDisallowed,
                decision.reasons.join("; "),
                Vec::new(),
            );
        }

        let gap = self.config.inter_request_delay().max(decision.crawl_delay());
        let target = FetchTarget::new(url, &request.source, &request.target_key);

        let mut attempts = Vec::new();
        let fetched = match self.fetch(&request, adapter.as_ref(), &target, &domain, gap, &mut attempts).await {
            Ok(fetched) => fetched,
            Err((reason, detail)) => return fail(reason, detail, attempts),
        };

        let spec = self.ctx.spec_for(adapter.as_ref());
        let mut healed = None;
        let fields: RawFields = match self.extractor.extract(&fetched.body, &spec) {
            Ok(fields) => fields,
            Err(miss) => {
                let started = Instant::now();
                let result = self
                    .healer
                    .heal(SelectorHealingRequest {
                        source: request.source.clone(),
                        field: miss.field.clone(),
                        failed_selector: miss.selector.clone(),
                        snapshot: Arc::clone(&fetched.body),
                        spec: spec.clone(),
                    })
                    .await;

                if let Some(selector) = result
                    .accepted
                    .as_ref()
                    .map(|a| a.selector.clone())
                    .or_else(|| result.tried.last().cloned())
                {
                    let attempt = ExtractionAttempt::healing_validation(
                        fetched.strategy,
                        selector,
                        result.accepted.is_some(),
                        fetched.body.len(),
                        started.elapsed().as_millis() as u64,
                    )
                    .with_ordinal(attempts.len() as u32 + 1);
                    attempts.push(attempt);
                }

                let Some(accepted) = result.accepted else {
                    return fail(
                        FailureReason::SelectorExhausted,
                        format!("{miss}; {} candidate(s) tried", result.tried.len()),
                        attempts,
                    );
                };

                self.ctx
                    .override_selector(&request.source, &spec, &miss.field, &accepted.selector);
                warn!(
                    source = %request.source,
                    field = %miss.field,
                    old_selector = %miss.selector,
                    new_selector = %accepted.selector,
                    confidence = accepted.confidence,
                    "Healed selector accepted for this run; promote to source config"
                );
                healed = Some(HealedSelector {
                    source: request.source.clone(),
                    field: miss.field.clone(),
                    previous: miss.selector.clone(),
                    replacement: accepted.selector.clone(),
                    confidence: accepted.confidence,
                    target_key: request.target_key.clone(),
                });
                accepted.fields
            }
        };

        let meta = AttemptMetadata {
            source: request.source.clone(),
            target_key: request.target_key.clone(),
            attempt_count: attempts.len() as u32,
            strategy_used: fetched.strategy,
            content_hash: Provenance::hash_content(&fetched.body),
            date_range: request.date_range,
            allow_partial: request.options.allow_partial,
        };

        let record = match adapter.normalize(&fields, &meta) {
            Ok(record) => record,
            Err(e) => {
                let mut processed = fail(FailureReason::ValidationFailed, e.to_string(), attempts);
                processed.healed = healed;
                return processed;
            }
        };

        let counts = match self.sink.upsert(&record).await {
            Ok(counts) => counts,
            Err(e) => {
                warn!(source = %request.source, target_key = %request.target_key, error = %e, "Record sink rejected record");
                let mut processed = fail(FailureReason::StorageFailed, e.to_string(), attempts);
                processed.healed = healed;
                return processed;
            }
        };

        debug!(
            source = %request.source,
            target_key = %request.target_key,
            inserted = counts.inserted,
            updated = counts.updated,
            partial = record.is_partial(),
            "Record stored"
        );

        Processed {
            outcome: RequestOutcome {
                source: request.source.clone(),
                target_key: request.target_key.clone(),
                outcome: if record.is_partial() {
                    OutcomeKind::Partial
                } else {
                    OutcomeKind::Succeeded
                },
                reason: None,
                detail: record
                    .is_partial()
                    .then(|| format!("missing: {}", record.missing_fields.join(", "))),
                strategy_used: Some(fetched.strategy),
                inserted: counts.inserted,
                updated: counts.updated,
                attempts,
            },
            healed,
        }
    }

    /// Fetch until content passes the shape check or the budget runs out.
    async fn fetch(
        &self,
        request: &ScrapeRequest,
        adapter: &dyn SourceAdapter,
        target: &FetchTarget,
        domain: &str,
        gap: std::time::Duration,
        attempts: &mut Vec<ExtractionAttempt>,
    ) -> Result<Fetched, (FailureReason, String)> {
        let budget = self.config.fetch_budget();
        let mut slot = request
            .strategy_hint
            .unwrap_or_else(|| adapter.default_strategy());
        let mut retries = 0u32;

        loop {
            let Some(strategy) = self.strategies.get(slot) else {
                return Err((
                    FailureReason::StrategyUnavailable,
                    format!("no {slot} strategy configured"),
                ));
            };
            if !attempts.is_empty() {
                if self.ctx.cancel.is_cancelled() {
                    return Err(cancelled(attempts.len()));
                }
                tokio::select! {
                    _ = self.ctx.pacer.wait_turn(domain, gap) => {}
                    _ = self.ctx.cancel.cancelled() => return Err(cancelled(attempts.len())),
                }
            } else {
                self.ctx.pacer.wait_turn(domain, gap).await;
            }
            let attempt = strategy
                .fetch(target, &self.fetch_config)
                .await
                .with_ordinal(attempts.len() as u32 + 1);
            let kind = attempt.strategy_used;

            let result = match &attempt.outcome {
                AttemptOutcome::Content { body, .. } => Ok(Arc::<str>::from(body.as_str())),
                AttemptOutcome::Failed { reason, message, .. } => Err((
                    *reason,
                    message.clone(),
                    attempt.fetch_error().and_then(FetchError::retry_after),
                )),
            };
            attempts.push(attempt);

            match result {
                Ok(body) => {
                    if body.trim().len() >= self.config.min_content_len {
                        return Ok(Fetched {
                            body,
                            strategy: kind,
                        });
                    }

                    let next = if request.options.strict {
                        None
                    } else {
                        self.strategies.escalate_from(slot)
                    };
                    match next {
                        Some(next) if attempts.len() < budget => {
                            info!(
                                source = %request.source,
                                target_key = %request.target_key,
                                from = %slot,
                                to = %next,
                                content_length = body.len(),
                                "Content too short, escalating strategy"
                            );
                            slot = next;
                        }
                        _ => {
                            return Err((
                                FailureReason::EmptyContent,
                                format!(
                                    "{} bytes from {kind}, below minimum {}",
                                    body.trim().len(),
                                    self.config.min_content_len
                                ),
                            ));
                        }
                    }
                }
                Err((reason, message, retry_after)) => {
                    // A slot with no backend behind it is skipped, not retried
                    if reason == FailureReason::StrategyUnavailable && !request.options.strict {
                        if let Some(next) = self.strategies.escalate_from(slot) {
                            if attempts.len() < budget {
                                info!(
                                    source = %request.source,
                                    target_key = %request.target_key,
                                    from = %slot,
                                    to = %next,
                                    "Strategy unavailable, escalating"
                                );
                                slot = next;
                                continue;
                            }
                        }
                    }
                    if !reason.is_transient() || attempts.len() >= budget {
                        return Err((reason, message));
                    }

                    let wait = retry_after
                        .unwrap_or_default()
                        .max(self.config.backoff_delay(retries));
                    debug!(
                        source = %request.source,
                        target_key = %request.target_key,
                        reason = %reason,
                        retry = retries + 1,
                        wait_ms = wait.as_millis() as u64,
                        "Transient failure, backing off"
                    );
                    retries += 1;

                    tokio::select! {
                        _ = tokio::time::sleep(wait) => {}
                        _ = self.ctx.cancel.cancelled() => return Err(cancelled(attempts.len())),
                    }
                }
            }
        }
    }
}

fn cancelled(attempts: usize) -> (FailureReason, String) {
    (
        FailureReason::Cancelled,
        format!("run cancelled after {attempts} attempt(s)"),
    )
}
