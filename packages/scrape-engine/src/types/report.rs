//! Batch report types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::attempt::ExtractionAttempt;
use super::request::StrategyKind;
use crate::error::FailureReason;

/// Terminal state of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutcomeKind {
    Succeeded,
    /// Record stored with missing fields or skipped rows
    Partial,
    Failed,
}

/// Per-request entry in the report.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestOutcome {
    pub source: String,
    pub target_key: String,
    pub outcome: OutcomeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<FailureReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy_used: Option<StrategyKind>,
    pub inserted: usize,
    pub updated: usize,
    pub attempts: Vec<ExtractionAttempt>,
}

impl RequestOutcome {
    pub fn failed(
        source: impl Into<String>,
        target_key: impl Into<String>,
        reason: FailureReason,
        detail: impl Into<String>,
        attempts: Vec<ExtractionAttempt>,
    ) -> Self {
        Self {
            source: source.into(),
            target_key: target_key.into(),
            outcome: OutcomeKind::Failed,
            reason: Some(reason),
            detail: Some(detail.into()),
            strategy_used: attempts.last().map(|a| a.strategy_used),
            inserted: 0,
            updated: 0,
            attempts,
        }
    }

    /// Fetch attempts only; healing validation is not counted.
    pub fn fetch_attempts(&self) -> usize {
        self.attempts
            .iter()
            .filter(|a| a.purpose == super::attempt::AttemptPurpose::Fetch)
            .count()
    }
}

/// A selector accepted by healing during the run, listed for promotion.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealedSelector {
    pub source: String,
    pub field: String,
    pub previous: String,
    pub replacement: String,
    pub confidence: u8,
    /// Request whose healing produced the selector
    pub target_key: String,
}

/// The engine's only output.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub records_inserted: usize,
    pub records_updated: usize,
    pub records_failed: usize,
    /// Completion order
    pub outcomes: Vec<RequestOutcome>,
    pub healed_selectors: Vec<HealedSelector>,
}

impl BatchReport {
    pub fn outcome_for(&self, target_key: &str) -> Option<&RequestOutcome> {
        self.outcomes.iter().find(|o| o.target_key == target_key)
    }

    pub fn has_reason(&self, reason: FailureReason) -> bool {
        self.outcomes.iter().any(|o| o.reason == Some(reason))
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.outcome != OutcomeKind::Failed)
            .count()
    }
}
