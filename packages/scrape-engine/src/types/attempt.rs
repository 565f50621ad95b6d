//! Extraction attempt log entries.

use serde::Serialize;

use super::request::StrategyKind;
use crate::error::{FailureReason, FetchError};

/// Why an attempt was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AttemptPurpose {
    Fetch,
    HealingValidation,
}

/// Raw content or error for one attempt.
///
/// The content body is kept in memory for extraction but never serialized
/// into reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum AttemptOutcome {
    #[serde(rename_all = "camelCase")]
    Content {
        #[serde(skip)]
        body: String,
        content_length: usize,
    },
    #[serde(rename_all = "camelCase")]
    Failed {
        reason: FailureReason,
        message: String,
        #[serde(skip)]
        error: Option<FetchError>,
    },
}

/// One try at retrieving or validating content.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionAttempt {
    /// 1-based position within the request
    pub ordinal: u32,
    pub strategy_used: StrategyKind,
    pub purpose: AttemptPurpose,
    pub outcome: AttemptOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector_used: Option<String>,
}

impl ExtractionAttempt {
    /// Successful fetch.
    pub fn content(strategy: StrategyKind, body: impl Into<String>, duration_ms: u64) -> Self {
        let body = body.into();
        Self {
            ordinal: 0,
            strategy_used: strategy,
            purpose: AttemptPurpose::Fetch,
            outcome: AttemptOutcome::Content {
                content_length: body.len(),
                body,
            },
            http_status: None,
            duration_ms,
            selector_used: None,
        }
    }

    /// Failed fetch.
    pub fn failed(strategy: StrategyKind, error: FetchError, duration_ms: u64) -> Self {
        let http_status = match &error {
            FetchError::HttpStatus { status } => Some(*status),
            FetchError::RateLimited { .. } => Some(429),
            _ => None,
        };
        Self {
            ordinal: 0,
            strategy_used: strategy,
            purpose: AttemptPurpose::Fetch,
            outcome: AttemptOutcome::Failed {
                reason: error.reason(),
                message: error.to_string(),
                error: Some(error),
            },
            http_status,
            duration_ms,
            selector_used: None,
        }
    }

    /// Re-extraction of a stored snapshot with a candidate selector.
    pub fn healing_validation(
        strategy: StrategyKind,
        selector: impl Into<String>,
        validated: bool,
        content_length: usize,
        duration_ms: u64,
    ) -> Self {
        let selector = selector.into();
        let outcome = if validated {
            AttemptOutcome::Content {
                body: String::new(),
                content_length,
            }
        } else {
            AttemptOutcome::Failed {
                reason: FailureReason::SelectorExhausted,
                message: format!("no candidate selector validated (last tried `{selector}`)"),
                error: None,
            }
        };
        Self {
            ordinal: 0,
            strategy_used: strategy,
            purpose: AttemptPurpose::HealingValidation,
            outcome,
            http_status: None,
            duration_ms,
            selector_used: Some(selector),
        }
    }

    pub fn with_http_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    pub fn with_ordinal(mut self, ordinal: u32) -> Self {
        self.ordinal = ordinal;
        self
    }

    /// Fetched body, for successful fetch attempts.
    pub fn body(&self) -> Option<&str> {
        match &self.outcome {
            AttemptOutcome::Content { body, .. } => Some(body),
            AttemptOutcome::Failed { .. } => None,
        }
    }

    pub fn fetch_error(&self) -> Option<&FetchError> {
        match &self.outcome {
            AttemptOutcome::Failed { error, .. } => error.as_ref(),
            AttemptOutcome::Content { .. } => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, AttemptOutcome::Content { .. })
    }
}
