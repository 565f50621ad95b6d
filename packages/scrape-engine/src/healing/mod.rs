//! Selector healing.
//!
//! When an extraction rule stops matching, a [`SuggestionGenerator`] proposes
//! replacement selectors from the page snapshot and the field's intent. The
//! [`SelectorHealer`] validates the top suggestion, then its fallbacks, by
//! re-running extraction against the same snapshot. Only a selector that
//! re-extracts every required value in its declared shape is accepted.

mod heuristic;

pub use heuristic::HeuristicSuggestionGenerator;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use crate::extract::{ExtractionSpec, Extractor, RawFields};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Reliability {
    High,
    Medium,
    Low,
}

impl Reliability {
    pub fn from_confidence(confidence: u8) -> Self {
        match confidence {
            80..=u8::MAX => Self::High,
            50..=79 => Self::Medium,
            _ => Self::Low,
        }
    }
}

/// A proposed replacement selector.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealingSuggestion {
    pub candidate_selector: String,
    /// 0 to 100
    pub confidence_score: u8,
    pub reliability: Reliability,
    pub fallback_selectors: Vec<String>,
}

impl HealingSuggestion {
    pub fn new(candidate: impl Into<String>, confidence: u8) -> Self {
        let confidence = confidence.min(100);
        Self {
            candidate_selector: candidate.into(),
            confidence_score: confidence,
            reliability: Reliability::from_confidence(confidence),
            fallback_selectors: Vec::new(),
        }
    }

    pub fn with_fallbacks(mut self, fallbacks: Vec<String>) -> Self {
        self.fallback_selectors = fallbacks;
        self
    }
}

/// What broke and where.
#[derive(Debug, Clone)]
pub struct SelectorHealingRequest {
    pub source: String,
    /// Field key as reported by the extractor
    pub field: String,
    pub failed_selector: String,
    /// Content the selector failed on
    pub snapshot: Arc<str>,
    /// Extraction spec in effect when the selector failed
    pub spec: ExtractionSpec,
}

impl SelectorHealingRequest {
    /// Visible label hint configured for the field.
    pub fn label(&self) -> Option<String> {
        self.spec.rule(&self.field).and_then(|r| r.label)
    }
}

/// Selector that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptedSelector {
    pub selector: String,
    pub confidence: u8,
    pub fields: RawFields,
}

#[derive(Debug, Clone, Default)]
pub struct HealingResult {
    /// Ranked, best first
    pub suggestions: Vec<HealingSuggestion>,
    /// Selectors re-run against the snapshot, in order
    pub tried: Vec<String>,
    pub accepted: Option<AcceptedSelector>,
}

/// Proposes replacement selectors.
#[async_trait]
pub trait SuggestionGenerator: Send + Sync {
    async fn suggest(&self, request: &SelectorHealingRequest) -> Vec<HealingSuggestion>;

    fn name(&self) -> &str;
}

/// Generates and validates selector replacements.
#[derive(Clone)]
pub struct SelectorHealer {
    generator: Arc<dyn SuggestionGenerator>,
    extractor: Arc<dyn Extractor>,
}

impl SelectorHealer {
    pub fn new(generator: Arc<dyn SuggestionGenerator>, extractor: Arc<dyn Extractor>) -> Self {
        Self {
            generator,
            extractor,
        }
    }

    pub async fn heal(&self, request: SelectorHealingRequest) -> HealingResult {
        let mut suggestions = self.generator.suggest(&request).await;
        suggestions.sort_by(|a, b| b.confidence_score.cmp(&a.confidence_score));

        debug!(
            source = %request.source,
            field = %request.field,
            generator = self.generator.name(),
            suggestions = suggestions.len(),
            "Healing suggestions generated"
        );

        let Some(top) = suggestions.first() else {
            return HealingResult {
                suggestions,
                ..HealingResult::default()
            };
        };

        let mut candidates: Vec<String> = Vec::new();
        for selector in std::iter::once(&top.candidate_selector).chain(&top.fallback_selectors) {
            if *selector != request.failed_selector && !candidates.contains(selector) {
                candidates.push(selector.clone());
            }
        }

        let mut tried = Vec::new();
        let mut accepted = None;
        for candidate in candidates {
            tried.push(candidate.clone());
            let spec = request.spec.with_selector(&request.field, &candidate);
            match self.extractor.extract(&request.snapshot, &spec) {
                Ok(fields) if fields.conforms_to(&spec) => {
                    info!(
                        source = %request.source,
                        field = %request.field,
                        selector = %candidate,
                        "Healing candidate validated"
                    );
                    accepted = Some(AcceptedSelector {
                        selector: candidate,
                        confidence: top.confidence_score,
                        fields,
                    });
                    break;
                }
                Ok(_) => debug!(selector = %candidate, "Candidate extracted values of the wrong shape"),
                Err(miss) => debug!(selector = %candidate, miss = %miss, "Candidate did not re-extract"),
            }
        }

        HealingResult {
            suggestions,
            tried,
            accepted,
        }
    }
}
