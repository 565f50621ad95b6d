//! Accumulates per-request outcomes into a [`BatchReport`].

use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::types::{BatchReport, HealedSelector, OutcomeKind, RequestOutcome};

pub struct ResultAggregator {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    outcomes: Vec<RequestOutcome>,
    healed: Vec<HealedSelector>,
}

impl ResultAggregator {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            started_at: Utc::now(),
            outcomes: Vec::new(),
            healed: Vec::new(),
        }
    }

    /// Record a terminal outcome. Outcomes are kept in arrival order.
    pub fn record(&mut self, outcome: RequestOutcome) {
        self.outcomes.push(outcome);
    }

    /// Record a selector accepted by healing. Repeats of the same
    /// source/field/replacement are listed once.
    pub fn record_healed(&mut self, healed: HealedSelector) {
        let seen = self.healed.iter().any(|h| {
            h.source == healed.source && h.field == healed.field && h.replacement == healed.replacement
        });
        if !seen {
            self.healed.push(healed);
        }
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn finish(self) -> BatchReport {
        let records_inserted = self.outcomes.iter().map(|o| o.inserted).sum();
        let records_updated = self.outcomes.iter().map(|o| o.updated).sum();
        let records_failed = self
            .outcomes
            .iter()
            .filter(|o| o.outcome == OutcomeKind::Failed)
            .count();

        let report = BatchReport {
            run_id: self.run_id,
            started_at: self.started_at,
            finished_at: Utc::now(),
            records_inserted,
            records_updated,
            records_failed,
            outcomes: self.outcomes,
            healed_selectors: self.healed,
        };

        info!(
            run_id = %report.run_id,
            requests = report.outcomes.len(),
            inserted = report.records_inserted,
            updated = report.records_updated,
            failed = report.records_failed,
            healed = report.healed_selectors.len(),
            "Batch run complete"
        );

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureReason;

    fn succeeded(key: &str, inserted: usize, updated: usize) -> RequestOutcome {
        RequestOutcome {
            source: "ccass".to_string(),
            target_key: key.to_string(),
            outcome: OutcomeKind::Succeeded,
            reason: None,
            detail: None,
            strategy_used: None,
            inserted,
            updated,
            attempts: Vec::new(),
        }
    }

    #[test]
    fn test_counts_sum_across_outcomes() {
        let mut aggregator = ResultAggregator::new(Uuid::now_v7());
        aggregator.record(succeeded("00700", 4, 0));
        aggregator.record(RequestOutcome::failed(
            "ccass",
            "00005",
            FailureReason::ComplianceDisallowed,
            "blocked",
            Vec::new(),
        ));
        aggregator.record(succeeded("00001", 1, 3));

        let report = aggregator.finish();
        assert_eq!(report.records_inserted, 5);
        assert_eq!(report.records_updated, 3);
        assert_eq!(report.records_failed, 1);
        assert_eq!(
            report.outcomes.iter().map(|o| o.target_key.as_str()).collect::<Vec<_>>(),
            vec!["00700", "00005", "00001"]
        );
        assert!(report.finished_at >= report.started_at);
    }

    #[test]
    fn test_healed_selectors_deduplicated() {
        let mut aggregator = ResultAggregator::new(Uuid::now_v7());
        let healed = HealedSelector {
            source: "ccass".to_string(),
            field: "stock_code".to_string(),
            previous: "#txtStockCode".to_string(),
            replacement: "#stockCodeInput".to_string(),
            confidence: 90,
            target_key: "00700".to_string(),
        };
        aggregator.record_healed(healed.clone());
        aggregator.record_healed(HealedSelector {
            target_key: "00005".to_string(),
            ..healed
        });

        assert_eq!(aggregator.finish().healed_selectors.len(), 1);
    }
}
