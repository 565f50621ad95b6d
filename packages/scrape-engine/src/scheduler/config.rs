//! Batch scheduler configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::compliance::CompliancePolicy;
use crate::error::EngineError;
use crate::strategies::FetchConfig;

/// User agent sent with every fetch and matched against robots groups.
pub const DEFAULT_USER_AGENT: &str = "ScrapeEngine/0.1 (+structured-ingestion; polite)";

/// Limits and pacing for one batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Maximum request pipelines in flight.
    ///
    /// Default: 4.
    pub concurrency: usize,

    /// Minimum gap between requests to the same domain.
    ///
    /// The effective gap is the larger of this and the domain's crawl-delay.
    /// Default: 1000.
    pub inter_request_delay_ms: u64,

    /// Retries after the first fetch, shared between transient retries and
    /// strategy escalation.
    ///
    /// Default: 2.
    pub max_retries_per_request: u32,

    /// First backoff delay; doubled per retry. Default: 500.
    pub backoff_base_ms: u64,

    /// Backoff ceiling. Default: 30000.
    pub backoff_max_ms: u64,

    /// Content shorter than this (after trimming) is a content-shape failure.
    ///
    /// Default: 256.
    pub min_content_len: usize,

    pub user_agent: String,

    /// What to do when a robots document cannot be fetched.
    pub compliance_policy: CompliancePolicy,

    /// Default: 30000.
    pub fetch_timeout_ms: u64,

    /// Default: 60000.
    pub render_timeout_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            inter_request_delay_ms: 1000,
            max_retries_per_request: 2,
            backoff_base_ms: 500,
            backoff_max_ms: 30_000,
            min_content_len: 256,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            compliance_policy: CompliancePolicy::default(),
            fetch_timeout_ms: 30_000,
            render_timeout_ms: 60_000,
        }
    }
}

impl SchedulerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_inter_request_delay_ms(mut self, delay_ms: u64) -> Self {
        self.inter_request_delay_ms = delay_ms;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries_per_request = retries;
        self
    }

    pub fn with_backoff(mut self, base_ms: u64, max_ms: u64) -> Self {
        self.backoff_base_ms = base_ms;
        self.backoff_max_ms = max_ms;
        self
    }

    pub fn with_min_content_len(mut self, len: usize) -> Self {
        self.min_content_len = len;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_compliance_policy(mut self, policy: CompliancePolicy) -> Self {
        self.compliance_policy = policy;
        self
    }

    pub fn with_fetch_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.fetch_timeout_ms = timeout_ms;
        self
    }

    pub fn with_render_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.render_timeout_ms = timeout_ms;
        self
    }

    /// Reject settings no run can honour.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.concurrency == 0 {
            return Err(EngineError::InvalidConfig(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if self.user_agent.trim().is_empty() {
            return Err(EngineError::InvalidConfig(
                "user agent must not be empty".to_string(),
            ));
        }
        if self.backoff_base_ms > self.backoff_max_ms {
            return Err(EngineError::InvalidConfig(format!(
                "backoff base {}ms exceeds ceiling {}ms",
                self.backoff_base_ms, self.backoff_max_ms
            )));
        }
        if self.fetch_timeout_ms == 0 || self.render_timeout_ms == 0 {
            return Err(EngineError::InvalidConfig(
                "timeouts must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn inter_request_delay(&self) -> Duration {
        Duration::from_millis(self.inter_request_delay_ms)
    }

    /// Fetch attempts allowed per request, healing validation excluded.
    pub fn fetch_budget(&self) -> usize {
        self.max_retries_per_request as usize + 1
    }

    /// Exponential backoff before retry number `retry` (0-based).
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let factor = 1u64.checked_shl(retry).unwrap_or(u64::MAX);
        Duration::from_millis(
            self.backoff_base_ms
                .saturating_mul(factor)
                .min(self.backoff_max_ms),
        )
    }

    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            user_agent: self.user_agent.clone(),
            fetch_timeout: Duration::from_millis(self.fetch_timeout_ms),
            render_timeout: Duration::from_millis(self.render_timeout_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_until_ceiling() {
        let config = SchedulerConfig::new().with_backoff(100, 1_000);
        assert_eq!(config.backoff_delay(0), Duration::from_millis(100));
        assert_eq!(config.backoff_delay(1), Duration::from_millis(200));
        assert_eq!(config.backoff_delay(3), Duration::from_millis(800));
        assert_eq!(config.backoff_delay(4), Duration::from_millis(1_000));
        assert_eq!(config.backoff_delay(70), Duration::from_millis(1_000));
    }

    #[test]
    fn test_validation() {
        assert!(SchedulerConfig::default().validate().is_ok());
        assert!(SchedulerConfig::new().with_concurrency(0).validate().is_err());
        assert!(SchedulerConfig::new().with_user_agent(" ").validate().is_err());
        assert!(SchedulerConfig::new().with_backoff(10, 5).validate().is_err());
    }

    #[test]
    fn test_fetch_budget() {
        assert_eq!(SchedulerConfig::new().with_max_retries(0).fetch_budget(), 1);
        assert_eq!(SchedulerConfig::new().with_max_retries(3).fetch_budget(), 4);
    }
}
