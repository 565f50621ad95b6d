//! Crawl permission and pacing decisions.
//!
//! A [`ComplianceGate`] belongs to one batch run. Each domain's robots
//! document is fetched at most once per gate; concurrent requesters for the
//! same domain wait on the single in-flight fetch.

mod robots;
mod source;

pub use robots::RobotsRules;
pub use source::{HttpRobotsSource, RobotsFetch, RobotsSource, StaticRobotsSource};

use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, warn};

use crate::error::EngineError;

/// What to do when a domain's robots document cannot be retrieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompliancePolicy {
    #[default]
    FailOpen,
    FailClosed,
}

impl FromStr for CompliancePolicy {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail-open" | "open" => Ok(Self::FailOpen),
            "fail-closed" | "closed" => Ok(Self::FailClosed),
            other => Err(EngineError::InvalidConfig(format!(
                "unknown robots policy `{other}` (expected fail-open or fail-closed)"
            ))),
        }
    }
}

/// Permission and pacing outcome for one target.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceDecision {
    pub allowed: bool,
    pub crawl_delay_seconds: f64,
    pub disallowed_paths: BTreeSet<String>,
    pub reasons: Vec<String>,
}

impl ComplianceDecision {
    pub fn crawl_delay(&self) -> Duration {
        Duration::from_secs_f64(self.crawl_delay_seconds.max(0.0))
    }
}

/// Cached state of one domain's robots document.
#[derive(Debug)]
enum DomainRules {
    Rules(RobotsRules),
    Unreachable(String),
}

/// Per-run compliance evaluator with a write-once cache per domain.
pub struct ComplianceGate {
    source: Arc<dyn RobotsSource>,
    policy: CompliancePolicy,
    cache: Mutex<HashMap<String, Arc<OnceCell<Arc<DomainRules>>>>>,
}

impl ComplianceGate {
    pub fn new(source: Arc<dyn RobotsSource>, policy: CompliancePolicy) -> Self {
        Self {
            source,
            policy,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> CompliancePolicy {
        self.policy
    }

    /// Evaluate whether `path` on `domain` (an origin such as
    /// `https://www3.hkexnews.hk`) may be fetched by `user_agent`.
    pub async fn evaluate(&self, domain: &str, path: &str, user_agent: &str) -> ComplianceDecision {
        let rules = self.rules_for(domain).await;

        match rules.as_ref() {
            DomainRules::Rules(robots) => {
                let delay = robots
                    .crawl_delay(user_agent)
                    .map(|d| d.as_secs_f64())
                    .unwrap_or(0.0);
                let disallowed_paths = robots.disallowed_paths(user_agent);
                let mut reasons = Vec::new();

                let allowed = match robots.blocking_rule(user_agent, path) {
                    Some(rule) => {
                        reasons.push(format!("path {path} blocked by Disallow: {rule}"));
                        false
                    }
                    None => true,
                };
                if delay > 0.0 {
                    reasons.push(format!("crawl-delay {delay}s"));
                }

                ComplianceDecision {
                    allowed,
                    crawl_delay_seconds: delay,
                    disallowed_paths,
                    reasons,
                }
            }
            DomainRules::Unreachable(cause) => {
                let allowed = self.policy == CompliancePolicy::FailOpen;
                ComplianceDecision {
                    allowed,
                    crawl_delay_seconds: 0.0,
                    disallowed_paths: BTreeSet::new(),
                    reasons: vec![format!(
                        "robots document unreachable ({cause}); {} policy applied",
                        match self.policy {
                            CompliancePolicy::FailOpen => "fail-open",
                            CompliancePolicy::FailClosed => "fail-closed",
                        }
                    )],
                }
            }
        }
    }

    /// Number of domains whose rules have been resolved in this run.
    pub async fn cached_domains(&self) -> usize {
        let cache = self.cache.lock().await;
        cache.values().filter(|cell| cell.initialized()).count()
    }

    async fn rules_for(&self, domain: &str) -> Arc<DomainRules> {
        let cell = {
            let mut cache = self.cache.lock().await;
            Arc::clone(cache.entry(domain.to_string()).or_default())
        };

        let rules = cell
            .get_or_init(|| async {
                let fetched = match self.source.fetch(domain).await {
                    RobotsFetch::Document(body) => {
                        debug!(domain = %domain, source = self.source.name(), "Parsed robots document");
                        DomainRules::Rules(RobotsRules::parse(&body))
                    }
                    RobotsFetch::NoRules => {
                        debug!(domain = %domain, "No robots document, allowing all paths");
                        DomainRules::Rules(RobotsRules::default())
                    }
                    RobotsFetch::Unreachable(cause) => {
                        warn!(
                            domain = %domain,
                            cause = %cause,
                            policy = ?self.policy,
                            "Robots document unreachable, applying compliance policy"
                        );
                        DomainRules::Unreachable(cause)
                    }
                };
                Arc::new(fetched)
            })
            .await;

        Arc::clone(rules)
    }
}
