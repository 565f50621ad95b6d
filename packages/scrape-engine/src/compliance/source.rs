//! Robots document sources.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::EngineError;

/// Result of retrieving a domain's robots document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RobotsFetch {
    /// Document body
    Document(String),
    /// The domain has no robots document (4xx); everything is allowed
    NoRules,
    /// Server error or transport failure
    Unreachable(String),
}

/// Capability that retrieves robots documents.
#[async_trait]
pub trait RobotsSource: Send + Sync {
    /// Fetch the robots document for an origin like `https://example.com`.
    async fn fetch(&self, domain: &str) -> RobotsFetch;

    fn name(&self) -> &str;
}

/// Fetches `{origin}/robots.txt` over HTTP.
pub struct HttpRobotsSource {
    client: reqwest::Client,
}

impl HttpRobotsSource {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(EngineError::HttpClient)?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RobotsSource for HttpRobotsSource {
    async fn fetch(&self, domain: &str) -> RobotsFetch {
        let url = format!("{}/robots.txt", domain.trim_end_matches('/'));
        debug!(url = %url, "Fetching robots document");

        let response = match self.client.get(&url).send().await {
            Ok(r) => r,
            Err(e) => return RobotsFetch::Unreachable(e.to_string()),
        };

        let status = response.status();
        if status.is_success() {
            match response.text().await {
                Ok(body) => RobotsFetch::Document(body),
                Err(e) => RobotsFetch::Unreachable(e.to_string()),
            }
        } else if status.is_client_error() {
            RobotsFetch::NoRules
        } else {
            RobotsFetch::Unreachable(format!("HTTP {}", status.as_u16()))
        }
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// In-memory robots documents, with per-domain fetch counting.
///
/// Domains without an entry get the fallback document; [`StaticRobotsSource::allow_all`]
/// is the compliance source used in test mode.
#[derive(Clone, Default)]
pub struct StaticRobotsSource {
    documents: Arc<RwLock<HashMap<String, RobotsFetch>>>,
    fallback: Option<String>,
    fetches: Arc<RwLock<HashMap<String, usize>>>,
}

impl StaticRobotsSource {
    /// Source with no documents; unknown domains have no rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// Source that serves an allow-everything document for every domain.
    pub fn allow_all() -> Self {
        Self {
            fallback: Some("User-agent: *\nAllow: /\n".to_string()),
            ..Self::default()
        }
    }

    pub fn with_document(self, domain: &str, content: &str) -> Self {
        self.documents.write().unwrap().insert(
            domain.trim_end_matches('/').to_string(),
            RobotsFetch::Document(content.to_string()),
        );
        self
    }

    pub fn with_unreachable(self, domain: &str) -> Self {
        self.documents.write().unwrap().insert(
            domain.trim_end_matches('/').to_string(),
            RobotsFetch::Unreachable("static source marked unreachable".to_string()),
        );
        self
    }

    pub fn fetch_count(&self, domain: &str) -> usize {
        self.fetches
            .read()
            .unwrap()
            .get(domain.trim_end_matches('/'))
            .copied()
            .unwrap_or(0)
    }

    pub fn total_fetches(&self) -> usize {
        self.fetches.read().unwrap().values().sum()
    }
}

#[async_trait]
impl RobotsSource for StaticRobotsSource {
    async fn fetch(&self, domain: &str) -> RobotsFetch {
        let key = domain.trim_end_matches('/');
        *self
            .fetches
            .write()
            .unwrap()
            .entry(key.to_string())
            .or_insert(0) += 1;

        if let Some(found) = self.documents.read().unwrap().get(key) {
            return found.clone();
        }
        match &self.fallback {
            Some(content) => RobotsFetch::Document(content.clone()),
            None => RobotsFetch::NoRules,
        }
    }

    fn name(&self) -> &str {
        "static"
    }
}
