//! Direct HTTP fetch, the cheapest strategy.

use std::time::Instant;

use reqwest::header::{ACCEPT, USER_AGENT};
use tracing::{debug, warn};

use super::{retry_after, FetchConfig, FetchTarget};
use crate::error::{EngineError, FetchError};
use crate::types::{ExtractionAttempt, StrategyKind};

/// Plain GET of the target URL.
pub struct HttpFetchStrategy {
    client: reqwest::Client,
}

impl HttpFetchStrategy {
    pub fn new() -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(EngineError::HttpClient)?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub(crate) async fn fetch(&self, target: &FetchTarget, config: &FetchConfig) -> ExtractionAttempt {
        let started = Instant::now();
        let elapsed_ms = || started.elapsed().as_millis() as u64;
        debug!(url = %target.url, "HTTP fetch starting");

        let response = match self
            .client
            .get(target.url.clone())
            .header(USER_AGENT, &config.user_agent)
            .header(ACCEPT, "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8")
            .timeout(config.fetch_timeout)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!(url = %target.url, error = %e, "HTTP request failed");
                let elapsed = elapsed_ms();
                return ExtractionAttempt::failed(
                    StrategyKind::HttpFetch,
                    FetchError::from_reqwest(&e, elapsed),
                    elapsed,
                );
            }
        };

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let error = FetchError::from_status(status, retry_after(response.headers()));
            debug!(url = %target.url, status, "HTTP fetch returned non-success status");
            return ExtractionAttempt::failed(StrategyKind::HttpFetch, error, elapsed_ms())
                .with_http_status(status);
        }

        match response.text().await {
            Ok(body) => {
                debug!(url = %target.url, status, bytes = body.len(), "HTTP fetch complete");
                ExtractionAttempt::content(StrategyKind::HttpFetch, body, elapsed_ms())
                    .with_http_status(status)
            }
            Err(e) => {
                let elapsed = elapsed_ms();
                ExtractionAttempt::failed(
                    StrategyKind::HttpFetch,
                    FetchError::from_reqwest(&e, elapsed),
                    elapsed,
                )
                .with_http_status(status)
            }
        }
    }
}
