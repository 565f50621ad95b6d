//! Hosted rendering service.
//!
//! Posts `{url, formats: ["html"]}` to `{base}/v1/scrape` with a bearer key and
//! reads `data.html` from the reply. Calls are self-limited with a client-side
//! quota; 429 replies surface as `rate-limited` with the server's
//! `Retry-After`.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Instant;

use governor::{Quota, RateLimiter};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{retry_after, FetchConfig, FetchTarget};
use crate::error::{EngineError, FetchError};
use crate::types::{ExtractionAttempt, StrategyKind};

type DirectRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

pub const DEFAULT_RENDERING_API_URL: &str = "https://api.firecrawl.dev";

/// Connection settings for the rendering service.
#[derive(Debug, Clone)]
pub struct RenderingApiConfig {
    pub base_url: String,
    pub api_key: SecretString,
    /// Client-side call quota
    pub requests_per_second: u32,
}

impl RenderingApiConfig {
    pub fn new(api_key: SecretString) -> Self {
        Self {
            base_url: DEFAULT_RENDERING_API_URL.to_string(),
            api_key,
            requests_per_second: 2,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_requests_per_second(mut self, rps: u32) -> Self {
        self.requests_per_second = rps;
        self
    }
}

#[derive(Serialize)]
struct RenderRequest<'a> {
    url: &'a str,
    formats: [&'static str; 1],
    timeout: u64,
}

#[derive(Deserialize)]
struct RenderResponse {
    success: bool,
    data: Option<RenderData>,
    error: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RenderData {
    html: Option<String>,
    raw_html: Option<String>,
    metadata: Option<RenderMetadata>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RenderMetadata {
    status_code: Option<u16>,
}

pub struct RenderingApiStrategy {
    client: Client,
    config: RenderingApiConfig,
    limiter: Arc<DirectRateLimiter>,
}

impl RenderingApiStrategy {
    pub fn new(config: RenderingApiConfig) -> Result<Self, EngineError> {
        let rps = NonZeroU32::new(config.requests_per_second).ok_or_else(|| {
            EngineError::InvalidConfig("rendering API requests per second must be > 0".to_string())
        })?;
        let client = Client::builder().build().map_err(EngineError::HttpClient)?;

        Ok(Self {
            client,
            config,
            limiter: Arc::new(RateLimiter::direct(Quota::per_second(rps))),
        })
    }

    pub(crate) async fn fetch(&self, target: &FetchTarget, config: &FetchConfig) -> ExtractionAttempt {
        self.limiter.until_ready().await;

        let started = Instant::now();
        let elapsed_ms = || started.elapsed().as_millis() as u64;
        let endpoint = format!("{}/v1/scrape", self.config.base_url.trim_end_matches('/'));
        debug!(url = %target.url, endpoint = %endpoint, "Requesting rendered page");

        let body = RenderRequest {
            url: target.url.as_str(),
            formats: ["html"],
            timeout: config.render_timeout.as_millis() as u64,
        };

        let response = match self
            .client
            .post(&endpoint)
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&body)
            // Leave headroom over the render budget for the API round trip
            .timeout(config.render_timeout + config.fetch_timeout)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                let elapsed = elapsed_ms();
                let error = if e.is_timeout() {
                    FetchError::RenderTimeout {
                        timeout_ms: config.render_timeout.as_millis() as u64,
                    }
                } else {
                    FetchError::from_reqwest(&e, elapsed)
                };
                warn!(url = %target.url, error = %error, "Rendering API request failed");
                return ExtractionAttempt::failed(StrategyKind::RenderingApi, error, elapsed);
            }
        };

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let error = match status {
                // Provider-side render timeout
                408 => FetchError::RenderTimeout {
                    timeout_ms: config.render_timeout.as_millis() as u64,
                },
                _ => FetchError::from_status(status, retry_after(response.headers())),
            };
            warn!(url = %target.url, status, "Rendering API rejected request");
            return ExtractionAttempt::failed(StrategyKind::RenderingApi, error, elapsed_ms());
        }

        let parsed: RenderResponse = match response.json().await {
            Ok(p) => p,
            Err(e) => {
                return ExtractionAttempt::failed(
                    StrategyKind::RenderingApi,
                    FetchError::Network(format!("invalid rendering API reply: {e}")),
                    elapsed_ms(),
                )
            }
        };

        if !parsed.success {
            let message = parsed.error.unwrap_or_else(|| "unknown error".to_string());
            return ExtractionAttempt::failed(
                StrategyKind::RenderingApi,
                FetchError::Network(format!("rendering API reported failure: {message}")),
                elapsed_ms(),
            );
        }

        let data = parsed.data;
        let page_status = data
            .as_ref()
            .and_then(|d| d.metadata.as_ref())
            .and_then(|m| m.status_code);
        let html = data
            .and_then(|d| d.html.or(d.raw_html))
            .unwrap_or_default();

        if let Some(code) = page_status.filter(|c| !(200..300).contains(c)) {
            return ExtractionAttempt::failed(
                StrategyKind::RenderingApi,
                FetchError::from_status(code, None),
                elapsed_ms(),
            )
            .with_http_status(code);
        }

        let attempt = ExtractionAttempt::content(StrategyKind::RenderingApi, html, elapsed_ms());
        match page_status {
            Some(code) => attempt.with_http_status(code),
            None => attempt,
        }
    }
}
