use std::env;

use anyhow::{Context, Result};
use dotenvy::dotenv;
use scrape_engine::{CompliancePolicy, RenderingApiConfig, SchedulerConfig};
use secrecy::SecretString;

/// Server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub scheduler: SchedulerConfig,
    /// Present only when `RENDERING_API_KEY` is set
    pub rendering_api: Option<RenderingApiConfig>,
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; unset keys fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut scheduler = SchedulerConfig::new();

        if let Some(v) = lookup("SCRAPE_CONCURRENCY") {
            scheduler = scheduler.with_concurrency(
                v.parse().context("SCRAPE_CONCURRENCY must be a positive number")?,
            );
        }
        if let Some(v) = lookup("SCRAPE_INTER_REQUEST_DELAY_MS") {
            scheduler = scheduler.with_inter_request_delay_ms(
                v.parse()
                    .context("SCRAPE_INTER_REQUEST_DELAY_MS must be a number of milliseconds")?,
            );
        }
        if let Some(v) = lookup("SCRAPE_MAX_RETRIES") {
            scheduler =
                scheduler.with_max_retries(v.parse().context("SCRAPE_MAX_RETRIES must be a number")?);
        }
        if let Some(v) = lookup("SCRAPE_USER_AGENT") {
            scheduler = scheduler.with_user_agent(v);
        }
        if let Some(v) = lookup("SCRAPE_ROBOTS_POLICY") {
            let policy: CompliancePolicy = v.parse().context("SCRAPE_ROBOTS_POLICY is invalid")?;
            scheduler = scheduler.with_compliance_policy(policy);
        }
        scheduler.validate().context("Invalid scrape configuration")?;

        let rendering_api = match lookup("RENDERING_API_KEY").filter(|k| !k.trim().is_empty()) {
            Some(key) => {
                let mut api = RenderingApiConfig::new(SecretString::from(key));
                if let Some(url) = lookup("RENDERING_API_URL") {
                    api = api.with_base_url(url);
                }
                if let Some(rps) = lookup("RENDERING_API_RPS") {
                    api = api.with_requests_per_second(
                        rps.parse().context("RENDERING_API_RPS must be a number")?,
                    );
                }
                Some(api)
            }
            None => None,
        };

        Ok(Self {
            port: lookup("PORT")
                .unwrap_or_else(|| "8080".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            scheduler,
            rendering_api,
        })
    }
}
