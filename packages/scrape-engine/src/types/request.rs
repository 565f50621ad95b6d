//! Scrape requests and strategy identifiers.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Closed set of extraction strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    HttpFetch,
    HeadlessRender,
    RenderingApi,
    /// Deterministic fixture strategy used by test mode
    Mock,
}

impl StrategyKind {
    /// Escalation ladder, cheapest first.
    pub const LADDER: [StrategyKind; 3] = [
        StrategyKind::HttpFetch,
        StrategyKind::HeadlessRender,
        StrategyKind::RenderingApi,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HttpFetch => "http-fetch",
            Self::HeadlessRender => "headless-render",
            Self::RenderingApi => "rendering-api",
            Self::Mock => "mock",
        }
    }

    /// Next more capable strategy, if any.
    pub fn escalate(&self) -> Option<StrategyKind> {
        match self {
            Self::HttpFetch => Some(Self::HeadlessRender),
            Self::HeadlessRender => Some(Self::RenderingApi),
            Self::RenderingApi | Self::Mock => None,
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "http-fetch" | "http" => Ok(Self::HttpFetch),
            "headless-render" | "headless" => Ok(Self::HeadlessRender),
            "rendering-api" => Ok(Self::RenderingApi),
            "mock" => Ok(Self::Mock),
            _ => Err(EngineError::UnknownStrategy(s.to_string())),
        }
    }
}

/// Inclusive date window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, EngineError> {
        if start > end {
            return Err(EngineError::InvalidConfig(format!(
                "date range start {start} is after end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

/// Per-request switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestOptions {
    /// Never escalate past the starting strategy
    #[serde(default)]
    pub strict: bool,

    /// Accept records with missing required fields, listing them
    #[serde(default)]
    pub allow_partial: bool,
}

/// One unit of scrape work. Immutable once submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeRequest {
    pub source: String,
    pub target_key: String,
    pub date_range: Option<DateRange>,
    pub strategy_hint: Option<StrategyKind>,
    #[serde(default)]
    pub options: RequestOptions,
}

impl ScrapeRequest {
    pub fn new(source: impl Into<String>, target_key: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target_key: target_key.into(),
            date_range: None,
            strategy_hint: None,
            options: RequestOptions::default(),
        }
    }

    pub fn with_date_range(mut self, range: DateRange) -> Self {
        self.date_range = Some(range);
        self
    }

    pub fn with_strategy_hint(mut self, strategy: StrategyKind) -> Self {
        self.strategy_hint = Some(strategy);
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.options.strict = strict;
        self
    }

    pub fn with_allow_partial(mut self, allow: bool) -> Self {
        self.options.allow_partial = allow;
        self
    }
}
