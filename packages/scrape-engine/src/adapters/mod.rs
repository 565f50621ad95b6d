//! Source adapters.
//!
//! One adapter per target domain. An adapter knows how to address a target
//! key, which selectors locate its fields, and how to turn raw field text into
//! a typed [`NormalizedRecord`]. Each adapter also renders a deterministic
//! fixture page per target key for test mode.

mod ccass;
mod disclosure;
mod filings;
mod statistics;

pub use ccass::CcassAdapter;
pub use disclosure::DisclosureAdapter;
pub use filings::FilingsAdapter;
pub use statistics::StatisticsAdapter;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use url::Url;

use crate::error::{EngineError, ValidationError};
use crate::extract::{ExtractionSpec, RawFields};
use crate::types::{DateRange, NormalizedRecord, Provenance, StrategyKind};

/// Context about the attempt that produced the raw fields.
#[derive(Debug, Clone)]
pub struct AttemptMetadata {
    pub source: String,
    pub target_key: String,
    pub attempt_count: u32,
    pub strategy_used: StrategyKind,
    pub content_hash: String,
    pub date_range: Option<DateRange>,
    pub allow_partial: bool,
}

impl AttemptMetadata {
    pub fn provenance(&self) -> Provenance {
        Provenance {
            source: self.source.clone(),
            target_key: self.target_key.clone(),
            attempt_count: self.attempt_count,
            strategy_used: self.strategy_used,
            content_hash: self.content_hash.clone(),
        }
    }
}

/// Maps one source's raw payloads into canonical records.
pub trait SourceAdapter: Send + Sync {
    /// Source id used in requests (`ccass`, `filings`, ...)
    fn id(&self) -> &str;

    fn base_url(&self) -> &Url;

    /// URL for a target key. Fails for keys the source cannot address.
    fn target_url(&self, target_key: &str, date_range: Option<&DateRange>) -> Result<Url, EngineError>;

    /// Strategy used when the request carries no hint.
    fn default_strategy(&self) -> StrategyKind {
        StrategyKind::HttpFetch
    }

    fn extraction_spec(&self) -> ExtractionSpec;

    fn normalize(
        &self,
        raw: &RawFields,
        meta: &AttemptMetadata,
    ) -> Result<NormalizedRecord, ValidationError>;

    /// Deterministic page for a target key, served by the mock strategy in test mode.
    fn fixture_page(&self, target_key: &str, date_range: Option<&DateRange>) -> String;
}

/// Registered adapters by source id.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    adapters: BTreeMap<String, Arc<dyn SourceAdapter>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in adapter.
    pub fn builtin() -> Self {
        Self::new()
            .with_adapter(Arc::new(FilingsAdapter::new()))
            .with_adapter(Arc::new(CcassAdapter::new()))
            .with_adapter(Arc::new(StatisticsAdapter::new()))
            .with_adapter(Arc::new(DisclosureAdapter::new()))
    }

    pub fn with_adapter(mut self, adapter: Arc<dyn SourceAdapter>) -> Self {
        self.adapters.insert(adapter.id().to_string(), adapter);
        self
    }

    pub fn get(&self, source: &str) -> Result<Arc<dyn SourceAdapter>, EngineError> {
        self.adapters
            .get(source)
            .cloned()
            .ok_or_else(|| EngineError::UnknownSource(source.to_string()))
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.adapters.keys().map(String::as_str)
    }
}

/// Only `http`/`https` URLs with a host are dispatched.
pub fn validate_target_url(source: &str, target_key: &str, url: Url) -> Result<Url, EngineError> {
    let invalid = |reason: String| EngineError::InvalidTarget {
        source_id: source.to_string(),
        target_key: target_key.to_string(),
        reason,
    };

    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme `{}`", url.scheme())));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(invalid("URL has no host".to_string()));
    }
    Ok(url)
}

/// Origin used as the compliance and pacing key (`https://host[:port]`).
pub fn domain_of(url: &Url) -> String {
    url.origin().ascii_serialization()
}

/// Date a fixture page reports when the request has no range.
pub(crate) fn fixture_date(date_range: Option<&DateRange>) -> NaiveDate {
    date_range
        .map(|r| r.end)
        .or_else(|| NaiveDate::from_ymd_opt(2024, 1, 2))
        .unwrap_or_default()
}

/// Stable per-key seed for fixture values.
pub(crate) fn fixture_seed(target_key: &str) -> u64 {
    target_key
        .bytes()
        .fold(7u64, |acc, b| acc.wrapping_mul(31).wrapping_add(u64::from(b)))
}

/// Format with comma thousands separators, as the portals do.
pub(crate) fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Collects missing or invalid fields under partial tolerance.
pub(crate) struct FieldIssues {
    allow_partial: bool,
    missing: Vec<String>,
}

impl FieldIssues {
    pub(crate) fn new(allow_partial: bool) -> Self {
        Self {
            allow_partial,
            missing: Vec::new(),
        }
    }

    /// Record a problem; fails unless partial tolerance is on.
    pub(crate) fn tolerate(&mut self, error: ValidationError) -> Result<(), ValidationError> {
        if !self.allow_partial {
            return Err(error);
        }
        let field = error
            .field()
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        self.missing.push(field);
        Ok(())
    }

    pub(crate) fn into_missing(self) -> Vec<String> {
        self.missing
    }
}
