//! Normalized records produced by source adapters.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::request::StrategyKind;

/// Where a record came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provenance {
    pub source: String,
    pub target_key: String,
    pub attempt_count: u32,
    pub strategy_used: StrategyKind,
    /// SHA-256 of the snapshot the record was extracted from
    pub content_hash: String,
}

impl Provenance {
    pub fn hash_content(content: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// Fixed filing-type vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilingType {
    Announcement,
    Circular,
    FinancialReport,
    Prospectus,
    MonthlyReturn,
    Notice,
    Other,
}

impl FilingType {
    /// Map a portal's free-text category onto the vocabulary.
    pub fn normalize(raw: &str) -> Self {
        let lower = raw.trim().to_lowercase();
        let has = |needle: &str| lower.contains(needle);

        if has("monthly return") {
            Self::MonthlyReturn
        } else if has("annual report")
            || has("interim report")
            || has("quarterly report")
            || has("results")
            || has("financial statement")
        {
            Self::FinancialReport
        } else if has("prospectus") || has("listing document") {
            Self::Prospectus
        } else if has("circular") {
            Self::Circular
        } else if has("notice") || has("proxy form") {
            Self::Notice
        } else if has("announcement") {
            Self::Announcement
        } else {
            Self::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Announcement => "announcement",
            Self::Circular => "circular",
            Self::FinancialReport => "financial-report",
            Self::Prospectus => "prospectus",
            Self::MonthlyReturn => "monthly-return",
            Self::Notice => "notice",
            Self::Other => "other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilingRecord {
    pub filing_id: String,
    pub title: Option<String>,
    pub filing_date: Option<NaiveDate>,
    pub filing_type: Option<FilingType>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub stock_code: Option<String>,
    pub document_url: Option<String>,
}

/// One participant row on a depository holdings page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Holding {
    pub participant_id: String,
    pub participant_name: Option<String>,
    pub shareholding: u64,
    pub percentage: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldingsRecord {
    pub stock_code: String,
    pub data_date: NaiveDate,
    pub holdings: Vec<Holding>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub period: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsRecord {
    pub table_id: String,
    pub title: String,
    pub unit: Option<String>,
    pub observations: Vec<Observation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisclosureNotice {
    pub holder_name: String,
    pub event_date: NaiveDate,
    pub shares_involved: u64,
    pub reason: Option<String>,
    pub percentage_after: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisclosureRecord {
    pub stock_code: String,
    pub notices: Vec<DisclosureNotice>,
}

/// Source-specific payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum RecordData {
    Filing(FilingRecord),
    Holdings(HoldingsRecord),
    Statistics(StatisticsRecord),
    Disclosure(DisclosureRecord),
}

/// A storable unit: natural key plus JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordRow {
    pub natural_key: String,
    pub payload: serde_json::Value,
}

/// Typed record plus provenance, ready for the sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedRecord {
    pub provenance: Provenance,
    pub data: RecordData,
    /// Required fields that were absent; non-empty only under partial tolerance
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_fields: Vec<String>,
}

impl NormalizedRecord {
    pub fn new(provenance: Provenance, data: RecordData) -> Self {
        Self {
            provenance,
            data,
            missing_fields: Vec::new(),
        }
    }

    pub fn with_missing_fields(mut self, fields: Vec<String>) -> Self {
        self.missing_fields = fields;
        self
    }

    pub fn is_partial(&self) -> bool {
        !self.missing_fields.is_empty()
    }

    /// Split into storable rows keyed by natural key.
    ///
    /// Holdings and disclosure notices produce one row per entry; filings one
    /// row; statistics one row per observation period.
    pub fn rows(&self) -> Vec<RecordRow> {
        let source = &self.provenance.source;
        let hash = &self.provenance.content_hash;

        let row = |key: String, value: serde_json::Value| RecordRow {
            natural_key: key,
            payload: serde_json::json!({
                "source": source,
                "contentHash": hash,
                "data": value,
            }),
        };

        match &self.data {
            RecordData::Filing(f) => {
                vec![row(format!("{source}:{}", f.filing_id), to_json(f))]
            }
            RecordData::Holdings(h) => h
                .holdings
                .iter()
                .map(|holding| {
                    row(
                        format!(
                            "{source}:{}:{}:{}",
                            h.stock_code, holding.participant_id, h.data_date
                        ),
                        serde_json::json!({
                            "stockCode": h.stock_code,
                            "dataDate": h.data_date,
                            "holding": to_json(holding),
                        }),
                    )
                })
                .collect(),
            RecordData::Statistics(s) => s
                .observations
                .iter()
                .map(|obs| {
                    row(
                        format!("{source}:{}:{}", s.table_id, obs.period),
                        serde_json::json!({
                            "tableId": s.table_id,
                            "title": s.title,
                            "unit": s.unit,
                            "observation": to_json(obs),
                        }),
                    )
                })
                .collect(),
            RecordData::Disclosure(d) => d
                .notices
                .iter()
                .map(|notice| {
                    row(
                        format!(
                            "{source}:{}:{}:{}",
                            d.stock_code,
                            notice.holder_name.to_lowercase(),
                            notice.event_date
                        ),
                        serde_json::json!({
                            "stockCode": d.stock_code,
                            "notice": to_json(notice),
                        }),
                    )
                })
                .collect(),
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
}
