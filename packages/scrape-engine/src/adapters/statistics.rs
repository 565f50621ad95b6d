//! Statistical publication tables.

use url::Url;

use super::{fixture_seed, validate_target_url, AttemptMetadata, FieldIssues, SourceAdapter};
use crate::error::{EngineError, ValidationError};
use crate::extract::{ExtractionSpec, FieldRule, RawFields, ValueShape};
use crate::parse::parse_number;
use crate::types::{DateRange, NormalizedRecord, Observation, RecordData, StatisticsRecord, StrategyKind};

const BASE_URL: &str = "https://www.censtatd.gov.hk";
const TABLE_PATH: &str = "/en/web_table.html";

pub struct StatisticsAdapter {
    base_url: Url,
}

impl Default for StatisticsAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl StatisticsAdapter {
    pub fn new() -> Self {
        Self {
            base_url: Url::parse(BASE_URL).unwrap_or_else(|_| unreachable!("static URL")),
        }
    }

    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }
}

impl SourceAdapter for StatisticsAdapter {
    fn id(&self) -> &str {
        "statistics"
    }

    fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn target_url(&self, target_key: &str, _date_range: Option<&DateRange>) -> Result<Url, EngineError> {
        let key = target_key.trim();
        let valid = !key.is_empty()
            && key.len() <= 24
            && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
        if !valid {
            return Err(EngineError::InvalidTarget {
                source_id: self.id().to_string(),
                target_key: target_key.to_string(),
                reason: "table id must be alphanumeric with dashes".to_string(),
            });
        }

        let mut url = self
            .base_url
            .join(TABLE_PATH)
            .map_err(|e| EngineError::InvalidConfig(e.to_string()))?;
        url.query_pairs_mut().append_pair("id", key);
        validate_target_url(self.id(), target_key, url)
    }

    /// Tables are populated client-side.
    fn default_strategy(&self) -> StrategyKind {
        StrategyKind::HeadlessRender
    }

    fn extraction_spec(&self) -> ExtractionSpec {
        ExtractionSpec::new()
            .field(FieldRule::new("title", "#tableTitle").label("Table"))
            .field(FieldRule::new("unit", "#tableUnit").optional())
            .rows(
                "#dataTable tbody tr",
                vec![
                    FieldRule::new("period", "td.period").label("Period"),
                    FieldRule::new("value", "td.value")
                        .shape(ValueShape::Number)
                        .label("Value"),
                ],
            )
    }

    fn normalize(
        &self,
        raw: &RawFields,
        meta: &AttemptMetadata,
    ) -> Result<NormalizedRecord, ValidationError> {
        let mut issues = FieldIssues::new(meta.allow_partial);

        let title = match raw.first("title") {
            Some(title) => title.to_string(),
            None => {
                issues.tolerate(ValidationError::missing("title"))?;
                meta.target_key.clone()
            }
        };

        let mut observations = Vec::new();
        for (i, row) in raw.rows.iter().enumerate() {
            let Some(period) = row.get("period") else {
                issues.tolerate(ValidationError::missing(format!("row[{i}].period")))?;
                continue;
            };
            // Suppressed cells ("-", "§") only pass under partial tolerance
            match row.get("value").map(|v| (v, parse_number(v))) {
                Some((_, Some(value))) => observations.push(Observation {
                    period: period.clone(),
                    value,
                }),
                Some((text, None)) => issues.tolerate(ValidationError::invalid(
                    format!("row[{i}].value"),
                    format!("`{text}` is not numeric"),
                ))?,
                None => issues.tolerate(ValidationError::missing(format!("row[{i}].value")))?,
            }
        }

        if observations.is_empty() {
            return Err(ValidationError::NoRows {
                reason: format!("table {} has no numeric observations", meta.target_key),
            });
        }

        Ok(NormalizedRecord::new(
            meta.provenance(),
            RecordData::Statistics(StatisticsRecord {
                table_id: meta.target_key.trim().to_string(),
                title,
                unit: raw.first("unit").map(str::to_string),
                observations,
            }),
        )
        .with_missing_fields(issues.into_missing()))
    }

    fn fixture_page(&self, target_key: &str, _date_range: Option<&DateRange>) -> String {
        let seed = fixture_seed(target_key);
        let rows: String = (0..8u64)
            .map(|q| {
                let year = 2022 + q / 4;
                let quarter = q % 4 + 1;
                let value = (seed.rotate_left(q as u32 * 5) % 100_000) as f64 / 10.0;
                format!(
                    r#"<tr><td class="period">{year} Q{quarter}</td><td class="value">{value:.1}</td></tr>"#
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            r#"<!DOCTYPE html>
<html><head><title>Table {target_key}</title></head>
<body>
<div class="table-header">
  <h1 id="tableTitle">Fixture statistics table {target_key}</h1>
  <p id="tableUnit">HK$ million</p>
</div>
<table id="dataTable">
<thead><tr><th>Period</th><th>Value</th></tr></thead>
<tbody>
{rows}
</tbody>
</table>
</body></html>"#
        )
    }
}
