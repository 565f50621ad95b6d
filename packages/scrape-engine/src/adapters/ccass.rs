//! Depository (CCASS) shareholding search.

use chrono::NaiveDate;
use url::Url;

use super::{
    fixture_date, fixture_seed, group_thousands, validate_target_url, AttemptMetadata,
    FieldIssues, SourceAdapter,
};
use crate::error::{EngineError, ValidationError};
use crate::extract::{ExtractionSpec, FieldRule, RawFields, ValueShape};
use crate::parse::{parse_date, parse_number, parse_quantity};
use crate::types::{DateRange, Holding, HoldingsRecord, NormalizedRecord, RecordData};

const BASE_URL: &str = "https://www3.hkexnews.hk";
const SEARCH_PATH: &str = "/sdw/search/searchsdw.aspx";

const FIXTURE_PARTICIPANTS: &[(&str, &str)] = &[
    ("C00019", "THE HONGKONG AND SHANGHAI BANKING"),
    ("C00010", "CITIBANK N.A."),
    ("C00039", "STANDARD CHARTERED BANK (HONG KONG)"),
    ("B01451", "GOLDMAN SACHS (ASIA) SECURITIES"),
];

pub struct CcassAdapter {
    base_url: Url,
}

impl Default for CcassAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl CcassAdapter {
    pub fn new() -> Self {
        Self {
            base_url: Url::parse(BASE_URL).unwrap_or_else(|_| unreachable!("static URL")),
        }
    }

    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }

    /// Stock codes are up to five digits, zero-padded.
    fn stock_code(target_key: &str) -> Option<String> {
        let key = target_key.trim();
        (!key.is_empty() && key.len() <= 5 && key.chars().all(|c| c.is_ascii_digit()))
            .then(|| format!("{key:0>5}"))
    }
}

impl SourceAdapter for CcassAdapter {
    fn id(&self) -> &str {
        "ccass"
    }

    fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn target_url(&self, target_key: &str, date_range: Option<&DateRange>) -> Result<Url, EngineError> {
        let code = Self::stock_code(target_key).ok_or_else(|| EngineError::InvalidTarget {
            source_id: self.id().to_string(),
            target_key: target_key.to_string(),
            reason: "stock code must be 1 to 5 digits".to_string(),
        })?;

        let mut url = self
            .base_url
            .join(SEARCH_PATH)
            .map_err(|e| EngineError::InvalidConfig(e.to_string()))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("txtStockCode", &code);
            if let Some(range) = date_range {
                query.append_pair("txtShareholdingDate", &range.end.format("%Y/%m/%d").to_string());
            }
        }
        validate_target_url(self.id(), target_key, url)
    }

    fn extraction_spec(&self) -> ExtractionSpec {
        ExtractionSpec::new()
            .field(
                FieldRule::new("stock_code", "#txtStockCode")
                    .attr("value")
                    .label("Stock code"),
            )
            .field(
                FieldRule::new("data_date", "#txtShareholdingDate")
                    .attr("value")
                    .shape(ValueShape::Date)
                    .label("Shareholding date"),
            )
            .field(FieldRule::new("stock_name", "#txtStockName").attr("value").optional())
            .rows(
                "#pnlResultNormal table tbody tr",
                vec![
                    FieldRule::new("participant_id", "td.col-participant-id .mobile-list-body")
                        .label("Participant ID"),
                    FieldRule::new("participant_name", "td.col-participant-name .mobile-list-body")
                        .optional(),
                    FieldRule::new("shareholding", "td.col-shareholding .mobile-list-body")
                        .shape(ValueShape::Number)
                        .label("Shareholding"),
                    FieldRule::new(
                        "percentage",
                        "td.col-shareholding-percent .mobile-list-body",
                    )
                    .optional(),
                ],
            )
    }

    fn normalize(
        &self,
        raw: &RawFields,
        meta: &AttemptMetadata,
    ) -> Result<NormalizedRecord, ValidationError> {
        let mut issues = FieldIssues::new(meta.allow_partial);

        let stock_code = match raw.first("stock_code").and_then(Self::stock_code) {
            Some(code) => code,
            None => {
                issues.tolerate(ValidationError::missing("stock_code"))?;
                Self::stock_code(&meta.target_key)
                    .ok_or_else(|| ValidationError::missing("stock_code"))?
            }
        };

        let data_date = match raw.first("data_date").and_then(parse_date) {
            Some(date) => date,
            None => {
                issues.tolerate(ValidationError::missing("data_date"))?;
                meta.date_range
                    .map(|r| r.end)
                    .ok_or_else(|| ValidationError::missing("data_date"))?
            }
        };

        let mut holdings = Vec::with_capacity(raw.rows.len());
        for (i, row) in raw.rows.iter().enumerate() {
            let Some(participant_id) = row.get("participant_id").filter(|v| !v.is_empty()) else {
                issues.tolerate(ValidationError::missing(format!("row[{i}].participant_id")))?;
                continue;
            };
            let shareholding = match row.get("shareholding").map(|v| (v, parse_quantity(v))) {
                Some((_, Some(n))) => n,
                Some((text, None)) => {
                    issues.tolerate(ValidationError::invalid(
                        format!("row[{i}].shareholding"),
                        format!("`{text}` is not a share count"),
                    ))?;
                    continue;
                }
                None => {
                    issues.tolerate(ValidationError::missing(format!("row[{i}].shareholding")))?;
                    continue;
                }
            };

            holdings.push(Holding {
                participant_id: participant_id.clone(),
                participant_name: row.get("participant_name").cloned(),
                shareholding,
                percentage: row.get("percentage").and_then(|p| parse_number(p)),
            });
        }

        if holdings.is_empty() {
            return Err(ValidationError::NoRows {
                reason: format!("no valid participant rows for {stock_code}"),
            });
        }

        Ok(NormalizedRecord::new(
            meta.provenance(),
            RecordData::Holdings(HoldingsRecord {
                stock_code,
                data_date,
                holdings,
            }),
        )
        .with_missing_fields(issues.into_missing()))
    }

    fn fixture_page(&self, target_key: &str, date_range: Option<&DateRange>) -> String {
        let code = Self::stock_code(target_key).unwrap_or_else(|| target_key.to_string());
        let date: NaiveDate = fixture_date(date_range);
        let seed = fixture_seed(&code);

        let total: u64 = 1_000_000_000 + seed % 1_000_000_000;
        let rows: String = FIXTURE_PARTICIPANTS
            .iter()
            .enumerate()
            .map(|(i, (id, name))| {
                let shares = (seed / (i as u64 + 1)) % 500_000_000 + 1_000 * (i as u64 + 1);
                let pct = shares as f64 * 100.0 / total as f64;
                format!(
                    r#"<tr>
  <td class="col-participant-id"><div class="mobile-list-heading">Participant ID:</div><div class="mobile-list-body">{id}</div></td>
  <td class="col-participant-name"><div class="mobile-list-heading">Name of CCASS Participant:</div><div class="mobile-list-body">{name}</div></td>
  <td class="col-shareholding text-right"><div class="mobile-list-heading">Shareholding:</div><div class="mobile-list-body">{shares}</div></td>
  <td class="col-shareholding-percent text-right"><div class="mobile-list-heading">% of the total number of Issued Shares:</div><div class="mobile-list-body">{pct:.2}%</div></td>
</tr>"#,
                    shares = group_thousands(shares),
                )
            })
            .collect();

        format!(
            r#"<!DOCTYPE html>
<html><head><title>CCASS Shareholding Search</title></head>
<body>
<form id="form1">
  <input type="text" id="txtShareholdingDate" value="{date}">
  <input type="text" id="txtStockCode" value="{code}">
  <input type="text" id="txtStockName" value="FIXTURE ISSUER {code}">
</form>
<div id="pnlResultNormal">
<table class="table table-scroll table-sort table-mobile-list"><thead>
<tr><th>Participant ID</th><th>Name of CCASS Participant</th><th>Shareholding</th><th>% of the total number of Issued Shares</th></tr>
</thead><tbody>
{rows}
</tbody></table>
</div>
</body></html>"#,
            date = date.format("%Y/%m/%d"),
        )
    }
}
