//! Disclosure of interests notices for one listed issuer.

use url::Url;

use super::{
    fixture_date, fixture_seed, group_thousands, validate_target_url, AttemptMetadata,
    FieldIssues, SourceAdapter,
};
use crate::error::{EngineError, ValidationError};
use crate::extract::{ExtractionSpec, FieldRule, RawFields, ValueShape};
use crate::parse::{parse_date, parse_number, parse_quantity};
use crate::types::{DateRange, DisclosureNotice, DisclosureRecord, NormalizedRecord, RecordData};

const BASE_URL: &str = "https://di.hkex.com.hk";
const LIST_PATH: &str = "/di/NSAllFormList.aspx";

const FIXTURE_HOLDERS: &[(&str, &str)] = &[
    ("Naspers Limited", "1101(L)"),
    ("JPMorgan Chase & Co.", "1201(L)"),
    ("BlackRock, Inc.", "1104(S)"),
];

pub struct DisclosureAdapter {
    base_url: Url,
}

impl Default for DisclosureAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl DisclosureAdapter {
    pub fn new() -> Self {
        Self {
            base_url: Url::parse(BASE_URL).unwrap_or_else(|_| unreachable!("static URL")),
        }
    }

    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }

    fn stock_code(text: &str) -> Option<String> {
        let code = text.trim();
        (!code.is_empty() && code.len() <= 5 && code.chars().all(|c| c.is_ascii_digit()))
            .then(|| format!("{code:0>5}"))
    }
}

impl SourceAdapter for DisclosureAdapter {
    fn id(&self) -> &str {
        "disclosure"
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
            .join(LIST_PATH)
            .map_err(|e| EngineError::InvalidConfig(e.to_string()))?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("sa2", "an")
                .append_pair("sc", &code)
                .append_pair("src", "MAIN")
                .append_pair("lang", "EN");
            if let Some(range) = date_range {
                query
                    .append_pair("sd", &range.start.format("%d/%m/%Y").to_string())
                    .append_pair("ed", &range.end.format("%d/%m/%Y").to_string());
            }
        }
        validate_target_url(self.id(), target_key, url)
    }

    fn extraction_spec(&self) -> ExtractionSpec {
        ExtractionSpec::new()
            .field(FieldRule::new("stock_code", "#lblStockCode").label("Stock code"))
            .rows(
                "#grdPaging tr",
                vec![
                    FieldRule::new("holder_name", "td.tbCell-name").label("Name of substantial shareholder"),
                    FieldRule::new("event_date", "td.tbCell-date")
                        .shape(ValueShape::Date)
                        .label("Date of relevant event"),
                    FieldRule::new("shares_involved", "td.tbCell-shares")
                        .shape(ValueShape::Number)
                        .label("No. of shares bought / sold / involved"),
                    FieldRule::new("reason", "td.tbCell-reason").optional(),
                    FieldRule::new("percentage_after", "td.tbCell-pct").optional(),
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

        let mut notices = Vec::new();
        for (i, row) in raw.rows.iter().enumerate() {
            let holder = row.get("holder_name");
            let date = row.get("event_date").and_then(|d| parse_date(d));
            let shares = row.get("shares_involved").and_then(|s| parse_quantity(s));

            let (Some(holder_name), Some(event_date), Some(shares_involved)) = (holder, date, shares)
            else {
                let field = if holder.is_none() {
                    "holder_name"
                } else if date.is_none() {
                    "event_date"
                } else {
                    "shares_involved"
                };
                issues.tolerate(ValidationError::missing(format!("row[{i}].{field}")))?;
                continue;
            };

            notices.push(DisclosureNotice {
                holder_name: holder_name.clone(),
                event_date,
                shares_involved,
                reason: row.get("reason").cloned(),
                percentage_after: row.get("percentage_after").and_then(|p| parse_number(p)),
            });
        }

        if notices.is_empty() {
            return Err(ValidationError::NoRows {
                reason: format!("no valid notices for {stock_code}"),
            });
        }

        Ok(NormalizedRecord::new(
            meta.provenance(),
            RecordData::Disclosure(DisclosureRecord {
                stock_code,
                notices,
            }),
        )
        .with_missing_fields(issues.into_missing()))
    }

    fn fixture_page(&self, target_key: &str, date_range: Option<&DateRange>) -> String {
        let code = Self::stock_code(target_key).unwrap_or_else(|| target_key.to_string());
        let seed = fixture_seed(&code);
        let date = fixture_date(date_range);

        let rows: String = FIXTURE_HOLDERS
            .iter()
            .enumerate()
            .map(|(i, (holder, reason))| {
                let shares = (seed >> (i * 7)) % 50_000_000 + 10_000;
                let pct = (seed >> (i * 3)) % 2_000 / 100 + 5;
                format!(
                    r#"<tr>
  <td class="tbCell-name">{holder}</td>
  <td class="tbCell-reason">{reason}</td>
  <td class="tbCell-shares">{shares}</td>
  <td class="tbCell-pct">{pct}.00</td>
  <td class="tbCell-date">{date}</td>
</tr>"#,
                    shares = group_thousands(shares),
                    date = date.format("%d/%m/%Y"),
                )
            })
            .collect();

        format!(
            r#"<!DOCTYPE html>
<html><head><title>Disclosure of Interests</title></head>
<body>
<span id="lblStockCode">{code}</span>
<table id="grdPaging">
<tr class="tbHeader"><th>Name of substantial shareholder</th><th>Reason for disclosure</th><th>No. of shares bought / sold / involved</th><th>% of issued voting shares</th><th>Date of relevant event</th></tr>
{rows}
</table>
</body></html>"#
        )
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::extract::{Extractor, HtmlExtractor};
    use crate::types::StrategyKind;

    fn meta(allow_partial: bool) -> AttemptMetadata {
        AttemptMetadata {
            source: "disclosure".to_string(),
            target_key: "5".to_string(),
            attempt_count: 2,
            strategy_used: StrategyKind::HttpFetch,
            content_hash: "h".to_string(),
            date_range: None,
            allow_partial,
        }
    }

    #[test]
    fn test_fixture_skips_header_row() {
        let adapter = DisclosureAdapter::new();
        let page = adapter.fixture_page("5", None);
        let raw = HtmlExtractor.extract(&page, &adapter.extraction_spec()).unwrap();
        assert_eq!(raw.rows.len(), FIXTURE_HOLDERS.len());

        let record = adapter.normalize(&raw, &meta(false)).unwrap();
        let RecordData::Disclosure(d) = &record.data else {
            panic!("expected disclosure");
        };
        assert_eq!(d.stock_code, "00005");
        assert_eq!(d.notices[0].holder_name, "Naspers Limited");
        assert_eq!(d.notices[0].event_date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(record.provenance.attempt_count, 2);

        let keys: Vec<String> = record.rows().into_iter().map(|r| r.natural_key).collect();
        assert_eq!(keys[0], "disclosure:00005:naspers limited:2024-01-02");
    }

    #[test]
    fn test_invalid_notice_row() {
        let mut raw = RawFields::default();
        raw.page.insert("stock_code".into(), vec!["00005".into()]);
        raw.rows.push(
            [
                ("holder_name".to_string(), "HSBC Holdings".to_string()),
                ("event_date".to_string(), "not yet".to_string()),
                ("shares_involved".to_string(), "1,000".to_string()),
            ]
            .into_iter()
            .collect(),
        );

        let adapter = DisclosureAdapter::new();
        assert_eq!(
            adapter.normalize(&raw, &meta(false)).unwrap_err(),
            ValidationError::missing("row[0].event_date")
        );
        assert!(matches!(
            adapter.normalize(&raw, &meta(true)),
            Err(ValidationError::NoRows { .. })
        ));
    }

    #[test]
    fn test_date_range_in_query() {
        let d = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        let url = DisclosureAdapter::new()
            .target_url("700", Some(&DateRange::new(d, d).unwrap()))
            .unwrap();
        let query = url.query().unwrap();
        assert!(query.contains("sc=00700"));
        assert!(query.contains("sd=29%2F02%2F2024"));
    }
}
