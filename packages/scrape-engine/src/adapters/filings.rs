//! Regulatory filing portal: one filing per target key.

use url::Url;

use super::{fixture_date, fixture_seed, validate_target_url, AttemptMetadata, FieldIssues, SourceAdapter};
use crate::error::{EngineError, ValidationError};
use crate::extract::{ExtractionSpec, FieldRule, RawFields, ValueShape};
use crate::parse::parse_date;
use crate::types::{DateRange, FilingRecord, FilingType, NormalizedRecord, RecordData};

const BASE_URL: &str = "https://www1.hkexnews.hk";
const SEARCH_PATH: &str = "/search/titlesearch.xhtml";

const FIXTURE_CATEGORIES: &[&str] = &[
    "Announcements and Notices - [Other - Business Update]",
    "Financial Statements/ESG Information - [Annual Report]",
    "Circulars - [Major Transaction]",
    "Monthly Returns - [Monthly Return of Equity Issuer]",
    "Listing Documents - [Prospectus]",
];

pub struct FilingsAdapter {
    base_url: Url,
}

impl Default for FilingsAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl FilingsAdapter {
    pub fn new() -> Self {
        Self {
            base_url: Url::parse(BASE_URL).unwrap_or_else(|_| unreachable!("static URL")),
        }
    }

    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }

    fn valid_key(target_key: &str) -> bool {
        !target_key.is_empty()
            && target_key.len() <= 32
            && target_key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }
}

impl SourceAdapter for FilingsAdapter {
    fn id(&self) -> &str {
        "filings"
    }

    fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn target_url(&self, target_key: &str, date_range: Option<&DateRange>) -> Result<Url, EngineError> {
        let key = target_key.trim();
        if !Self::valid_key(key) {
            return Err(EngineError::InvalidTarget {
                source_id: self.id().to_string(),
                target_key: target_key.to_string(),
                reason: "filing id must be 1 to 32 alphanumeric characters".to_string(),
            });
        }

        let mut url = self
            .base_url
            .join(SEARCH_PATH)
            .map_err(|e| EngineError::InvalidConfig(e.to_string()))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("lang", "en").append_pair("documentId", key);
            if let Some(range) = date_range {
                query
                    .append_pair("from", &range.start.format("%Y%m%d").to_string())
                    .append_pair("to", &range.end.format("%Y%m%d").to_string());
            }
        }
        validate_target_url(self.id(), target_key, url)
    }

    fn extraction_spec(&self) -> ExtractionSpec {
        ExtractionSpec::new()
            .field(FieldRule::new("title", "#filing-detail .doc-title").label("Document Title"))
            .field(
                FieldRule::new("filing_date", "#filing-detail .release-time")
                    .shape(ValueShape::Date)
                    .label("Release Time"),
            )
            .field(
                FieldRule::new("filing_type", "#filing-detail .headline-category")
                    .label("Headline Category"),
            )
            .field(FieldRule::new("stock_code", "#filing-detail .stock-code").optional())
            .field(
                FieldRule::new("tags", "#filing-detail .doc-tags .tag")
                    .multiple()
                    .optional(),
            )
            .field(
                FieldRule::new("document_url", "#filing-detail a.doc-link")
                    .attr("href")
                    .optional(),
            )
    }

    fn normalize(
        &self,
        raw: &RawFields,
        meta: &AttemptMetadata,
    ) -> Result<NormalizedRecord, ValidationError> {
        let mut issues = FieldIssues::new(meta.allow_partial);

        let title = raw.first("title").map(str::to_string);
        if title.is_none() {
            issues.tolerate(ValidationError::missing("title"))?;
        }

        let filing_date = match raw.first("filing_date") {
            Some(text) => match parse_date(text) {
                Some(date) => Some(date),
                None => {
                    issues.tolerate(ValidationError::invalid(
                        "filing_date",
                        format!("`{text}` is not a date"),
                    ))?;
                    None
                }
            },
            None => {
                issues.tolerate(ValidationError::missing("filing_date"))?;
                None
            }
        };

        // Out-of-range dates are rejected even under partial tolerance
        if let (Some(date), Some(range)) = (filing_date, meta.date_range.as_ref()) {
            if !range.contains(date) {
                return Err(ValidationError::invalid(
                    "filing_date",
                    format!("{date} is outside {} to {}", range.start, range.end),
                ));
            }
        }

        let filing_type = raw.first("filing_type").map(FilingType::normalize);
        if filing_type.is_none() {
            issues.tolerate(ValidationError::missing("filing_type"))?;
        }

        let document_url = raw
            .first("document_url")
            .and_then(|href| self.base_url.join(href).ok())
            .map(String::from);

        Ok(NormalizedRecord::new(
            meta.provenance(),
            RecordData::Filing(FilingRecord {
                filing_id: meta.target_key.trim().to_string(),
                title,
                filing_date,
                filing_type,
                tags: raw.all("tags").to_vec(),
                stock_code: raw.first("stock_code").map(str::to_string),
                document_url,
            }),
        )
        .with_missing_fields(issues.into_missing()))
    }

    fn fixture_page(&self, target_key: &str, date_range: Option<&DateRange>) -> String {
        let seed = fixture_seed(target_key);
        let date = fixture_date(date_range);
        let category = FIXTURE_CATEGORIES[(seed % FIXTURE_CATEGORIES.len() as u64) as usize];
        let stock_code = format!("{:05}", seed % 10_000);

        format!(
            r#"<!DOCTYPE html>
<html><head><title>HKEXnews - Filing {target_key}</title></head>
<body>
<div id="filing-detail">
  <div class="headline-category">{category}</div>
  <h2 class="doc-title">Fixture filing {target_key}</h2>
  <span class="label">Release Time:</span><div class="release-time">{date} 16:30</div>
  <span class="stock-code">{stock_code}</span>
  <ul class="doc-tags"><li class="tag">fixture</li><li class="tag">{stock_code}</li></ul>
  <a class="doc-link" href="/listedco/listconews/sehk/{year}/{mmdd}/{target_key}.pdf">Download</a>
</div>
</body></html>"#,
            date = date.format("%d/%m/%Y"),
            year = date.format("%Y"),
            mmdd = date.format("%m%d"),
        )
    }
}
