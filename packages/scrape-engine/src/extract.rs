//! Selector-driven field extraction.
//!
//! An [`ExtractionSpec`] lists page-level fields and an optional repeated row
//! rule. The default [`HtmlExtractor`] evaluates CSS selectors with the
//! `scraper` crate.

use std::collections::BTreeMap;

use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

use crate::error::SelectorMiss;
use crate::parse::{clean_text, parse_date, parse_number};

/// Field key used for the row selector itself.
pub const ROWS_FIELD: &str = "@rows";

/// Expected value shape, checked when validating healed selectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueShape {
    #[default]
    Text,
    Number,
    Date,
}

impl ValueShape {
    pub fn accepts(&self, value: &str) -> bool {
        match self {
            Self::Text => !value.trim().is_empty(),
            Self::Number => parse_number(value).is_some(),
            Self::Date => parse_date(value).is_some(),
        }
    }
}

/// Where one field lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRule {
    pub name: String,
    pub selector: String,
    /// Read this attribute instead of the element text
    pub attr: Option<String>,
    pub required: bool,
    /// Collect every match rather than the first
    pub multiple: bool,
    pub shape: ValueShape,
    /// Visible label near the value, used as a healing hint
    pub label: Option<String>,
}

impl FieldRule {
    pub fn new(name: impl Into<String>, selector: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            selector: selector.into(),
            attr: None,
            required: true,
            multiple: false,
            shape: ValueShape::Text,
            label: None,
        }
    }

    pub fn attr(mut self, attr: impl Into<String>) -> Self {
        self.attr = Some(attr.into());
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn multiple(mut self) -> Self {
        self.multiple = true;
        self
    }

    pub fn shape(mut self, shape: ValueShape) -> Self {
        self.shape = shape;
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Repeated rows; field selectors are relative to each row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowRule {
    pub selector: String,
    pub fields: Vec<FieldRule>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExtractionSpec {
    pub page_fields: Vec<FieldRule>,
    pub rows: Option<RowRule>,
}

impl ExtractionSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, rule: FieldRule) -> Self {
        self.page_fields.push(rule);
        self
    }

    pub fn rows(mut self, selector: impl Into<String>, fields: Vec<FieldRule>) -> Self {
        self.rows = Some(RowRule {
            selector: selector.into(),
            fields,
        });
        self
    }

    /// Rule for a field key: a page field name, [`ROWS_FIELD`], or `row.<name>`.
    pub fn rule(&self, field: &str) -> Option<FieldRule> {
        if field == ROWS_FIELD {
            return self
                .rows
                .as_ref()
                .map(|r| FieldRule::new(ROWS_FIELD, r.selector.clone()));
        }
        if let Some(name) = field.strip_prefix("row.") {
            return self
                .rows
                .as_ref()
                .and_then(|r| r.fields.iter().find(|f| f.name == name).cloned());
        }
        self.page_fields.iter().find(|f| f.name == field).cloned()
    }

    pub fn selector(&self, field: &str) -> Option<String> {
        self.rule(field).map(|r| r.selector)
    }

    /// Copy with one field's selector replaced.
    pub fn with_selector(&self, field: &str, selector: &str) -> Self {
        let mut spec = self.clone();
        if field == ROWS_FIELD {
            if let Some(rows) = spec.rows.as_mut() {
                rows.selector = selector.to_string();
            }
        } else if let Some(name) = field.strip_prefix("row.") {
            if let Some(rule) = spec
                .rows
                .as_mut()
                .and_then(|r| r.fields.iter_mut().find(|f| f.name == name))
            {
                rule.selector = selector.to_string();
            }
        } else if let Some(rule) = spec.page_fields.iter_mut().find(|f| f.name == field) {
            rule.selector = selector.to_string();
        }
        spec
    }

    /// Selectors of every field except `field`.
    pub fn other_selectors(&self, field: &str) -> Vec<String> {
        let mut selectors: Vec<String> = self
            .page_fields
            .iter()
            .filter(|f| f.name != field)
            .map(|f| f.selector.clone())
            .collect();
        if let Some(rows) = &self.rows {
            if field != ROWS_FIELD {
                selectors.push(rows.selector.clone());
            }
            selectors.extend(
                rows.fields
                    .iter()
                    .filter(|f| format!("row.{}", f.name) != field)
                    .map(|f| f.selector.clone()),
            );
        }
        selectors
    }
}

/// Values pulled out of one snapshot.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct RawFields {
    pub page: BTreeMap<String, Vec<String>>,
    pub rows: Vec<BTreeMap<String, String>>,
}

impl RawFields {
    pub fn first(&self, name: &str) -> Option<&str> {
        self.page
            .get(name)
            .and_then(|v| v.first())
            .map(String::as_str)
    }

    pub fn all(&self, name: &str) -> &[String] {
        self.page.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    /// Whether every required value matches its declared shape.
    pub fn conforms_to(&self, spec: &ExtractionSpec) -> bool {
        let page_ok = spec.page_fields.iter().filter(|f| f.required).all(|f| {
            self.all(&f.name)
                .first()
                .map_or(false, |v| f.shape.accepts(v))
        });
        let rows_ok = spec.rows.as_ref().map_or(true, |rule| {
            !self.rows.is_empty()
                && rule.fields.iter().filter(|f| f.required).all(|f| {
                    self.rows
                        .iter()
                        .any(|row| row.get(&f.name).map_or(false, |v| f.shape.accepts(v)))
                })
        });
        page_ok && rows_ok
    }
}

/// Turns content into raw fields according to a spec.
pub trait Extractor: Send + Sync {
    fn extract(&self, content: &str, spec: &ExtractionSpec) -> Result<RawFields, SelectorMiss>;
}

/// CSS-selector extractor over HTML.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlExtractor;

impl HtmlExtractor {
    fn compile(field: &str, selector: &str) -> Result<Selector, SelectorMiss> {
        Selector::parse(selector).map_err(|_| SelectorMiss {
            field: field.to_string(),
            selector: selector.to_string(),
        })
    }

    fn value_of(element: ElementRef<'_>, rule: &FieldRule) -> Option<String> {
        let value = match &rule.attr {
            Some(attr) => element.value().attr(attr).map(clean_text),
            None => Some(clean_text(&element.text().collect::<String>())),
        }?;
        (!value.is_empty()).then_some(value)
    }
}

impl Extractor for HtmlExtractor {
    fn extract(&self, content: &str, spec: &ExtractionSpec) -> Result<RawFields, SelectorMiss> {
        let document = Html::parse_document(content);
        let mut fields = RawFields::default();

        for rule in &spec.page_fields {
            let selector = Self::compile(&rule.name, &rule.selector)?;
            let mut values = document
                .select(&selector)
                .filter_map(|el| Self::value_of(el, rule));
            let values: Vec<String> = if rule.multiple {
                values.collect()
            } else {
                values.next().into_iter().collect()
            };

            if values.is_empty() && rule.required {
                return Err(SelectorMiss {
                    field: rule.name.clone(),
                    selector: rule.selector.clone(),
                });
            }
            if !values.is_empty() {
                fields.page.insert(rule.name.clone(), values);
            }
        }

        if let Some(row_rule) = &spec.rows {
            let row_selector = Self::compile(ROWS_FIELD, &row_rule.selector)?;
            let compiled: Vec<(&FieldRule, Selector)> = row_rule
                .fields
                .iter()
                .map(|f| Ok((f, Self::compile(&format!("row.{}", f.name), &f.selector)?)))
                .collect::<Result<_, SelectorMiss>>()?;

            let mut matched_rows = 0usize;
            for row in document.select(&row_selector) {
                matched_rows += 1;
                let values: BTreeMap<String, String> = compiled
                    .iter()
                    .filter_map(|(rule, sel)| {
                        row.select(sel)
                            .find_map(|el| Self::value_of(el, rule))
                            .map(|v| (rule.name.clone(), v))
                    })
                    .collect();
                // Header and spacer rows carry none of the fields
                if !values.is_empty() {
                    fields.rows.push(values);
                }
            }

            if matched_rows == 0 {
                return Err(SelectorMiss {
                    field: ROWS_FIELD.to_string(),
                    selector: row_rule.selector.clone(),
                });
            }

            for rule in row_rule.fields.iter().filter(|f| f.required) {
                if !fields.rows.iter().any(|row| row.contains_key(&rule.name)) {
                    return Err(SelectorMiss {
                        field: format!("row.{}", rule.name),
                        selector: rule.selector.clone(),
                    });
                }
            }
        }

        Ok(fields)
    }
}
