//! Heuristic suggestion generator.
//!
//! Candidates come from three places: element ids and classes whose tokens
//! overlap the field's intent, cells adjacent to the field's visible label, and
//! for row fields the header column carrying the label. When the failed
//! selector had a descendant tail (`td.qty .value`), candidates are also tried
//! with that tail preserved.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};

use super::{HealingSuggestion, SelectorHealingRequest, SuggestionGenerator};
use crate::extract::ROWS_FIELD;
use crate::parse::clean_text;

/// Tokens that appear on most markup and carry no intent.
const NOISE_TOKENS: &[&str] = &[
    "txt", "lbl", "col", "div", "span", "td", "tr", "th", "table", "tbody", "list", "item", "mobile",
    "heading", "body", "value", "data", "row", "cell", "nth", "child", "of", "type",
];

const MAX_FALLBACKS: usize = 4;

/// Derives candidates from element ids/classes and field labels.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicSuggestionGenerator;

#[async_trait]
impl SuggestionGenerator for HeuristicSuggestionGenerator {
    async fn suggest(&self, request: &SelectorHealingRequest) -> Vec<HealingSuggestion> {
        rank(request)
    }

    fn name(&self) -> &str {
        "heuristic"
    }
}

/// Split an identifier into lowercase tokens on delimiters and camelCase.
fn ident_tokens(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;

    for c in text.chars() {
        if !c.is_ascii_alphanumeric() {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if c.is_ascii_uppercase() && prev_lower && !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
        prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
        current.push(c.to_ascii_lowercase());
    }
    if !current.is_empty() {
        tokens.push(current);
    }

    tokens
        .into_iter()
        .filter(|t| t.len() > 1 && !NOISE_TOKENS.contains(&t.as_str()))
        .collect()
}

fn is_css_ident(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '-')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Whether `selector` references `token` (such as `.qty` or `#amount`) as a whole name.
fn mentions(selector: &str, token: &str) -> bool {
    selector.match_indices(token).any(|(idx, _)| {
        selector[idx + token.len()..]
            .chars()
            .next()
            .map_or(true, |c| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
    })
}

/// Split `td.qty .value` into (`td.qty`, Some(`.value`)).
fn split_tail(selector: &str) -> (&str, Option<&str>) {
    match selector.trim().split_once(char::is_whitespace) {
        Some((head, tail)) => (head, Some(tail.trim())),
        None => (selector.trim(), None),
    }
}

/// Distinguishing selectors for one element, with the tokens they carry.
fn element_selectors(el: ElementRef<'_>) -> Vec<(String, String, Vec<String>)> {
    let tag = el.value().name();
    let mut out = Vec::new();
    if let Some(id) = el.value().id().filter(|id| is_css_ident(id)) {
        out.push((format!("#{id}"), format!("#{id}"), ident_tokens(id)));
    }
    for class in el.value().classes().filter(|c| is_css_ident(c)) {
        out.push((format!("{tag}.{class}"), format!(".{class}"), ident_tokens(class)));
    }
    out
}

fn nth_child(el: ElementRef<'_>) -> usize {
    el.prev_siblings()
        .filter(|n| n.value().is_element())
        .count()
        + 1
}

fn label_matches(text: &str, label: &str) -> bool {
    let text = clean_text(text).to_lowercase();
    let text = text.trim_end_matches(':').trim();
    let label = label.to_lowercase();
    !text.is_empty() && (text == label || (text.starts_with(&label) && text.len() <= label.len() + 3))
}

struct Scorer<'a> {
    field_tokens: BTreeSet<String>,
    failed_tokens: BTreeSet<String>,
    claimed: &'a [String],
    candidates: BTreeMap<String, u8>,
}

impl<'a> Scorer<'a> {
    fn overlap_score(&self, tokens: &[String]) -> u32 {
        let tokens: BTreeSet<&String> = tokens.iter().collect();
        let mut score = 0;
        if !self.field_tokens.is_empty() {
            let matched = self.field_tokens.iter().filter(|t| tokens.contains(t)).count();
            score += 50 * matched as u32 / self.field_tokens.len() as u32;
        }
        if self
            .failed_tokens
            .iter()
            .any(|t| !self.field_tokens.contains(t) && tokens.contains(t))
        {
            score += 15;
        }
        score
    }

    fn offer(&mut self, selector: String, distinguishing: &str, score: u32) {
        if score == 0 || Selector::parse(&selector).is_err() {
            return;
        }
        if self.claimed.iter().any(|s| *s == selector || mentions(s, distinguishing)) {
            return;
        }
        let score = score.min(100) as u8;
        let entry = self.candidates.entry(selector).or_insert(0);
        *entry = (*entry).max(score);
    }
}

fn rank(request: &SelectorHealingRequest) -> Vec<HealingSuggestion> {
    let document = Html::parse_document(&request.snapshot);
    let claimed = request.spec.other_selectors(&request.field);

    let field_name = request
        .field
        .strip_prefix("row.")
        .unwrap_or(&request.field)
        .trim_start_matches('@');
    let field_tokens: BTreeSet<String> = if request.field == ROWS_FIELD {
        BTreeSet::new()
    } else {
        ident_tokens(field_name).into_iter().collect()
    };
    let failed_tokens: BTreeSet<String> = ident_tokens(&request.failed_selector).into_iter().collect();

    let mut scorer = Scorer {
        field_tokens,
        failed_tokens,
        claimed: &claimed,
        candidates: BTreeMap::new(),
    };

    if request.field == ROWS_FIELD {
        rows_candidates(&document, &mut scorer);
    } else if request.field.starts_with("row.") {
        row_field_candidates(&document, request, &mut scorer);
    } else {
        page_field_candidates(&document, request, &mut scorer);
    }

    let mut ranked: Vec<(String, u8)> = scorer.candidates.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    ranked
        .iter()
        .enumerate()
        .map(|(i, (selector, score))| {
            let fallbacks = ranked
                .iter()
                .skip(i + 1)
                .take(MAX_FALLBACKS)
                .map(|(s, _)| s.clone())
                .collect();
            HealingSuggestion::new(selector.clone(), *score).with_fallbacks(fallbacks)
        })
        .collect()
}

fn page_field_candidates(document: &Html, request: &SelectorHealingRequest, scorer: &mut Scorer<'_>) {
    let all = Selector::parse("*").ok();
    let Some(all) = all else { return };
    let rule = request.spec.rule(&request.field);
    let multiple = rule.as_ref().map_or(false, |r| r.multiple);
    let attr = rule.and_then(|r| r.attr);

    // The element carries what the rule reads
    let has_value = |el: ElementRef<'_>| -> bool {
        match &attr {
            Some(attr) => el.value().attr(attr).map_or(false, |v| !v.trim().is_empty()),
            None => !clean_text(&el.text().collect::<String>()).is_empty(),
        }
    };

    let fits = |selector: &str| -> bool {
        Selector::parse(selector).map_or(false, |sel| {
            let count = document.select(&sel).count();
            if multiple {
                count >= 1
            } else {
                count == 1
            }
        })
    };

    for el in document.select(&all) {
        for (selector, distinguishing, tokens) in element_selectors(el) {
            let mut score = scorer.overlap_score(&tokens);
            if score > 0 {
                if fits(&selector) {
                    score += 20;
                }
                if has_value(el) {
                    score += 15;
                }
            }
            scorer.offer(selector, &distinguishing, score);
        }
    }

    if let Some(label) = request.label() {
        for el in document.select(&all) {
            let own_text: String = el
                .children()
                .filter_map(|n| n.value().as_text().map(|t| String::from(&**t)))
                .collect();
            if !label_matches(&own_text, &label) {
                continue;
            }
            let Some(next) = el.next_siblings().find_map(ElementRef::wrap) else {
                continue;
            };
            for (selector, distinguishing, _) in element_selectors(next) {
                let score = 35 + if fits(&selector) { 20 } else { 0 };
                scorer.offer(selector, &distinguishing, score);
            }
            if let Some(parent_id) = el
                .parent()
                .and_then(ElementRef::wrap)
                .and_then(|p| p.value().id().map(str::to_string))
                .filter(|id| is_css_ident(id))
            {
                let selector = format!(
                    "#{parent_id} > {}:nth-child({})",
                    next.value().name(),
                    nth_child(next)
                );
                let score = 35 + if fits(&selector) { 20 } else { 0 };
                scorer.offer(selector.clone(), &selector, score);
            }
        }
    }
}

fn rows_candidates(document: &Html, scorer: &mut Scorer<'_>) {
    let Ok(tables) = Selector::parse("table") else { return };
    let Ok(data_cell) = Selector::parse("td") else { return };

    for table in document.select(&tables) {
        let bases: Vec<(String, Vec<String>)> = match (table.value().id(), table.value().classes().next()) {
            (Some(id), _) if is_css_ident(id) => vec![(format!("#{id}"), ident_tokens(id))],
            (_, Some(class)) if is_css_ident(class) => {
                vec![(format!("table.{class}"), ident_tokens(class))]
            }
            _ => Vec::new(),
        };

        for (base, tokens) in bases {
            for suffix in ["tbody tr", "tr"] {
                let selector = format!("{base} {suffix}");
                let Ok(row_sel) = Selector::parse(&selector) else { continue };
                let data_rows = document
                    .select(&row_sel)
                    .filter(|row| row.select(&data_cell).next().is_some())
                    .count();
                if data_rows == 0 {
                    continue;
                }
                let mut score = 20 + scorer.overlap_score(&tokens);
                if suffix == "tbody tr" {
                    score += 5;
                }
                scorer.offer(selector, &base, score);
            }
        }
    }
}

fn row_field_candidates(document: &Html, request: &SelectorHealingRequest, scorer: &mut Scorer<'_>) {
    let Some(row_selector) = request.spec.selector(ROWS_FIELD) else { return };
    let Ok(row_sel) = Selector::parse(&row_selector) else { return };
    let Ok(all) = Selector::parse("*") else { return };
    let (_, tail) = split_tail(&request.failed_selector);

    let rows: Vec<ElementRef<'_>> = document.select(&row_sel).collect();
    if rows.is_empty() {
        return;
    }

    // Fraction of rows in which a candidate finds a value
    let coverage = |selector: &str| -> u32 {
        Selector::parse(selector).map_or(0, |sel| {
            let hits = rows
                .iter()
                .filter(|row| {
                    row.select(&sel)
                        .any(|el| !clean_text(&el.text().collect::<String>()).is_empty())
                })
                .count();
            (hits * 100 / rows.len()) as u32
        })
    };

    let mut seen = BTreeSet::new();
    for row in &rows {
        for el in row.select(&all) {
            for (selector, distinguishing, tokens) in element_selectors(el) {
                if !seen.insert(selector.clone()) {
                    continue;
                }
                let overlap = scorer.overlap_score(&tokens);
                if overlap == 0 {
                    continue;
                }
                let variants = match tail {
                    Some(tail) => vec![(format!("{selector} {tail}"), 5), (selector.clone(), 0)],
                    None => vec![(selector.clone(), 0)],
                };
                for (candidate, bonus) in variants {
                    let cover = coverage(&candidate);
                    if cover == 0 {
                        continue;
                    }
                    let score = overlap + if cover >= 50 { 20 } else { 0 } + bonus;
                    scorer.offer(candidate, &distinguishing, score);
                }
            }
        }
    }

    // Header column carrying the field label
    if let (Some(label), Ok(header)) = (request.label(), Selector::parse("th")) {
        if let Some(th) = document
            .select(&header)
            .find(|th| label_matches(&th.text().collect::<String>(), &label))
        {
            let position = nth_child(th);
            let base = format!("td:nth-child({position})");
            let variants = match tail {
                Some(tail) => vec![format!("{base} {tail}"), base.clone()],
                None => vec![base.clone()],
            };
            for candidate in variants {
                let cover = coverage(&candidate);
                if cover > 0 {
                    let score = 35 + if cover >= 50 { 20 } else { 0 };
                    scorer.offer(candidate.clone(), &candidate, score);
                }
            }
        }
    }
}
