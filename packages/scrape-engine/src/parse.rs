//! Locale-tolerant value parsing for scraped text.

use chrono::NaiveDate;

const DATE_FORMATS: &[&str] = &[
    "%Y/%m/%d", "%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%Y%m%d", "%d %b %Y", "%d %B %Y", "%b %d, %Y",
];

fn strip_noise(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{a0}' && *c != '%' && *c != '\'' && *c != '+')
        .collect()
}

/// Parse a locale-formatted number (`1,234,567`, `1 234 567`, `1.234.567,5`, `12.5%`).
pub fn parse_number(text: &str) -> Option<f64> {
    let s = strip_noise(text);
    if s.is_empty() {
        return None;
    }

    let commas = s.matches(',').count();
    let dots = s.matches('.').count();

    let normalized = match (commas, dots) {
        (0, 0) => s,
        (_, 0) => {
            let tail = s.rsplit(',').next().unwrap_or_default();
            if commas > 1 || tail.len() == 3 {
                s.replace(',', "")
            } else {
                s.replace(',', ".")
            }
        }
        (0, _) if dots > 1 => s.replace('.', ""),
        (0, _) => s,
        _ => {
            // Both present: the last one is the decimal separator
            let last_comma = s.rfind(',').unwrap_or(0);
            let last_dot = s.rfind('.').unwrap_or(0);
            if last_comma > last_dot {
                s.replace('.', "").replace(',', ".")
            } else {
                s.replace(',', "")
            }
        }
    };

    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse a non-negative whole quantity such as a share count.
///
/// Any of `,` `.` or spaces is accepted as a thousands separator when every
/// group after the first has three digits.
pub fn parse_quantity(text: &str) -> Option<u64> {
    let s = strip_noise(text);
    if s.is_empty() {
        return None;
    }

    let groups: Vec<&str> = s.split([',', '.']).collect();
    let grouped = groups.len() > 1
        && !groups[0].is_empty()
        && groups[0].len() <= 3
        && groups[1..].iter().all(|g| g.len() == 3);
    if grouped && groups.iter().all(|g| g.chars().all(|c| c.is_ascii_digit())) {
        return groups.concat().parse().ok();
    }

    let value = parse_number(&s)?;
    (value >= 0.0 && value.fract() == 0.0 && value <= u64::MAX as f64).then_some(value as u64)
}

/// Parse the date formats used by the supported portals.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let trimmed = text.trim();
    let candidates = [trimmed, trimmed.split_whitespace().next().unwrap_or_default()];

    candidates.iter().find_map(|candidate| {
        DATE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(candidate, fmt).ok())
    })
}

/// Collapse runs of whitespace.
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quantity_locales() {
        assert_eq!(parse_quantity("1,234,567"), Some(1_234_567));
        assert_eq!(parse_quantity("1 234 567"), Some(1_234_567));
        assert_eq!(parse_quantity("1.234.567"), Some(1_234_567));
        assert_eq!(parse_quantity("1\u{a0}234"), Some(1_234));
        assert_eq!(parse_quantity("42"), Some(42));
        assert_eq!(parse_quantity("12.5"), None);
        assert_eq!(parse_quantity("-3"), None);
        assert_eq!(parse_quantity("n/a"), None);
    }

    #[test]
    fn test_parse_number_decimal_separators() {
        assert_eq!(parse_number("12.50%"), Some(12.5));
        assert_eq!(parse_number("1,234.5"), Some(1234.5));
        assert_eq!(parse_number("1.234,5"), Some(1234.5));
        assert_eq!(parse_number("3,5"), Some(3.5));
        assert_eq!(parse_number(""), None);
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 1);
        assert_eq!(parse_date("2024/03/01"), expected);
        assert_eq!(parse_date("01/03/2024"), expected);
        assert_eq!(parse_date("2024-03-01"), expected);
        assert_eq!(parse_date("01/03/2024 16:30"), expected);
        assert_eq!(parse_date("1 Mar 2024"), expected);
        assert_eq!(parse_date("soon"), None);
    }
}
