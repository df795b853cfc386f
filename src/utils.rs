use crate::error::{FeasibilityError, Result};
use crate::schema::MonthlyRecord;
use chrono::{Datelike, Days, NaiveDate, NaiveDateTime};
use serde_json::Value;

/// Portuguese month abbreviations accepted in `Mon/YY` period cells.
pub const PT_MONTH_ABBREVIATIONS: [&str; 12] = [
    "jan", "fev", "mar", "abr", "mai", "jun", "jul", "ago", "set", "out", "nov", "dez",
];

const GENERIC_DATE_FORMATS: [&str; 7] = [
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d %B %Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%d %b %Y",
];

const GENERIC_DATETIME_FORMATS: [&str; 3] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
];

// Largest serial a spreadsheet will hold (9999-12-31).
const MAX_SPREADSHEET_SERIAL: f64 = 2_958_465.0;

pub fn format_period(date: NaiveDate) -> String {
    format!("{:04}-{:02}", date.year(), date.month())
}

/// True for strings already in the canonical `YYYY-MM` shape with a month
/// between 01 and 12.
pub fn is_canonical_period(value: &str) -> bool {
    let bytes = value.as_bytes();
    bytes.len() == 7
        && bytes[..4].iter().all(u8::is_ascii_digit)
        && bytes[4] == b'-'
        && value[5..]
            .parse::<u32>()
            .is_ok_and(|month| (1..=12).contains(&month))
}

/// Normalizes a period cell to `YYYY-MM`.
///
/// Accepts the canonical form (returned unchanged), `Mon/YY` with Portuguese
/// month abbreviations, and generic calendar dates. Anything else is returned
/// trimmed but otherwise untouched so callers can flag it.
pub fn normalize_period_string(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() || is_canonical_period(trimmed) {
        return trimmed.to_string();
    }

    if let Some(period) = parse_abbreviated_period(trimmed) {
        return period;
    }

    match parse_calendar_date(trimmed) {
        Some(date) => format_period(date),
        None => trimmed.to_string(),
    }
}

/// Same as [`normalize_period_string`] for a raw cell, with numeric cells read as
/// spreadsheet serial dates.
pub fn normalize_period_value(value: &Value) -> String {
    match value {
        Value::String(s) => normalize_period_string(s),
        Value::Number(n) => match n.as_f64().and_then(serial_to_date) {
            Some(date) => format_period(date),
            None => n.to_string(),
        },
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn parse_abbreviated_period(value: &str) -> Option<String> {
    let (month, year) = value.split_once('/')?;
    if month.len() != 3
        || !month.chars().all(|c| c.is_ascii_alphabetic())
        || year.len() != 2
        || !year.chars().all(|c| c.is_ascii_digit())
    {
        return None;
    }

    let month = month.to_lowercase();
    let index = PT_MONTH_ABBREVIATIONS.iter().position(|m| *m == month)?;
    Some(format!("20{}-{:02}", year, index + 1))
}

/// Parses the date shapes spreadsheets commonly hand over as text.
pub fn parse_calendar_date(value: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();

    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.date_naive());
    }

    for format in GENERIC_DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(dt.date());
        }
    }

    GENERIC_DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(trimmed, format).ok())
}

/// Converts a spreadsheet serial day number (1900 date system) to a date.
pub fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 || serial > MAX_SPREADSHEET_SERIAL {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_days(Days::new(serial.floor() as u64))
}

pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Coerces a raw cell into a number. Blank cells and non-numeric content both
/// yield `None`; callers that need to tell them apart check [`is_blank`] first.
pub fn normalize_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let cleaned = s.trim().replace(',', ".");
            if cleaned.is_empty() {
                return None;
            }
            cleaned.parse::<f64>().ok()?
        }
        _ => return None,
    };

    number.is_finite().then_some(number)
}

/// First day of a canonical `YYYY-MM` period.
pub fn parse_period(period: &str) -> Result<NaiveDate> {
    let trimmed = period.trim();
    if !is_canonical_period(trimmed) {
        return Err(FeasibilityError::InvalidPeriod(period.to_string()));
    }
    NaiveDate::parse_from_str(&format!("{}-01", trimmed), "%Y-%m-%d")
        .map_err(|_| FeasibilityError::InvalidPeriod(period.to_string()))
}

/// Borrowed view of the records in ascending period order. The sort is stable,
/// so records sharing a period keep their input order.
pub fn sort_by_period(records: &[MonthlyRecord]) -> Vec<&MonthlyRecord> {
    let mut sorted: Vec<&MonthlyRecord> = records.iter().collect();
    sorted.sort_by(|a, b| a.period.cmp(&b.period));
    sorted
}

/// `numerator / denominator × 100`, or 0 when the denominator is zero.
pub fn ratio_pct(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator * 100.0
    }
}

/// Percentage change from `previous` to `current`; 0 when there is no usable base.
pub fn percent_change(current: f64, previous: f64) -> f64 {
    if previous == 0.0 || !previous.is_finite() {
        0.0
    } else {
        (current - previous) / previous.abs() * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_period_is_idempotent() {
        for period in ["2025-01", "1999-12", "2030-07"] {
            let once = normalize_period_string(period);
            assert_eq!(once, period);
            assert_eq!(normalize_period_string(&once), once);
        }
    }

    #[test]
    fn test_abbreviated_portuguese_months() {
        assert_eq!(normalize_period_string("Jan/25"), "2025-01");
        assert_eq!(normalize_period_string("fev/24"), "2024-02");
        assert_eq!(normalize_period_string("DEZ/23"), "2023-12");
        assert_eq!(normalize_period_string("Set/25"), "2025-09");
    }

    #[test]
    fn test_generic_dates() {
        assert_eq!(normalize_period_string("2025-03-15"), "2025-03");
        assert_eq!(normalize_period_string("2024/11/02"), "2024-11");
        assert_eq!(normalize_period_string("2025-01-31T10:00:00Z"), "2025-01");
        assert_eq!(normalize_period_string("March 15, 2024"), "2024-03");
    }

    #[test]
    fn test_unparseable_period_passes_through() {
        assert_eq!(normalize_period_string("someday"), "someday");
        assert_eq!(normalize_period_string("Xyz/25"), "Xyz/25");
        assert_eq!(normalize_period_string("  "), "");
    }

    #[test]
    fn test_serial_dates() {
        // 45658 is 2025-01-01 in the 1900 date system
        assert_eq!(normalize_period_value(&json!(45658)), "2025-01");
        assert_eq!(normalize_period_value(&json!("Abr/25")), "2025-04");
        assert_eq!(normalize_period_value(&json!(null)), "");
    }

    #[test]
    fn test_normalize_number() {
        assert_eq!(normalize_number(&json!("1234,5")), Some(1234.5));
        assert_eq!(normalize_number(&json!(" 42 ")), Some(42.0));
        assert_eq!(normalize_number(&json!(-7.25)), Some(-7.25));
        assert_eq!(normalize_number(&json!("0")), Some(0.0));
        assert_eq!(normalize_number(&json!("")), None);
        assert_eq!(normalize_number(&json!(null)), None);
        assert_eq!(normalize_number(&json!("abc")), None);
        assert_eq!(normalize_number(&json!("NaN")), None);
        assert_eq!(normalize_number(&json!(true)), None);
    }

    #[test]
    fn test_canonical_period_requires_real_month() {
        assert!(is_canonical_period("2025-01"));
        assert!(is_canonical_period("2025-12"));
        assert!(!is_canonical_period("2025-00"));
        assert!(!is_canonical_period("2025-13"));
        assert!(!is_canonical_period("2025-1a"));
        assert!(!is_canonical_period("2025/01"));
        assert_eq!(normalize_period_string("2025-13"), "2025-13");
    }

    #[test]
    fn test_parse_period() {
        assert_eq!(
            parse_period("2023-02").unwrap(),
            NaiveDate::from_ymd_opt(2023, 2, 1).unwrap()
        );
        assert!(parse_period("2023-13").is_err());
        assert!(parse_period("2023-01:2023-03").is_err());
        assert!(parse_period("Jan/25").is_err());
    }

    #[test]
    fn test_percent_change_and_ratio() {
        assert_eq!(percent_change(110.0, 100.0), 10.0);
        assert_eq!(percent_change(-50.0, -100.0), 50.0);
        assert_eq!(percent_change(10.0, 0.0), 0.0);
        assert_eq!(ratio_pct(30.0, 100.0), 30.0);
        assert_eq!(ratio_pct(30.0, 0.0), 0.0);
    }
}
