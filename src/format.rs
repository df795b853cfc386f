//! Brazilian Portuguese display formatting for dashboard values.

pub const MISSING: &str = "N/A";

/// `R$ 1.234.567`, rounded to whole reais.
pub fn format_currency(value: Option<f64>) -> String {
    match value.filter(|v| v.is_finite()) {
        Some(v) => {
            let sign = if v.round() < 0.0 { "-" } else { "" };
            format!("{}R$ {}", sign, localize(v.abs(), 0, false))
        }
        None => MISSING.to_string(),
    }
}

/// `12,3%`; the input is already a percentage.
pub fn format_percentage(value: Option<f64>) -> String {
    match value.filter(|v| v.is_finite()) {
        Some(v) => format!("{}{}%", sign_of(v, 1), localize(v.abs(), 1, false)),
        None => MISSING.to_string(),
    }
}

/// Grouped number with up to three decimals, trailing zeros dropped.
pub fn format_number(value: Option<f64>) -> String {
    match value.filter(|v| v.is_finite()) {
        Some(v) => format!("{}{}", sign_of(v, 3), localize(v.abs(), 3, true)),
        None => MISSING.to_string(),
    }
}

fn sign_of(value: f64, decimals: usize) -> &'static str {
    let scale = 10f64.powi(decimals as i32);
    if (value * scale).round() < 0.0 {
        "-"
    } else {
        ""
    }
}

// `value` must be non-negative.
fn localize(value: f64, decimals: usize, trim: bool) -> String {
    let fixed = format!("{:.*}", decimals, value);
    let (integer, fraction) = match fixed.split_once('.') {
        Some((i, f)) => (i, f),
        None => (fixed.as_str(), ""),
    };

    let mut grouped = String::with_capacity(integer.len() + integer.len() / 3);
    for (i, digit) in integer.chars().enumerate() {
        if i > 0 && (integer.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(digit);
    }

    let fraction = if trim {
        fraction.trim_end_matches('0')
    } else {
        fraction
    };

    if fraction.is_empty() {
        grouped
    } else {
        format!("{},{}", grouped, fraction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_currency() {
        assert_eq!(format_currency(Some(1_234_567.4)), "R$ 1.234.567");
        assert_eq!(format_currency(Some(999.6)), "R$ 1.000");
        assert_eq!(format_currency(Some(-2500.0)), "-R$ 2.500");
        assert_eq!(format_currency(Some(0.0)), "R$ 0");
        assert_eq!(format_currency(None), "N/A");
    }

    #[test]
    fn test_format_percentage() {
        assert_eq!(format_percentage(Some(12.34)), "12,3%");
        assert_eq!(format_percentage(Some(100.0)), "100,0%");
        assert_eq!(format_percentage(Some(-3.26)), "-3,3%");
        assert_eq!(format_percentage(Some(f64::NAN)), "N/A");
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(Some(1234.5)), "1.234,5");
        assert_eq!(format_number(Some(42.0)), "42");
        assert_eq!(format_number(Some(0.12345)), "0,123");
        assert_eq!(format_number(Some(-1_000_000.0)), "-1.000.000");
        assert_eq!(format_number(None), "N/A");
    }
}
