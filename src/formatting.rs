const NOT_AVAILABLE: &str = "N/A";
const MAGNITUDE_SUFFIXES: [&str; 5] = ["", "K", "M", "B", "T"];

/// Formats a large currency amount with a thousands suffix, e.g. `$2.9T`.
pub fn format_magnitude(value: Option<f64>) -> String {
    let Some(mut value) = value.filter(|v| v.is_finite()) else {
        return NOT_AVAILABLE.to_string();
    };
    let mut suffix_index = 0;
    while value >= 1000.0 && suffix_index < MAGNITUDE_SUFFIXES.len() - 1 {
        value /= 1000.0;
        suffix_index += 1;
    }
    format!("${:.1}{}", value, MAGNITUDE_SUFFIXES[suffix_index])
}

pub fn format_currency(value: Option<f64>) -> String {
    match value.filter(|v| v.is_finite()) {
        Some(value) => format!("${:.2}", value),
        None => NOT_AVAILABLE.to_string(),
    }
}

pub fn format_decimal(value: Option<f64>) -> String {
    match value.filter(|v| v.is_finite()) {
        Some(value) => format!("{:.2}", value),
        None => NOT_AVAILABLE.to_string(),
    }
}

/// Renders a fraction as a percentage (`0.0123` -> `1.23%`).
pub fn format_percent(value: Option<f64>) -> String {
    match value.filter(|v| v.is_finite()) {
        Some(value) => format!("{:.2}%", value * 100.0),
        None => NOT_AVAILABLE.to_string(),
    }
}

pub fn format_count(value: Option<i64>) -> String {
    value
        .map(|count| count.to_string())
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

pub fn format_text(value: Option<&str>) -> String {
    value
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .unwrap_or(NOT_AVAILABLE)
        .to_string()
}

pub fn capitalize(value: Option<&str>) -> String {
    let Some(text) = value.map(str::trim).filter(|text| !text.is_empty()) else {
        return NOT_AVAILABLE.to_string();
    };
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => NOT_AVAILABLE.to_string(),
    }
}

pub fn format_optional_number(value: Option<f64>) -> String {
    match value.filter(|v| v.is_finite()) {
        Some(value) if value.fract() == 0.0 => format!("{:.1}", value),
        Some(value) => value.to_string(),
        None => NOT_AVAILABLE.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magnitude_picks_suffix() {
        assert_eq!(format_magnitude(Some(999.0)), "$999.0");
        assert_eq!(format_magnitude(Some(1_000.0)), "$1.0K");
        assert_eq!(format_magnitude(Some(1_240_000.0)), "$1.2M");
        assert_eq!(format_magnitude(Some(2_940_000_000_000.0)), "$2.9T");
        assert_eq!(format_magnitude(Some(45_600_000_000.0)), "$45.6B");
    }

    #[test]
    fn magnitude_stops_at_trillions() {
        assert_eq!(format_magnitude(Some(5_000_000_000_000_000.0)), "$5000.0T");
    }

    #[test]
    fn magnitude_handles_missing_and_small_values() {
        assert_eq!(format_magnitude(None), "N/A");
        assert_eq!(format_magnitude(Some(f64::NAN)), "N/A");
        assert_eq!(format_magnitude(Some(0.0)), "$0.0");
        assert_eq!(format_magnitude(Some(-2_000.0)), "$-2000.0");
    }

    #[test]
    fn cell_formatters_fall_back_to_not_available() {
        assert_eq!(format_currency(Some(412.5)), "$412.50");
        assert_eq!(format_currency(None), "N/A");
        assert_eq!(format_decimal(Some(31.456)), "31.46");
        assert_eq!(format_percent(Some(0.0075)), "0.75%");
        assert_eq!(format_percent(None), "N/A");
        assert_eq!(format_count(Some(221_000)), "221000");
        assert_eq!(format_count(None), "N/A");
        assert_eq!(format_text(Some("  ")), "N/A");
        assert_eq!(format_optional_number(Some(6.0)), "6.0");
        assert_eq!(format_optional_number(Some(0.25)), "0.25");
    }

    #[test]
    fn capitalize_matches_recommendation_labels() {
        assert_eq!(capitalize(Some("buy")), "Buy");
        assert_eq!(capitalize(Some("STRONG_BUY")), "Strong_buy");
        assert_eq!(capitalize(None), "N/A");
    }
}
