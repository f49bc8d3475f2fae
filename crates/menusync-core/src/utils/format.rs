/// Format a price for display with two decimals.
pub fn format_price(amount: f64) -> String {
    if amount.is_finite() {
        format!("{:.2}", amount)
    } else {
        "0.00".to_string()
    }
}

/// Truncate a string to a maximum length, adding ellipsis if needed
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}

/// Render an estimated-time range ("30-40") as "30-40 min".
/// Single values and free text are passed through with the unit appended
/// only when the text is purely numeric.
pub fn format_minutes_range(range: &str) -> String {
    let trimmed = range.trim();
    let numeric = !trimmed.is_empty()
        && trimmed
            .chars()
            .all(|c| c.is_ascii_digit() || c == '-' || c.is_whitespace());
    if numeric {
        format!("{} min", trimmed.replace(' ', ""))
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_price() {
        assert_eq!(format_price(20.0), "20.00");
        assert_eq!(format_price(3.456), "3.46");
        assert_eq!(format_price(f64::NAN), "0.00");
    }

    #[test]
    fn test_truncate_string() {
        assert_eq!(truncate_string("Hello", 10), "Hello");
        assert_eq!(truncate_string("Hello World", 8), "Hello...");
        assert_eq!(truncate_string("Hi", 2), "Hi");
    }

    #[test]
    fn test_format_minutes_range() {
        assert_eq!(format_minutes_range("30-40"), "30-40 min");
        assert_eq!(format_minutes_range(" 25 "), "25 min");
        assert_eq!(format_minutes_range("about half an hour"), "about half an hour");
    }
}
