// Outcome normalization.
//
// Guesses and official answers are compared as trimmed strings. A missing
// value becomes the sentinel "0", which means "not entered".

/// Marker for a value that was never entered.
pub const SENTINEL: &str = "0";

/// Trim a raw value, defaulting to the sentinel when it is absent or blank.
///
/// No numeric coercion happens here: `"05"` and `"5"` stay distinct.
pub fn normalize(raw: Option<&str>) -> String {
    match raw.map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => SENTINEL.to_string(),
    }
}

/// True when a normalized value is the "not entered" sentinel.
pub fn is_unset(value: &str) -> bool {
    value == SENTINEL
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_whitespace() {
        assert_eq!(normalize(Some("  7 ")), "7");
    }

    #[test]
    fn absent_becomes_sentinel() {
        assert_eq!(normalize(None), SENTINEL);
    }

    #[test]
    fn blank_becomes_sentinel() {
        assert_eq!(normalize(Some("   ")), SENTINEL);
        assert_eq!(normalize(Some("")), SENTINEL);
    }

    #[test]
    fn leading_zeros_are_significant() {
        assert_eq!(normalize(Some("05")), "05");
        assert_ne!(normalize(Some("05")), normalize(Some("5")));
    }

    #[test]
    fn sentinel_detection() {
        assert!(is_unset(&normalize(None)));
        assert!(!is_unset("10"));
    }
}
