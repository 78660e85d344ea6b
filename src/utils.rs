// src/utils.rs
// Shared helpers: log previews and numeric formatting

/// Truncate a string to at most `max_chars` characters with ellipsis.
///
/// Counts characters rather than bytes so multi-byte text never splits
/// inside a code point.
pub fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

/// Round to two decimal places, leaving whole numbers untouched.
pub fn round_cents(value: f64) -> f64 {
    if value.fract() == 0.0 {
        value
    } else {
        (value * 100.0).round() / 100.0
    }
}

/// Render a number the way it is written back into a document.
///
/// Whole numbers print without a fractional part and negative zero
/// collapses to `0`.
pub fn format_number(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    format!("{}", value)
}
