use chrono::{DateTime, Local, Utc};

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

/// Format an optional value, returning a default if None
pub fn format_optional<T: ToString>(value: Option<T>, default: &str) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| default.to_string())
}

/// Format a timestamp in local time, e.g. "Mar 04, 2024 08:30"
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format("%b %d, %Y %H:%M").to_string()
}

/// Format a weight reading with two decimals, trimming a trailing ".00"
pub fn format_weight(weight: f64) -> String {
    let formatted = format!("{:.2}", weight);
    formatted
        .strip_suffix(".00")
        .map(str::to_string)
        .unwrap_or(formatted)
}
