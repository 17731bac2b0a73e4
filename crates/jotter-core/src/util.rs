//! Small text and clock helpers.

/// Longest error excerpt carried into a `RemoteError`
const ERROR_SNIPPET_CHARS: usize = 180;

/// Trimmed text, or `None` when nothing but whitespace is left
pub fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn has_http_scheme(value: &str) -> bool {
    ["http://", "https://"]
        .iter()
        .any(|scheme| value.starts_with(scheme))
}

/// Server error bodies can be whole HTML pages; keep the head of it.
pub fn error_snippet(value: &str) -> String {
    value.trim().chars().take(ERROR_SNIPPET_CHARS).collect()
}

/// Wall-clock time as Unix milliseconds, the unit of every stored timestamp
pub fn unix_millis_now() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
