//! Shared utility functions used across multiple modules.

use chrono::{SecondsFormat, Utc};

/// Timestamp used when a remote document carries no `created_at`.
pub const EPOCH_TIMESTAMP: &str = "1970-01-01T00:00:00.000Z";

/// Normalize optional text by trimming whitespace and removing empties.
///
/// Returns `None` when the input is `None` or the trimmed value is empty.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Check if a string starts with `http://` or `https://`.
pub fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// Truncate text to at most 180 characters for error messages.
pub fn compact_text(value: &str) -> String {
    value.trim().chars().take(180).collect()
}

/// Current UTC time as an ISO-8601 string with microsecond precision.
///
/// Record `updated_at` values double as the version checked when a push is
/// confirmed.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Today's local date as `YYYY-MM-DD`.
pub fn today() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}

/// Generate a new record identifier.
///
/// UUID v7 keeps ids sortable by creation time while the random tail keeps
/// ids from different devices apart.
pub fn generate_id() -> String {
    uuid::Uuid::now_v7().to_string()
}
