//! Response normalization
//!
//! Converts each provider's raw JSON payload into the canonical [`FetchResult`].
//! Both entry points are total: malformed or unrecognized payloads produce an
//! empty result rather than an error, so callers never fail on upstream shape drift.
//!
//! [`FetchResult`]: crate::data::FetchResult

mod primary;
mod secondary;

pub use primary::normalize_primary;
pub use secondary::normalize_secondary;

use serde_json::Value;

/// Reads a string field, accepting numbers for id-like fields
fn str_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Returns the first of `keys` that holds a usable string
fn first_str_field(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| str_field(value, key))
}
