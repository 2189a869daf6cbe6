//! Environment variable helpers
//!
//! Typed lookups with defaults, used for the `LOADSINK_*` configuration
//! and logging overrides.

use std::str::FromStr;

/// Parse an environment variable as `T`, falling back to `default` when
/// the variable is unset or unparseable.
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Boolean lookup. "1", "true", "yes" and "on" (case-insensitive) count
/// as true; anything else, including unset, yields the default.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => matches!(
            v.to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => default,
    }
}
