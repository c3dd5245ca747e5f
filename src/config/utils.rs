//! Helpers for reading configuration values from the environment.

use std::fmt::Display;
use std::str::FromStr;

/// Read an environment variable, treating empty or whitespace-only values as unset.
pub(super) fn env_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Read and parse an environment variable.
///
/// Returns `Ok(None)` when the variable is unset, and an error naming the
/// variable when it is set to something that does not parse.
pub(super) fn parse_env<T>(key: &str) -> Result<Option<T>, Box<dyn std::error::Error>>
where
    T: FromStr,
    T::Err: Display,
{
    match env_var(key) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| format!("Invalid value for {key} ({raw}): {e}").into()),
        None => Ok(None),
    }
}
