//! Helpers for reading startup configuration.
//!
//! Each crate owns the settings for its concern; these helpers give them
//! one way to parse a value and report it when it is unusable.

use std::str::FromStr;

use crate::error::ConfigError;

/// Parse `value`, read from the variable `name`.
pub fn parse_setting<T: FromStr>(
    name: &'static str,
    value: &str,
    expected: &'static str,
) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError {
        name,
        value: value.to_string(),
        expected,
    })
}

/// Read `name` from the process environment, falling back to `default`
/// when it is unset.
pub fn env_setting<T: FromStr>(
    name: &'static str,
    default: &str,
    expected: &'static str,
) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(value) => parse_setting(name, &value, expected),
        Err(_) => parse_setting(name, default, expected),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_trimmed_value() {
        let port: u16 = parse_setting("PORT", " 8080 ", "a valid u16").unwrap();
        assert_eq!(port, 8080);
    }

    #[test]
    fn unusable_value_names_the_variable() {
        let err = parse_setting::<u64>("JOB_TIMEOUT_SECS", "soon", "a valid u64").unwrap_err();
        assert_eq!(err.name, "JOB_TIMEOUT_SECS");
        assert_eq!(
            err.to_string(),
            "JOB_TIMEOUT_SECS must be a valid u64, got 'soon'"
        );
    }

    #[test]
    fn unset_variable_uses_default() {
        let value: u32 = env_setting("COMFY_SYNC_TEST_UNSET_SETTING", "42", "a valid u32").unwrap();
        assert_eq!(value, 42);
    }
}
