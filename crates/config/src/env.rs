//! Environment variable helpers

use std::env;
use std::time::Duration;

use crate::{ConfigError, Result};

/// String value, falling back to `default` when unset or empty
pub fn env_str(key: &str, default: &str) -> String {
    match env::var(key) {
        Ok(value) if !value.is_empty() => value,
        _ => default.to_owned(),
    }
}

/// Port-sized integer value
pub fn env_u16(key: &str, default: u16) -> Result<u16> {
    parse_env(key, default, |raw| raw.parse().ok())
}

/// Size value
pub fn env_usize(key: &str, default: usize) -> Result<usize> {
    parse_env(key, default, |raw| raw.parse().ok())
}

/// Boolean value: accepts `true`/`false`/`1`/`0`
pub fn env_bool(key: &str, default: bool) -> Result<bool> {
    parse_env(key, default, |raw| match raw {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    })
}

/// Duration value in humantime syntax (`100ms`, `1s`, `24h`)
pub fn env_duration(key: &str, default: Duration) -> Result<Duration> {
    parse_env(key, default, |raw| humantime::parse_duration(raw).ok())
}

fn parse_env<T>(key: &str, default: T, parse: impl Fn(&str) -> Option<T>) -> Result<T> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => {
            parse(&value).ok_or_else(|| ConfigError::Invalid {
                key: key.to_owned(),
                value,
            })
        }
        _ => Ok(default),
    }
}
