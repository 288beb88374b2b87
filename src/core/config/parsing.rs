use std::env;

use super::types::{ConfigError, Environment};

pub(super) fn env_optional(key: &str) -> Option<String> {
    env::var(key).ok().map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

pub(super) fn env_or_default(key: &str, default: &str) -> String {
    env_optional(key).unwrap_or_else(|| default.to_string())
}

pub(super) fn parse_u32(field: &'static str, value: String) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidValue { field, value })
}

pub(super) fn parse_u64(field: &'static str, value: String) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidValue { field, value })
}

/// Accepts either a 0-100 percentage or a 0-1 fraction (the backend stores the latter).
pub(super) fn parse_percentage(field: &'static str, value: String) -> Result<u8, ConfigError> {
    if let Ok(whole) = value.parse::<u32>() {
        return u8::try_from(whole)
            .ok()
            .filter(|parsed| *parsed <= 100)
            .ok_or(ConfigError::InvalidValue { field, value });
    }

    let fraction =
        value.parse::<f64>().map_err(|_| ConfigError::InvalidValue { field, value: value.clone() })?;
    if !(0.0..=1.0).contains(&fraction) {
        return Err(ConfigError::InvalidValue { field, value });
    }

    Ok((fraction * 100.0).round() as u8)
}

pub(super) fn parse_string_list(value: Option<String>, defaults: &[&str]) -> Vec<String> {
    match value {
        Some(raw) => raw
            .split(',')
            .map(|item| item.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|item| !item.is_empty())
            .collect(),
        None => defaults.iter().map(|item| item.to_string()).collect(),
    }
}

pub(super) fn parse_bool(value: &str) -> bool {
    matches!(value, "1" | "true" | "TRUE" | "yes" | "YES" | "on" | "ON")
}

pub(super) fn parse_environment(value: Option<String>) -> Environment {
    match value.as_deref().map(|item| item.to_lowercase()) {
        Some(ref val) if val == "production" || val == "prod" => Environment::Production,
        Some(ref val) if val == "staging" => Environment::Staging,
        Some(ref val) if val == "test" || val == "testing" => Environment::Test,
        _ => Environment::Development,
    }
}

pub(super) fn is_supported_audio_format(format: &str) -> bool {
    matches!(format, "wav" | "webm" | "ogg" | "mp3" | "m4a" | "mp4" | "mpeg")
}
