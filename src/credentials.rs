use crate::error::{Result, SpeakError};
use std::path::Path;

pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Picks the API key: explicit value, then `OPENAI_API_KEY`, then the key file.
pub fn resolve_api_key(explicit: Option<&str>, key_file: &Path) -> Result<String> {
    let env_value = std::env::var(API_KEY_ENV).ok();
    resolve_from(explicit, env_value.as_deref(), key_file)
}

pub fn resolve_from(explicit: Option<&str>, env_value: Option<&str>, key_file: &Path) -> Result<String> {
    if let Some(key) = non_empty(explicit) {
        tracing::debug!("Using API key from the command line");
        return Ok(key);
    }
    if let Some(key) = non_empty(env_value) {
        tracing::debug!("Using API key from {}", API_KEY_ENV);
        return Ok(key);
    }
    match std::fs::read_to_string(key_file) {
        Ok(content) => non_empty(Some(content.as_str())).ok_or_else(|| {
            SpeakError::Credentials(format!("key file {} is empty", key_file.display()))
        }),
        Err(_) => Err(SpeakError::Credentials(format!(
            "pass --api-key, set {} or write the key to {}",
            API_KEY_ENV,
            key_file.display()
        ))),
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
