use crate::config_loader::Settings;
use crate::error::{Result, SpeakError};
use std::path::PathBuf;

pub const MIN_SPEED: f32 = 0.25;
pub const MAX_SPEED: f32 = 4.0;

/// Sentinel accepted wherever an output path is given.
pub const AUTO_OUTPUT: &str = "AUTO";

/// Voices the speech endpoint accepts.
pub const VOICES: &[&str] = &[
    "alloy", "ash", "ballad", "coral", "echo", "fable", "onyx", "nova", "sage", "shimmer",
    "verse",
];

pub fn is_known_voice(voice: &str) -> bool {
    VOICES.contains(&voice)
}

/// Where the synthesized audio should land.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputTarget {
    /// Derive the path from the cache key
    Auto,
    Path(PathBuf),
}

impl OutputTarget {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed == AUTO_OUTPUT {
            OutputTarget::Auto
        } else {
            OutputTarget::Path(PathBuf::from(trimmed))
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpeechRequest {
    pub text: String,
    pub voice: String,
    pub speed: f32,
    pub model: String,
    pub output: OutputTarget,
    pub max_retries: u32,
    pub timeout_secs: u64,
}

impl SpeechRequest {
    /// A request for `text` carrying the configured defaults.
    pub fn from_settings(text: impl Into<String>, settings: &Settings) -> Self {
        Self {
            text: text.into(),
            voice: settings.voice.clone(),
            speed: settings.speed,
            model: settings.model.clone(),
            output: OutputTarget::Auto,
            max_retries: settings.max_retries,
            timeout_secs: settings.timeout_secs,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.text.trim().is_empty() {
            return Err(SpeakError::Parameter("text must not be empty".to_string()));
        }
        if !is_known_voice(&self.voice) {
            return Err(SpeakError::Parameter(format!(
                "unknown voice '{}' (expected one of: {})",
                self.voice,
                VOICES.join(", ")
            )));
        }
        if !self.speed.is_finite() || !(MIN_SPEED..=MAX_SPEED).contains(&self.speed) {
            return Err(SpeakError::Parameter(format!(
                "speed {} is outside {}..={}",
                self.speed, MIN_SPEED, MAX_SPEED
            )));
        }
        if self.model.trim().is_empty() {
            return Err(SpeakError::Parameter("model must not be empty".to_string()));
        }
        if self.timeout_secs == 0 {
            return Err(SpeakError::Parameter(
                "timeout must be at least one second".to_string(),
            ));
        }
        Ok(())
    }
}
