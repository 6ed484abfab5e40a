use crate::backends::PlayerChoice;
use crate::request::{is_known_voice, MAX_SPEED, MIN_SPEED};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/audio/speech";

/// Process-wide settings, loaded once and handed to each component.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub voice: String,
    pub speed: f32,
    pub model: String,
    pub max_retries: u32,
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    // Fixed delay between retries when the transport retries on its own
    pub retry_delay_secs: u64,
    // First backoff step of the client-side retry loop
    pub backoff_base_secs: u64,
    pub native_retry: bool,
    pub player: PlayerChoice,
    pub endpoint: String,
    pub cache_dir: String,
    pub cache_prefix: String,
    // Play audio locally even when running as the MCP control plane
    pub mcp_playback: bool,
    pub api_key_file: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            voice: "onyx".to_string(),
            speed: 1.0,
            model: "tts-1".to_string(),
            max_retries: 3,
            timeout_secs: 30,
            connect_timeout_secs: 10,
            retry_delay_secs: 1,
            backoff_base_secs: 1,
            native_retry: true,
            player: PlayerChoice::Auto,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            cache_dir: std::env::temp_dir().to_string_lossy().into_owned(),
            cache_prefix: "speakd_".to_string(),
            mcp_playback: false,
            api_key_file: dirs::config_dir()
                .map(|d| d.join("speakd").join("api_key"))
                .unwrap_or_else(|| PathBuf::from(".speakd_api_key"))
                .to_string_lossy()
                .into_owned(),
        }
    }
}

impl Settings {
    /// Defaults, then `Speakd.*` in the working directory, then the user
    /// config directory, then `SPEAKD_*` environment variables.
    pub fn new() -> Result<Self, ConfigError> {
        let mut builder = Self::builder()?.add_source(File::with_name("Speakd").required(false));

        if let Some(dir) = dirs::config_dir() {
            let user_file = dir.join("speakd").join("Speakd");
            builder = builder.add_source(
                File::with_name(&user_file.to_string_lossy()).required(false),
            );
        }

        let builder = builder.add_source(Environment::with_prefix("SPEAKD").try_parsing(true));
        Self::from_builder(builder)
    }

    /// A builder seeded with every default, for callers layering their own sources.
    pub fn builder() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        let d = Settings::default();
        Config::builder()
            .set_default("voice", d.voice)?
            .set_default("speed", d.speed as f64)?
            .set_default("model", d.model)?
            .set_default("max_retries", d.max_retries as i64)?
            .set_default("timeout_secs", d.timeout_secs as i64)?
            .set_default("connect_timeout_secs", d.connect_timeout_secs as i64)?
            .set_default("retry_delay_secs", d.retry_delay_secs as i64)?
            .set_default("backoff_base_secs", d.backoff_base_secs as i64)?
            .set_default("native_retry", d.native_retry)?
            .set_default("player", "auto")?
            .set_default("endpoint", d.endpoint)?
            .set_default("cache_dir", d.cache_dir)?
            .set_default("cache_prefix", d.cache_prefix)?
            .set_default("mcp_playback", d.mcp_playback)?
            .set_default("api_key_file", d.api_key_file)
    }

    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_SPEED..=MAX_SPEED).contains(&self.speed) {
            return Err(ConfigError::Message(format!(
                "Invalid speed: {}. Must be between {} and {}",
                self.speed, MIN_SPEED, MAX_SPEED
            )));
        }
        if !is_known_voice(&self.voice) {
            return Err(ConfigError::Message(format!("Unknown voice: {}", self.voice)));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Message(
                "timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::Message("model must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn cache_dir(&self) -> PathBuf {
        PathBuf::from(&self.cache_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_load() {
        let settings = Settings::from_builder(Settings::builder().unwrap()).unwrap();
        assert_eq!(settings.voice, "onyx");
        assert_eq!(settings.model, "tts-1");
        assert_eq!(settings.max_retries, 3);
        assert_eq!(settings.timeout_secs, 30);
        assert_eq!(settings.player, PlayerChoice::Auto);
        assert!(settings.native_retry);
        assert!(!settings.mcp_playback);
    }

    #[test]
    fn test_overrides_apply() {
        let builder = Settings::builder()
            .unwrap()
            .set_override("voice", "nova")
            .unwrap()
            .set_override("speed", 1.5)
            .unwrap()
            .set_override("player", "ffplay")
            .unwrap();
        let settings = Settings::from_builder(builder).unwrap();
        assert_eq!(settings.voice, "nova");
        assert!((settings.speed - 1.5).abs() < f32::EPSILON);
        assert_eq!(settings.player, PlayerChoice::Ffplay);
    }

    #[test]
    fn test_rejects_out_of_range_speed() {
        let builder = Settings::builder()
            .unwrap()
            .set_override("speed", 9.0)
            .unwrap();
        assert!(Settings::from_builder(builder).is_err());
    }

    #[test]
    fn test_rejects_unknown_voice() {
        let builder = Settings::builder()
            .unwrap()
            .set_override("voice", "gravel")
            .unwrap();
        assert!(Settings::from_builder(builder).is_err());
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let builder = Settings::builder()
            .unwrap()
            .set_override("timeout_secs", 0i64)
            .unwrap();
        assert!(Settings::from_builder(builder).is_err());
    }
}
