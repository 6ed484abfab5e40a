use std::path::PathBuf;
use thiserror::Error;

/// Every terminal failure a speech request can end in.
#[derive(Debug, Error)]
pub enum SpeakError {
    #[error("Invalid parameter: {0}")]
    Parameter(String),

    #[error("Missing dependency: {0}")]
    Dependency(String),

    #[error("Request failed after {attempts} attempt(s): {last_error}")]
    Transport { attempts: u32, last_error: String },

    #[error("API error: {message}")]
    Provider { message: String },

    #[error("No audio file was produced at {0}")]
    Integrity(PathBuf),

    #[error("Audio file missing or empty: {0}")]
    File(PathBuf),

    #[error("Playback failed: {0}")]
    Playback(String),

    #[error("No API key found: {0}")]
    Credentials(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SpeakError {
    /// Process exit code used by the `speakd` binary.
    pub fn exit_code(&self) -> u8 {
        match self {
            SpeakError::Dependency(_) => 2,
            SpeakError::Transport { .. } => 3,
            SpeakError::Integrity(_) | SpeakError::File(_) => 4,
            SpeakError::Provider { .. } => 5,
            SpeakError::Playback(_) => 6,
            SpeakError::Parameter(_)
            | SpeakError::Credentials(_)
            | SpeakError::Config(_)
            | SpeakError::Io(_) => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, SpeakError>;
