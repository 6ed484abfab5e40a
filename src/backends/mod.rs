pub mod command;
pub mod native;

use crate::error::{Result, SpeakError};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;

/// Which player the user asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PlayerChoice {
    /// mpv if installed, otherwise ffplay
    Auto,
    Mpv,
    Ffplay,
    /// In-process decoding and output
    Rodio,
}

/// Trait that all playback backends must implement.
/// Playback blocks the calling thread until the audio has finished.
pub trait PlaybackBackend: Send + Sync {
    /// Returns the unique ID of the backend (e.g., "mpv")
    fn id(&self) -> &'static str;

    fn is_available(&self) -> bool;

    fn play(&self, path: &Path) -> Result<()>;
}

/// Resolve `choice` against the installed players. Called before any
/// synthesis request so a missing player fails fast.
pub fn select_backend(choice: PlayerChoice) -> Result<Arc<dyn PlaybackBackend>> {
    let candidates: Vec<Arc<dyn PlaybackBackend>> = vec![
        Arc::new(command::CommandPlayer::mpv()),
        Arc::new(command::CommandPlayer::ffplay()),
        Arc::new(native::RodioPlayer),
    ];
    select_from(choice, candidates)
}

pub fn select_from(
    choice: PlayerChoice,
    candidates: Vec<Arc<dyn PlaybackBackend>>,
) -> Result<Arc<dyn PlaybackBackend>> {
    let wanted: &[&str] = match choice {
        PlayerChoice::Auto => &["mpv", "ffplay"],
        PlayerChoice::Mpv => &["mpv"],
        PlayerChoice::Ffplay => &["ffplay"],
        PlayerChoice::Rodio => &["rodio"],
    };

    for id in wanted {
        if let Some(backend) = candidates.iter().find(|b| b.id() == *id) {
            if backend.is_available() {
                tracing::debug!(backend = backend.id(), "Selected playback backend");
                return Ok(backend.clone());
            }
            tracing::debug!(backend = backend.id(), "Playback backend not available");
        }
    }

    Err(SpeakError::Dependency(match choice {
        PlayerChoice::Auto => "no audio player found (install mpv or ffmpeg)".to_string(),
        _ => format!("requested player '{}' is not available", wanted.join(", ")),
    }))
}

/// Control-plane check: the caller plays the file, we only vouch that it is there.
pub fn verify_artifact(path: &Path) -> Result<()> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(()),
        _ => Err(SpeakError::File(path.to_path_buf())),
    }
}
