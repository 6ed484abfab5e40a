//! Content-addressed locations for synthesized audio.
//!
//! A request's identity is its text, voice and speed. The same triple always
//! maps to the same file, so a second request can reuse the first one's audio.
//! Entries never expire.

use sha2::{Digest, Sha256};
use std::path::PathBuf;

pub const AUDIO_EXTENSION: &str = "mp3";

#[derive(Debug, Clone)]
pub struct CacheResolver {
    dir: PathBuf,
    prefix: String,
}

impl CacheResolver {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }

    /// Hex digest of the identity string. Speed uses the shortest form that
    /// round-trips, the same value the provider receives.
    pub fn key(text: &str, voice: &str, speed: f32) -> String {
        let identity = format!("{} {} {}", text, voice, speed);
        let digest = Sha256::digest(identity.as_bytes());
        format!("{:x}", digest)
    }

    pub fn resolve(&self, text: &str, voice: &str, speed: f32) -> PathBuf {
        self.dir.join(format!(
            "{}{}.{}",
            self.prefix,
            Self::key(text, voice, speed),
            AUDIO_EXTENSION
        ))
    }
}
