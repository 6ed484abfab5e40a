use super::PlaybackBackend;
use crate::error::{Result, SpeakError};
use std::io::ErrorKind;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;
use wait_timeout::ChildExt;

/// An external player binary invoked once per file.
pub struct CommandPlayer {
    id: &'static str,
    binary: String,
    args: Vec<&'static str>,
    version_arg: &'static str,
}

impl CommandPlayer {
    pub fn mpv() -> Self {
        Self {
            id: "mpv",
            binary: "mpv".to_string(),
            args: vec!["--no-video", "--really-quiet", "--no-terminal"],
            version_arg: "--version",
        }
    }

    pub fn ffplay() -> Self {
        Self {
            id: "ffplay",
            binary: "ffplay".to_string(),
            args: vec!["-nodisp", "-autoexit", "-loglevel", "quiet"],
            version_arg: "-version",
        }
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }
}

impl PlaybackBackend for CommandPlayer {
    fn id(&self) -> &'static str {
        self.id
    }

    fn is_available(&self) -> bool {
        let mut child = match Command::new(&self.binary)
            .arg(self.version_arg)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(c) => c,
            Err(_) => return false,
        };

        // Wait for 5 seconds max
        match child.wait_timeout(Duration::from_secs(5)) {
            Ok(Some(status)) => status.success(),
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                false
            }
        }
    }

    fn play(&self, path: &Path) -> Result<()> {
        tracing::debug!(player = self.id, path = %path.display(), "Starting playback");

        let output = Command::new(&self.binary)
            .args(&self.args)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => SpeakError::Dependency(format!("{} is not installed", self.binary)),
                _ => SpeakError::Playback(format!("failed to start {}: {}", self.binary, e)),
            })?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(SpeakError::Playback(format!(
                "{} exited with {}: {}",
                self.id,
                output.status,
                stderr.trim()
            )))
        }
    }
}
