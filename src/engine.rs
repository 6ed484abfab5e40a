use crate::backends::{verify_artifact, PlaybackBackend};
use crate::cache::CacheResolver;
use crate::error::{Result, SpeakError};
use crate::provider::{inspect_artifact, ArtifactKind, SpeechProvider};
use crate::request::{OutputTarget, SpeechRequest};
use std::path::PathBuf;
use std::sync::Arc;

/// What to do with the audio once it exists.
#[derive(Clone)]
pub enum PlaybackIntent {
    /// Play it here, blocking until the player finishes
    Play(Arc<dyn PlaybackBackend>),
    /// The caller plays it; only confirm the file is usable
    Delegate,
    /// Produce the file and stop
    Skip,
}

/// Cache lookup, synthesis and playback for one request.
#[derive(Clone)]
pub struct SpeechEngine {
    provider: Arc<dyn SpeechProvider>,
    cache: CacheResolver,
}

impl SpeechEngine {
    pub fn new(provider: Arc<dyn SpeechProvider>, cache: CacheResolver) -> Self {
        Self { provider, cache }
    }

    pub fn resolve_path(&self, request: &SpeechRequest) -> PathBuf {
        match &request.output {
            OutputTarget::Auto => self
                .cache
                .resolve(&request.text, &request.voice, request.speed),
            OutputTarget::Path(p) => p.clone(),
        }
    }

    /// Runs the request to completion and returns where the audio lives.
    ///
    /// Two overlapping runs for the same path both synthesize; the last
    /// writer wins.
    pub async fn run(&self, request: &SpeechRequest, intent: &PlaybackIntent) -> Result<PathBuf> {
        request.validate()?;
        let path = self.resolve_path(request);

        if inspect_artifact(&path).await? == ArtifactKind::Audio {
            tracing::info!(path = %path.display(), "Cache hit, skipping synthesis");
        } else {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }
            tracing::info!(
                voice = %request.voice,
                speed = request.speed,
                chars = request.text.chars().count(),
                "Synthesizing speech"
            );
            self.provider.synthesize(request, &path).await?;

            if inspect_artifact(&path).await? != ArtifactKind::Audio {
                return Err(SpeakError::Integrity(path));
            }
        }

        match intent {
            PlaybackIntent::Play(backend) => {
                let backend = backend.clone();
                let audio = path.clone();
                tokio::task::spawn_blocking(move || backend.play(&audio))
                    .await
                    .map_err(|e| SpeakError::Playback(format!("playback task failed: {}", e)))??;
            }
            PlaybackIntent::Delegate => verify_artifact(&path)?,
            PlaybackIntent::Skip => {}
        }

        Ok(path)
    }
}
