use crate::config_loader::Settings;
use crate::error::{Result, SpeakError};
use crate::request::SpeechRequest;
use crate::transport::{HttpTransport, NativeRetryPolicy, ReqwestTransport, TransportCall, TransportFailure};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Anything that can turn a request into an audio file at `dest`.
#[async_trait]
pub trait SpeechProvider: Send + Sync {
    async fn synthesize(&self, request: &SpeechRequest, dest: &Path) -> Result<()>;
}

/// What a finished download turned out to contain.
#[derive(Debug, PartialEq)]
pub enum ArtifactKind {
    Missing,
    Empty,
    Audio,
    /// Structured text where audio should be, with the message extracted from it
    ErrorText(String),
}

pub struct OpenAiProvider {
    transport: Arc<dyn HttpTransport>,
    endpoint: String,
    api_key: String,
    retry_delay: Duration,
    backoff_base: Duration,
}

impl OpenAiProvider {
    pub fn new(transport: Arc<dyn HttpTransport>, endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            transport,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            retry_delay: Duration::from_secs(1),
            backoff_base: Duration::from_secs(1),
        }
    }

    pub fn from_settings(settings: &Settings, api_key: impl Into<String>) -> Result<Self> {
        let transport = ReqwestTransport::new(
            Duration::from_secs(settings.connect_timeout_secs),
            settings.native_retry,
        )
        .map_err(|e| SpeakError::Dependency(format!("HTTP client unavailable: {}", e)))?;

        Ok(Self::new(Arc::new(transport), settings.endpoint.clone(), api_key).with_timing(
            Duration::from_secs(settings.retry_delay_secs),
            Duration::from_secs(settings.backoff_base_secs),
        ))
    }

    /// Overrides the native retry delay and the first manual backoff step.
    pub fn with_timing(mut self, retry_delay: Duration, backoff_base: Duration) -> Self {
        self.retry_delay = retry_delay;
        self.backoff_base = backoff_base;
        self
    }

    pub fn payload(request: &SpeechRequest) -> Value {
        json!({
            "model": request.model,
            "input": request.text,
            "voice": request.voice,
            "speed": request.speed,
        })
    }

    async fn manual_retry(&self, call: &TransportCall<'_>, dest: &Path, max_retries: u32) -> Result<()> {
        let allowed = max_retries.max(1);
        let mut last = TransportFailure::Other("no attempt made".to_string());

        for attempt in 1..=allowed {
            match self.transport.post_to_file(call, dest).await {
                Ok(()) => {
                    tracing::debug!(attempt, "Synthesis request succeeded");
                    return Ok(());
                }
                Err(failure) => {
                    tracing::warn!(attempt, allowed, error = %failure, "Synthesis attempt failed");
                    last = failure;
                }
            }
            if attempt < allowed {
                tokio::time::sleep(backoff_delay(self.backoff_base, attempt)).await;
            }
        }

        Err(SpeakError::Transport {
            attempts: allowed,
            last_error: last.to_string(),
        })
    }
}

#[async_trait]
impl SpeechProvider for OpenAiProvider {
    async fn synthesize(&self, request: &SpeechRequest, dest: &Path) -> Result<()> {
        request.validate()?;

        let body = Self::payload(request);
        let timeout = Duration::from_secs(request.timeout_secs);
        let call = TransportCall {
            url: &self.endpoint,
            bearer: &self.api_key,
            body: &body,
            timeout,
        };

        let outcome = if self.transport.supports_native_retry() {
            let policy = NativeRetryPolicy {
                retries: request.max_retries,
                delay: self.retry_delay,
                max_time: timeout * 2,
            };
            self.transport
                .post_to_file_with_retry(&call, dest, &policy)
                .await
                .map(|attempts| {
                    tracing::debug!(attempts, "Synthesis request succeeded");
                })
                .map_err(|e| SpeakError::Transport {
                    attempts: e.attempts,
                    last_error: e.last.to_string(),
                })
        } else {
            self.manual_retry(&call, dest, request.max_retries).await
        };

        if let Err(e) = outcome {
            // A half-written body is not audio
            let _ = tokio::fs::remove_file(dest).await;
            return Err(e);
        }

        match inspect_artifact(dest).await? {
            ArtifactKind::Audio => Ok(()),
            ArtifactKind::Missing | ArtifactKind::Empty => {
                let _ = tokio::fs::remove_file(dest).await;
                Err(SpeakError::Integrity(dest.to_path_buf()))
            }
            ArtifactKind::ErrorText(message) => {
                tracing::error!(path = %dest.display(), %message, "Provider returned an error instead of audio");
                tokio::fs::remove_file(dest).await?;
                Err(SpeakError::Provider { message })
            }
        }
    }
}

/// Delay before the attempt following attempt `attempt` (1-based): base, 2×base, 4×base, ...
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(16);
    base.saturating_mul(1u32 << exp)
}

pub async fn inspect_artifact(path: &Path) -> Result<ArtifactKind> {
    let bytes = match tokio::fs::read(path).await {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ArtifactKind::Missing),
        Err(e) => return Err(e.into()),
    };
    Ok(classify_bytes(&bytes))
}

pub fn classify_bytes(bytes: &[u8]) -> ArtifactKind {
    if bytes.is_empty() {
        return ArtifactKind::Empty;
    }
    let head = &bytes[..bytes.len().min(512)];
    if !looks_like_text(head) {
        return ArtifactKind::Audio;
    }
    ArtifactKind::ErrorText(error_message(bytes))
}

fn looks_like_text(head: &[u8]) -> bool {
    if head.contains(&0) {
        return false;
    }
    match std::str::from_utf8(head) {
        Ok(_) => true,
        // Cut in the middle of a multi-byte character
        Err(e) => e.error_len().is_none(),
    }
}

fn error_message(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    if let Ok(json) = serde_json::from_str::<Value>(&text) {
        let message = json
            .get("error")
            .and_then(|e| e.get("message").or(Some(e)))
            .or_else(|| json.get("message"))
            .and_then(|m| m.as_str());
        if let Some(message) = message {
            return message.to_string();
        }
    }
    let trimmed = text.trim();
    if trimmed.is_empty() {
        "unknown error".to_string()
    } else {
        trimmed.chars().take(200).collect()
    }
}
