//! HTTP transport used by the provider client.
//!
//! Whether a transport retries on its own is a fixed property of the
//! configured implementation. The provider asks once per call and either hands
//! the whole retry policy over or runs its own loop around single attempts.

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::Value;
use std::path::Path;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

/// One failed attempt. Every variant is worth retrying.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransportFailure {
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("server answered with status {0}")]
    Status(u16),
    #[error("{0}")]
    Other(String),
}

/// A failure after the transport gave up retrying.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryExhausted {
    pub attempts: u32,
    pub last: TransportFailure,
}

/// Everything needed to issue the synthesis POST. The body is built by the
/// caller once and reused for every attempt.
#[derive(Debug, Clone, Copy)]
pub struct TransportCall<'a> {
    pub url: &'a str,
    pub bearer: &'a str,
    pub body: &'a Value,
    pub timeout: Duration,
}

/// Retry policy handed to a transport with native retry support.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeRetryPolicy {
    /// Retries after the first attempt
    pub retries: u32,
    pub delay: Duration,
    /// Total wall-clock budget across all attempts
    pub max_time: Duration,
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    fn supports_native_retry(&self) -> bool;

    /// One attempt: POST the body and stream the response into `dest`.
    async fn post_to_file(&self, call: &TransportCall<'_>, dest: &Path) -> Result<(), TransportFailure>;

    /// Retry natively according to `policy`. Returns the number of attempts made.
    async fn post_to_file_with_retry(
        &self,
        call: &TransportCall<'_>,
        dest: &Path,
        policy: &NativeRetryPolicy,
    ) -> Result<u32, RetryExhausted>;
}

/// Statuses that mean "try again later" rather than "your request is wrong".
pub fn is_transient_status(status: u16) -> bool {
    status == 408 || status == 429 || (500..=599).contains(&status)
}

pub struct ReqwestTransport {
    client: reqwest::Client,
    native_retry: bool,
}

impl ReqwestTransport {
    pub fn new(connect_timeout: Duration, native_retry: bool) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .user_agent(concat!("speakd/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            native_retry,
        })
    }

    fn classify(err: &reqwest::Error, timeout: Duration) -> TransportFailure {
        if err.is_timeout() {
            TransportFailure::Timeout(timeout)
        } else if err.is_connect() {
            TransportFailure::Connect(err.to_string())
        } else {
            TransportFailure::Other(err.to_string())
        }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    fn supports_native_retry(&self) -> bool {
        self.native_retry
    }

    async fn post_to_file(&self, call: &TransportCall<'_>, dest: &Path) -> Result<(), TransportFailure> {
        let resp = self
            .client
            .post(call.url)
            .bearer_auth(call.bearer)
            .timeout(call.timeout)
            .json(call.body)
            .send()
            .await
            .map_err(|e| Self::classify(&e, call.timeout))?;

        let status = resp.status().as_u16();
        if is_transient_status(status) {
            return Err(TransportFailure::Status(status));
        }
        if !resp.status().is_success() {
            tracing::debug!(status, "Provider rejected request, keeping body for inspection");
        }

        // Non-2xx bodies land on disk too; the caller inspects what was written.
        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| TransportFailure::Other(format!("cannot create {}: {}", dest.display(), e)))?;
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Self::classify(&e, call.timeout))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| TransportFailure::Other(e.to_string()))?;
        }
        file.flush()
            .await
            .map_err(|e| TransportFailure::Other(e.to_string()))?;
        Ok(())
    }

    async fn post_to_file_with_retry(
        &self,
        call: &TransportCall<'_>,
        dest: &Path,
        policy: &NativeRetryPolicy,
    ) -> Result<u32, RetryExhausted> {
        let started = Instant::now();
        let mut attempts = 0;

        loop {
            attempts += 1;
            let failure = match self.post_to_file(call, dest).await {
                Ok(()) => return Ok(attempts),
                Err(f) => f,
            };

            let out_of_retries = attempts > policy.retries;
            let out_of_time = started.elapsed() + policy.delay >= policy.max_time;
            if out_of_retries || out_of_time {
                return Err(RetryExhausted {
                    attempts,
                    last: failure,
                });
            }

            tracing::warn!(attempt = attempts, error = %failure, "Transient failure, retrying");
            tokio::time::sleep(policy.delay).await;
        }
    }
}
