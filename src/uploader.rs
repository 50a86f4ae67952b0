//! Upload with bounded retry and a bounded wait for processing.
//!
//! The store imports documents asynchronously: an upload returns a
//! long-running operation that has to be polled until it reports `done`.
//! A file only counts as accepted once that happens without an error.
//!
//! # Retry Strategy
//!
//! - HTTP 429, 5xx, connection errors, processing timeout → retry
//! - other 4xx, operation finished with an error → fail immediately
//! - backoff: `base`, `2·base`, `4·base`, … capped at `32·base`

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::UploadConfig;
use crate::error::{Error, Result};
use crate::models::UploadResult;
use crate::traits::{DocumentStore, Operation, UploadRequest};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
}

impl From<&UploadConfig> for RetryPolicy {
    fn from(config: &UploadConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff_base: config.backoff_base(),
            poll_interval: config.poll_interval(),
            poll_timeout: config.poll_timeout(),
        }
    }
}

impl RetryPolicy {
    /// Delay before `attempt` (1-based). No delay before the first one.
    pub fn backoff(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        self.backoff_base * (1u32 << (attempt - 2).min(5))
    }
}

pub struct Uploader {
    store: Arc<dyn DocumentStore>,
    policy: RetryPolicy,
}

impl Uploader {
    pub fn new(store: Arc<dyn DocumentStore>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    /// Upload `file` into `handle` and wait until the store has processed it.
    ///
    /// Never returns an error: failures are reported in the
    /// [`UploadResult`] so the caller can move on to the next file.
    pub async fn upload_and_wait(
        &self,
        handle: &str,
        id: &str,
        file: &Path,
        display_name: &str,
    ) -> UploadResult {
        let data = match tokio::fs::read(file).await {
            Ok(data) => data,
            Err(e) => {
                return UploadResult::failed(format!("cannot read {}: {}", file.display(), e));
            }
        };
        let request = UploadRequest {
            display_name: display_name.to_string(),
            mime_type: mime_type_for(display_name).to_string(),
            data,
        };

        let mut last_err = None;
        for attempt in 1..=self.policy.max_attempts {
            let delay = self.policy.backoff(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            tracing::debug!(id, attempt, "uploading");
            match self.attempt(handle, id, &request).await {
                Ok(()) => return UploadResult::accepted(),
                Err(e) if e.is_transient() => {
                    tracing::warn!(id, attempt, error = %e, "upload attempt failed, will retry");
                    last_err = Some(e);
                }
                Err(e) => {
                    tracing::warn!(id, attempt, error = %e, "upload rejected");
                    return UploadResult::failed(e.to_string());
                }
            }
        }

        let detail = last_err
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no attempts made".to_string());
        UploadResult::failed(format!(
            "gave up after {} attempts: {}",
            self.policy.max_attempts, detail
        ))
    }

    async fn attempt(&self, handle: &str, id: &str, request: &UploadRequest) -> Result<()> {
        let operation = self.store.upload(handle, request).await?;
        self.wait_for(id, operation).await
    }

    /// Poll until the operation is done or the poll timeout elapses.
    async fn wait_for(&self, id: &str, mut operation: Operation) -> Result<()> {
        let deadline = Instant::now() + self.policy.poll_timeout;
        loop {
            if operation.done {
                return match operation.error {
                    None => Ok(()),
                    Some(detail) => Err(Error::Upload {
                        id: id.to_string(),
                        detail,
                    }),
                };
            }
            if Instant::now() >= deadline {
                return Err(Error::Timeout {
                    what: format!("processing of '{}'", id),
                    after: self.policy.poll_timeout,
                });
            }
            tokio::time::sleep(self.policy.poll_interval).await;
            operation = self.store.get_operation(&operation.name).await?;
        }
    }
}

/// MIME type sent with an upload, derived from the file extension.
pub fn mime_type_for(name: &str) -> &'static str {
    let ext = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "md" => "text/markdown",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "json" => "application/json",
        "html" | "htm" => "text/html",
        _ => "application/octet-stream",
    }
}
