use std::future::Future;
use std::time::Duration;

use rand::Rng;
use sitewatch_common::config::RetryConfig;
use tracing::warn;

/// A non-success HTTP status from an external service that has no richer
/// error type of its own.
#[derive(Debug, thiserror::Error)]
#[error("{service} returned HTTP {status}")]
pub struct HttpStatusError {
    pub service: &'static str,
    pub status: u16,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// base × 3^attempt, plus up to a quarter of base as jitter.
    fn backoff(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let jitter = rand::rng().random_range(0..=base_ms / 4);
        self.base_delay * 3u32.pow(attempt) + Duration::from_millis(jitter)
    }
}

/// Transient failures are worth another attempt; anything else (bad request,
/// auth, parse errors) fails immediately.
pub fn is_transient(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        if let Some(e) = cause.downcast_ref::<ai_client::ApiError>() {
            return e.is_transient();
        }
        if let Some(e) = cause.downcast_ref::<sitewatch_archive::ArchiveError>() {
            return e.is_transient();
        }
        if let Some(e) = cause.downcast_ref::<HttpStatusError>() {
            return matches!(e.status, 429 | 502 | 503);
        }
        if let Some(e) = cause.downcast_ref::<reqwest::Error>() {
            return e.is_timeout()
                || e.is_connect()
                || e
                    .status()
                    .is_some_and(|s| matches!(s.as_u16(), 429 | 502 | 503));
        }
        false
    })
}

/// Run `op` with a per-attempt timeout, retrying transient failures with
/// exponential backoff up to the policy's attempt cap.
pub async fn retry_with_backoff<T, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let mut attempt = 0;
    loop {
        let last_attempt = attempt + 1 >= policy.max_attempts;
        match tokio::time::timeout(policy.timeout, op()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => {
                if last_attempt || !is_transient(&e) {
                    return Err(e);
                }
                warn!(label, attempt = attempt + 1, error = %e, "Transient failure, retrying");
            }
            Err(_) => {
                if last_attempt {
                    anyhow::bail!("{label} timed out after {:?}", policy.timeout);
                }
                warn!(label, attempt = attempt + 1, "Timed out, retrying");
            }
        }
        tokio::time::sleep(policy.backoff(attempt)).await;
        attempt += 1;
    }
}
