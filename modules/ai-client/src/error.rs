use thiserror::Error;

/// A non-success HTTP response from the provider.
///
/// Carried inside `anyhow::Error` so callers can downcast and decide whether
/// the status is worth retrying.
#[derive(Debug, Error)]
#[error("API error (status {status}): {message}")]
pub struct ApiError {
    pub status: u16,
    pub message: String,
}

impl ApiError {
    /// Rate limiting and gateway hiccups; everything else is permanent.
    pub fn is_transient(&self) -> bool {
        matches!(self.status, 429 | 502 | 503)
    }
}
