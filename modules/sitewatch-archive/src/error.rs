/// Result type alias for archive operations.
pub type Result<T> = std::result::Result<T, ArchiveError>;

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP {status} fetching {url}")]
    Http { status: u16, url: String },

    #[error("Timed out fetching {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("No readable content at {0}")]
    Empty(String),
}

impl ArchiveError {
    /// Failures worth another attempt: timeouts, connection problems,
    /// rate limiting and gateway errors.
    pub fn is_transient(&self) -> bool {
        match self {
            ArchiveError::Http { status, .. } => matches!(status, 429 | 502 | 503),
            ArchiveError::Timeout(_) => true,
            ArchiveError::Network(e) => e.is_timeout() || e.is_connect(),
            ArchiveError::InvalidUrl(_) | ArchiveError::Empty(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        let http = |status| ArchiveError::Http {
            status,
            url: "https://example.com".into(),
        };
        assert!(http(429).is_transient());
        assert!(http(503).is_transient());
        assert!(!http(404).is_transient());
        assert!(ArchiveError::Timeout("u".into()).is_transient());
        assert!(!ArchiveError::Empty("u".into()).is_transient());
    }
}
