use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{ArchiveError, Result};
use crate::readability::extract_article_text;

/// Plain HTTP GET fetcher for article pages.
pub struct ArticleFetcher {
    client: reqwest::Client,
}

impl ArticleFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        info!(timeout_secs = timeout.as_secs(), "ArticleFetcher initialized");
        Ok(Self { client })
    }

    /// Fetch raw HTML. One attempt; retries are the caller's policy.
    pub async fn fetch_html(&self, url: &str) -> Result<String> {
        let parsed = url::Url::parse(url).map_err(|_| ArchiveError::InvalidUrl(url.to_string()))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(ArchiveError::InvalidUrl(url.to_string()));
        }

        debug!(url, "Fetching article");

        let response = self.client.get(parsed).send().await.map_err(|e| {
            if e.is_timeout() {
                ArchiveError::Timeout(url.to_string())
            } else {
                ArchiveError::Network(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!(url, status = status.as_u16(), "Article fetch failed");
            return Err(ArchiveError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok(response.text().await?)
    }

    /// Fetch a page and reduce it to readable article text.
    pub async fn fetch_text(&self, url: &str) -> Result<String> {
        let html = self.fetch_html(url).await?;
        let text = extract_article_text(&html, Some(url));
        if text.is_empty() {
            return Err(ArchiveError::Empty(url.to_string()));
        }
        info!(url, chars = text.len(), "Fetched article text");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_non_http_urls() {
        let fetcher = ArticleFetcher::new("sitewatch-test", Duration::from_secs(1)).unwrap();
        let err = fetcher.fetch_html("ftp://example.com/a").await.unwrap_err();
        assert!(matches!(err, ArchiveError::InvalidUrl(_)));

        let err = fetcher.fetch_html("not a url").await.unwrap_err();
        assert!(matches!(err, ArchiveError::InvalidUrl(_)));
        assert!(!err.is_transient());
    }
}
