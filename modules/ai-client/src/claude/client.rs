use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use tracing::debug;

use super::types::{MessagesRequest, MessagesResponse};
use crate::error::ApiError;

const API_VERSION: &str = "2023-06-01";

/// One HTTP connection pool per `Claude` handle.
pub(crate) struct Transport {
    http: reqwest::Client,
    messages_url: String,
}

impl Transport {
    pub fn new(api_key: &str, base_url: &str, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let mut key = HeaderValue::from_str(api_key).context("API key is not a valid header value")?;
        key.set_sensitive(true);
        headers.insert("x-api-key", key);
        headers.insert("anthropic-version", HeaderValue::from_static(API_VERSION));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            messages_url: format!("{}/messages", base_url.trim_end_matches('/')),
        })
    }

    /// POST a request. Non-2xx statuses come back as [`ApiError`].
    pub async fn send(&self, request: &MessagesRequest) -> Result<MessagesResponse> {
        debug!(model = %request.model, tools = request.tools.len(), "Messages request");
        let response = self.http.post(&self.messages_url).json(request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ApiError {
                status: status.as_u16(),
                message,
            }
            .into());
        }
        Ok(response.json().await?)
    }
}
