mod client;
mod types;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use crate::schema::StructuredOutput;
use client::Transport;
use types::{MessagesRequest, ToolSpec};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const RECORD_TOOL: &str = "record_answer";

/// Handle for one model. Cheap to clone; the transport is built on first
/// use and shared afterwards.
#[derive(Clone)]
pub struct Claude {
    api_key: String,
    model: String,
    base_url: String,
    timeout: Duration,
    transport: Arc<std::sync::OnceLock<Transport>>,
}

impl Claude {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            transport: Arc::default(),
        }
    }

    /// Point at a proxy or test server instead of the public endpoint.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self.transport = Arc::default();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self.transport = Arc::default();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn transport(&self) -> Result<&Transport> {
        if let Some(transport) = self.transport.get() {
            return Ok(transport);
        }
        let built = Transport::new(&self.api_key, &self.base_url, self.timeout)?;
        Ok(self.transport.get_or_init(|| built))
    }

    /// Short free-text answer.
    pub async fn chat_completion(&self, system: impl Into<String>, user: impl Into<String>) -> Result<String> {
        let request = MessagesRequest::single_turn(&self.model, system.into(), user.into(), 256);
        let response = self.transport()?.send(&request).await?;
        response
            .first_text()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("model returned no text"))
    }

    /// Answer shaped as `T`, by forcing a single tool call whose input schema
    /// is `T`'s JSON schema.
    pub async fn extract<T: StructuredOutput>(&self, system: impl Into<String>, user: impl Into<String>) -> Result<T> {
        let request = MessagesRequest::single_turn(&self.model, system.into(), user.into(), 1024).forcing_tool(ToolSpec {
            name: RECORD_TOOL,
            description: "Record the answer in the required shape.",
            input_schema: T::tool_schema(),
        });
        let input = self
            .transport()?
            .send(&request)
            .await?
            .into_tool_input()
            .ok_or_else(|| anyhow!("model did not call {RECORD_TOOL}"))?;
        serde_json::from_value(input).context("tool input does not match the requested shape")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_fields() {
        let ai = Claude::new("sk-ant-test", "claude-haiku")
            .with_base_url("https://proxy.internal/v1")
            .with_timeout(Duration::from_secs(5));
        assert_eq!(ai.model(), "claude-haiku");
        assert_eq!(ai.base_url, "https://proxy.internal/v1");
        assert_eq!(ai.timeout, Duration::from_secs(5));
    }

    #[test]
    fn transport_is_built_once() {
        let ai = Claude::new("sk-ant-test", "claude-haiku");
        let first = ai.transport().unwrap() as *const Transport;
        let clone = ai.clone();
        let second = clone.transport().unwrap() as *const Transport;
        assert_eq!(first, second);
    }
}
