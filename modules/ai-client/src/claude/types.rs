//! Wire types for the Anthropic Messages API. Only the fields the pipeline
//! sends or reads are modelled.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub(crate) struct Message {
    pub role: &'static str,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: serde_json::Value,
}

/// Forces the model to answer through the named tool.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum ToolChoice {
    Tool { name: &'static str },
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct MessagesRequest {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
}

impl MessagesRequest {
    /// Deterministic single-turn request.
    pub fn single_turn(model: &str, system: String, user: String, max_tokens: u32) -> Self {
        Self {
            model: model.to_string(),
            max_tokens,
            temperature: 0.0,
            messages: vec![Message::user(user)],
            system: Some(system),
            tools: Vec::new(),
            tool_choice: None,
        }
    }

    pub fn forcing_tool(mut self, tool: ToolSpec) -> Self {
        self.tool_choice = Some(ToolChoice::Tool { name: tool.name });
        self.tools.push(tool);
        self
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum Block {
    Text { text: String },
    ToolUse { input: serde_json::Value },
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct MessagesResponse {
    pub content: Vec<Block>,
}

impl MessagesResponse {
    pub fn first_text(&self) -> Option<&str> {
        self.content.iter().find_map(|block| match block {
            Block::Text { text } => Some(text.as_str()),
            _ => None,
        })
    }

    pub fn into_tool_input(self) -> Option<serde_json::Value> {
        self.content.into_iter().find_map(|block| match block {
            Block::ToolUse { input } => Some(input),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_reply_has_no_tool_input() {
        let raw = r#"{"content":[{"type":"text","text":"30.57, -97.41"}],"stop_reason":"end_turn"}"#;
        let response: MessagesResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(response.first_text(), Some("30.57, -97.41"));
        assert!(response.into_tool_input().is_none());
    }

    #[test]
    fn tool_reply_exposes_input() {
        let raw = r#"{"content":[{"type":"tool_use","id":"t1","name":"record","input":{"company":"Acme"}}]}"#;
        let response: MessagesResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(response.into_tool_input().unwrap()["company"], "Acme");
    }

    #[test]
    fn forced_tool_request_shape() {
        let request = MessagesRequest::single_turn("model-x", "sys".into(), "hi".into(), 64).forcing_tool(ToolSpec {
            name: "record",
            description: "d",
            input_schema: serde_json::json!({"type": "object"}),
        });
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["tool_choice"], serde_json::json!({"type": "tool", "name": "record"}));
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["temperature"], 0.0);

        let plain = MessagesRequest::single_turn("model-x", "sys".into(), "hi".into(), 64);
        let json = serde_json::to_value(&plain).unwrap();
        assert!(json.get("tools").is_none());
        assert!(json.get("tool_choice").is_none());
    }
}
