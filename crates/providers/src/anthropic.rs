//! Anthropic Messages API adapter.
//!
//! The hub's provider contract is one blocking call per turn:
//! `provider.create({model, max_tokens, messages, system?, tools?}) ->
//! {content, stop_reason}`. Streaming token deltas are an explicit
//! non-goal, so this adapter only implements the non-streaming endpoint.

use sa_domain::error::{Error, Result};
use sa_domain::tool::{
    ContentPart, Message, MessageContent, ProviderResponse, Role, StopReason, ToolDefinition,
};
use serde_json::Value;

use crate::traits::{ChatRequest, LlmProvider};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

pub struct AnthropicProvider {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    /// Build a provider reading its API key from `api_key_env`.
    pub fn from_env(api_key_env: &str, base_url: Option<&str>) -> Result<Self> {
        let api_key = std::env::var(api_key_env).map_err(|_| {
            Error::Config(format!(
                "environment variable {api_key_env} is not set; cannot call the Anthropic API"
            ))
        })?;
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(|e| Error::Provider {
                provider: "anthropic".into(),
                message: e.to_string(),
            })?;
        Ok(Self {
            base_url: base_url.unwrap_or(DEFAULT_BASE_URL).trim_end_matches('/').into(),
            api_key,
            client,
        })
    }
}

fn message_to_anthropic(msg: &Message) -> Value {
    let role = match msg.role {
        Role::User => "user",
        Role::Assistant => "assistant",
    };
    let content = match &msg.content {
        MessageContent::Text(t) => Value::String(t.clone()),
        MessageContent::Parts(parts) => Value::Array(parts.iter().map(part_to_anthropic).collect()),
    };
    serde_json::json!({ "role": role, "content": content })
}

fn part_to_anthropic(part: &ContentPart) -> Value {
    match part {
        ContentPart::Text { text } => serde_json::json!({ "type": "text", "text": text }),
        ContentPart::ToolUse { id, name, input } => serde_json::json!({
            "type": "tool_use",
            "id": id,
            "name": name,
            "input": input,
        }),
        ContentPart::ToolResult {
            tool_use_id,
            content,
            is_error,
        } => serde_json::json!({
            "type": "tool_result",
            "tool_use_id": tool_use_id,
            "content": content,
            "is_error": is_error,
        }),
    }
}

fn tool_to_anthropic(tool: &ToolDefinition) -> Value {
    serde_json::json!({
        "name": tool.name,
        "description": tool.description,
        "input_schema": tool.parameters,
    })
}

fn parse_response(body: &Value) -> Result<ProviderResponse> {
    let blocks = body
        .get("content")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();

    let mut content = Vec::with_capacity(blocks.len());
    for block in &blocks {
        match block.get("type").and_then(|v| v.as_str()) {
            Some("text") => {
                let text = block.get("text").and_then(|v| v.as_str()).unwrap_or("").to_string();
                content.push(ContentPart::Text { text });
            }
            Some("tool_use") => {
                content.push(ContentPart::ToolUse {
                    id: block.get("id").and_then(|v| v.as_str()).unwrap_or("").to_string(),
                    name: block.get("name").and_then(|v| v.as_str()).unwrap_or("").to_string(),
                    input: block.get("input").cloned().unwrap_or(Value::Object(Default::default())),
                });
            }
            _ => {}
        }
    }

    let stop_reason = match body.get("stop_reason").and_then(|v| v.as_str()) {
        Some("tool_use") => StopReason::ToolUse,
        Some("max_tokens") => StopReason::MaxTokens,
        _ => StopReason::EndTurn,
    };

    Ok(ProviderResponse { content, stop_reason })
}

#[async_trait::async_trait]
impl LlmProvider for AnthropicProvider {
    async fn create(&self, req: ChatRequest) -> Result<ProviderResponse> {
        let url = format!("{}/v1/messages", self.base_url);

        let mut body = serde_json::json!({
            "model": req.model,
            "max_tokens": req.max_tokens,
            "messages": req.messages.iter().map(message_to_anthropic).collect::<Vec<_>>(),
        });
        if let Some(system) = &req.system {
            body["system"] = Value::String(system.clone());
        }
        if !req.tools.is_empty() {
            body["tools"] = Value::Array(req.tools.iter().map(tool_to_anthropic).collect());
        }

        tracing::debug!(url = %url, model = %req.model, "anthropic request");

        let resp = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Provider {
                provider: "anthropic".into(),
                message: e.to_string(),
            })?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| Error::Provider {
            provider: "anthropic".into(),
            message: e.to_string(),
        })?;

        if !status.is_success() {
            return Err(Error::Provider {
                provider: "anthropic".into(),
                message: format!("HTTP {}: {}", status.as_u16(), text),
            });
        }

        let value: Value = serde_json::from_str(&text)?;
        parse_response(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_message_serializes_as_plain_string_content() {
        let msg = Message::user("hello");
        let v = message_to_anthropic(&msg);
        assert_eq!(v["role"], "user");
        assert_eq!(v["content"], "hello");
    }

    #[test]
    fn tool_result_part_carries_is_error() {
        let part = ContentPart::ToolResult {
            tool_use_id: "t1".into(),
            content: "boom".into(),
            is_error: true,
        };
        let v = part_to_anthropic(&part);
        assert_eq!(v["type"], "tool_result");
        assert_eq!(v["tool_use_id"], "t1");
        assert_eq!(v["is_error"], true);
    }

    #[test]
    fn tool_definition_maps_parameters_to_input_schema() {
        let tool = ToolDefinition {
            name: "echo".into(),
            description: "echoes".into(),
            parameters: serde_json::json!({"type": "object"}),
        };
        let v = tool_to_anthropic(&tool);
        assert_eq!(v["name"], "echo");
        assert_eq!(v["input_schema"], serde_json::json!({"type": "object"}));
    }

    #[test]
    fn parse_response_extracts_text_and_tool_use_blocks_in_order() {
        let body = serde_json::json!({
            "content": [
                {"type": "text", "text": "thinking..."},
                {"type": "tool_use", "id": "u1", "name": "echo", "input": {"x": 1}},
            ],
            "stop_reason": "tool_use",
        });
        let resp = parse_response(&body).unwrap();
        assert_eq!(resp.stop_reason, StopReason::ToolUse);
        assert_eq!(resp.content.len(), 2);
        match &resp.content[0] {
            ContentPart::Text { text } => assert_eq!(text, "thinking..."),
            other => panic!("unexpected block: {other:?}"),
        }
        match &resp.content[1] {
            ContentPart::ToolUse { id, name, input } => {
                assert_eq!(id, "u1");
                assert_eq!(name, "echo");
                assert_eq!(input, &serde_json::json!({"x": 1}));
            }
            other => panic!("unexpected block: {other:?}"),
        }
    }

    #[test]
    fn parse_response_defaults_to_end_turn() {
        let body = serde_json::json!({ "content": [], "stop_reason": "end_turn" });
        let resp = parse_response(&body).unwrap();
        assert_eq!(resp.stop_reason, StopReason::EndTurn);
        assert!(resp.content.is_empty());
    }

    #[test]
    fn parse_response_maps_max_tokens() {
        let body = serde_json::json!({ "content": [], "stop_reason": "max_tokens" });
        let resp = parse_response(&body).unwrap();
        assert_eq!(resp.stop_reason, StopReason::MaxTokens);
    }

    #[test]
    fn from_env_fails_without_api_key() {
        let var = "SA_TEST_ANTHROPIC_KEY_UNSET_PROBE";
        std::env::remove_var(var);
        let err = AnthropicProvider::from_env(var, None).unwrap_err();
        assert!(err.to_string().contains(var));
    }
}
