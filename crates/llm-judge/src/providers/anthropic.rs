//! Anthropic Messages API provider.
//!
//! Structured output is obtained by forcing a single tool whose input schema
//! is the requested schema; the streamed tool input is the JSON document.

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::sse::data_lines;
use super::{ChatRequest, ChatStream, ModelProvider, Role, StreamChunk};
use crate::error::JudgeError;
use crate::Result;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 1024;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
    ContentBlockDelta { delta: BlockDelta },
    Error { error: Value },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BlockDelta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
    #[serde(other)]
    Other,
}

/// Provider for the Anthropic Messages API.
#[derive(Debug, Clone)]
pub struct AnthropicProvider {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(DEFAULT_BASE_URL, api_key)
    }

    pub fn with_base_url(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    fn body(request: &ChatRequest) -> Value {
        let system: Vec<&str> = request
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();
        let messages: Vec<&super::Message> = request
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .collect();

        let mut body = json!({
            "model": request.model,
            "max_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "messages": messages,
            "stream": true,
        });
        if !system.is_empty() {
            body["system"] = json!(system.join("\n\n"));
        }
        if let Some(so) = &request.structured_output {
            body["tools"] = json!([{
                "name": so.name,
                "description": so.description,
                "input_schema": so.schema,
            }]);
            body["tool_choice"] = json!({"type": "tool", "name": so.name});
        }
        body
    }
}

fn parse_event(data: &str) -> Option<Result<StreamChunk>> {
    match serde_json::from_str::<StreamEvent>(data) {
        Ok(StreamEvent::ContentBlockDelta { delta }) => match delta {
            BlockDelta::TextDelta { text } => Some(Ok(StreamChunk { delta: text })),
            BlockDelta::InputJsonDelta { partial_json } => Some(Ok(StreamChunk {
                delta: partial_json,
            })),
            BlockDelta::Other => None,
        },
        Ok(StreamEvent::Error { error }) => Some(Err(JudgeError::Stream(error.to_string()))),
        Ok(StreamEvent::Other) => None,
        Err(e) => Some(Err(JudgeError::Stream(format!("invalid message event: {}", e)))),
    }
}

#[async_trait]
impl ModelProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn chat_stream(&self, request: ChatRequest) -> Result<ChatStream> {
        let url = format!("{}/v1/messages", self.base_url);
        debug!(provider = "anthropic", model = %request.model, "starting chat completion");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&Self::body(&request))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(JudgeError::Api {
                provider: "anthropic".to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let stream = data_lines(response.bytes_stream()).filter_map(|line| {
            futures::future::ready(match line {
                Ok(data) => parse_event(&data),
                Err(e) => Some(Err(e)),
            })
        });
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{Message, StructuredOutput};

    #[test]
    fn test_text_and_json_deltas() {
        let text = parse_event(
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"hi"}}"#,
        );
        assert_eq!(text.unwrap().unwrap().delta, "hi");

        let json = parse_event(
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"{\"result\""}}"#,
        );
        assert_eq!(json.unwrap().unwrap().delta, "{\"result\"");
    }

    #[test]
    fn test_bookkeeping_events_are_skipped() {
        assert!(parse_event(r#"{"type":"message_start","message":{}}"#).is_none());
        assert!(parse_event(r#"{"type":"ping"}"#).is_none());
        assert!(parse_event(r#"{"type":"message_stop"}"#).is_none());
    }

    #[test]
    fn test_error_event() {
        let err = parse_event(r#"{"type":"error","error":{"type":"overloaded_error"}}"#)
            .unwrap()
            .unwrap_err();
        assert!(err.to_string().contains("overloaded_error"));
    }

    #[test]
    fn test_body_forces_schema_tool() {
        let request = ChatRequest::new(
            "claude-sonnet-4-5",
            vec![
                Message {
                    role: Role::System,
                    content: "be terse".into(),
                },
                Message::user("hi"),
            ],
        )
        .with_structured_output(StructuredOutput {
            name: "judge_response".into(),
            description: "d".into(),
            schema: json!({"type": "object"}),
            strict: true,
        });

        let body = AnthropicProvider::body(&request);
        assert_eq!(body["system"], "be terse");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["max_tokens"], DEFAULT_MAX_TOKENS);
        assert_eq!(body["tools"][0]["name"], "judge_response");
        assert_eq!(body["tool_choice"]["name"], "judge_response");
    }
}
