//! OpenAI-compatible chat-completions provider.

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use super::sse::data_lines;
use super::{ChatRequest, ChatStream, Message, ModelProvider, StreamChunk};
use crate::error::JudgeError;
use crate::Result;

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Provider speaking the OpenAI `/chat/completions` streaming protocol.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleProvider {
    name: String,
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            client: reqwest::Client::new(),
        }
    }

    fn body<'a>(request: &'a ChatRequest) -> CompletionRequest<'a> {
        let response_format = request.structured_output.as_ref().map(|so| {
            json!({
                "type": "json_schema",
                "json_schema": {
                    "name": so.name,
                    "description": so.description,
                    "schema": so.schema,
                    "strict": so.strict,
                }
            })
        });
        CompletionRequest {
            model: &request.model,
            messages: &request.messages,
            stream: true,
            max_tokens: request.max_tokens,
            response_format,
        }
    }
}

/// Concatenated content deltas of one streamed chunk; `None` for `[DONE]`.
fn parse_chunk(data: &str) -> Option<Result<StreamChunk>> {
    let data = data.trim();
    if data.is_empty() || data == "[DONE]" {
        return None;
    }
    Some(
        serde_json::from_str::<CompletionChunk>(data)
            .map(|chunk| StreamChunk {
                delta: chunk
                    .choices
                    .into_iter()
                    .filter_map(|c| c.delta.content)
                    .collect(),
            })
            .map_err(|e| JudgeError::Stream(format!("invalid completion chunk: {}", e))),
    )
}

#[async_trait]
impl ModelProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn chat_stream(&self, request: ChatRequest) -> Result<ChatStream> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(provider = %self.name, model = %request.model, "starting chat completion");

        let mut http = self.client.post(&url).json(&Self::body(&request));
        if let Some(key) = &self.api_key {
            http = http.bearer_auth(key);
        }

        let response = http.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(JudgeError::Api {
                provider: self.name.clone(),
                status: status.as_u16(),
                body,
            });
        }

        let stream = data_lines(response.bytes_stream()).filter_map(|line| {
            futures::future::ready(match line {
                Ok(data) => parse_chunk(&data),
                Err(e) => Some(Err(e)),
            })
        });
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::StructuredOutput;

    #[test]
    fn test_parse_chunk_content() {
        let chunk = parse_chunk(r#"{"choices":[{"delta":{"content":"{\"res"}}]}"#)
            .unwrap()
            .unwrap();
        assert_eq!(chunk.delta, "{\"res");
    }

    #[test]
    fn test_parse_chunk_role_only_delta() {
        let chunk = parse_chunk(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#)
            .unwrap()
            .unwrap();
        assert_eq!(chunk.delta, "");
    }

    #[test]
    fn test_parse_chunk_done() {
        assert!(parse_chunk("[DONE]").is_none());
    }

    #[test]
    fn test_parse_chunk_garbage() {
        assert!(matches!(parse_chunk("{not json"), Some(Err(JudgeError::Stream(_)))));
    }

    #[test]
    fn test_request_body_with_schema() {
        let request = ChatRequest::new("gpt-4o", vec![Message::user("hi")]).with_structured_output(
            StructuredOutput {
                name: "judge_response".into(),
                description: "d".into(),
                schema: json!({"type": "object"}),
                strict: true,
            },
        );
        let body = serde_json::to_value(OpenAiCompatibleProvider::body(&request)).unwrap();
        assert_eq!(body["stream"], true);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["response_format"]["type"], "json_schema");
        assert_eq!(body["response_format"]["json_schema"]["name"], "judge_response");
        assert_eq!(body["response_format"]["json_schema"]["strict"], true);
        assert!(body.get("max_tokens").is_none());
    }
}
