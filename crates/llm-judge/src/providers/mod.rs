//! Model provider trait and implementations.
//!
//! The [`ModelProvider`] trait is the only thing the judge needs from a model:
//! a streamed chat completion. Two wire protocols are implemented:
//!
//! - [`OpenAiCompatibleProvider`] for OpenAI and every service exposing the
//!   same chat-completions API (Mistral, xAI, Nebius, Google, Ollama, gateways)
//! - [`AnthropicProvider`] for the Anthropic Messages API

mod anthropic;
mod openai;
mod sse;

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

pub use anthropic::AnthropicProvider;
pub use openai::OpenAiCompatibleProvider;

use crate::error::JudgeError;
use crate::Result;

/// A stream of response chunks.
pub type ChatStream = Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>;

/// Chat message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A plain-text chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// JSON schema the response must conform to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredOutput {
    pub name: String,
    pub description: String,
    pub schema: serde_json::Value,
    pub strict: bool,
}

/// A chat completion request
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub max_tokens: Option<u32>,
    pub structured_output: Option<StructuredOutput>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            max_tokens: None,
            structured_output: None,
        }
    }

    pub fn with_structured_output(mut self, output: StructuredOutput) -> Self {
        self.structured_output = Some(output);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// One increment of streamed output
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamChunk {
    pub delta: String,
}

/// Trait for model providers.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Provider name (e.g. "openai", "anthropic").
    fn name(&self) -> &str;

    /// Start a streaming chat completion.
    ///
    /// Errors returned here mean the request itself failed; errors inside
    /// the stream mean the response broke off part-way.
    async fn chat_stream(&self, request: ChatRequest) -> Result<ChatStream>;
}

/// A parsed `provider/model` reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRef {
    pub provider: String,
    pub model: String,
}

impl ModelRef {
    pub fn parse(s: &str) -> Result<Self> {
        match s.split_once('/') {
            Some((provider, model)) if !provider.is_empty() && !model.is_empty() => Ok(Self {
                provider: provider.to_string(),
                model: model.to_string(),
            }),
            _ => Err(JudgeError::InvalidModel(s.to_string())),
        }
    }
}

impl std::fmt::Display for ModelRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.provider, self.model)
    }
}

/// Environment variable holding the gateway auth token.
pub const GATEWAY_TOKEN_ENV: &str = "AGENT_GATEWAY_TOKEN";

/// Base URL and API-key variable of each OpenAI-compatible provider.
const OPENAI_COMPATIBLE: &[(&str, &str, Option<&str>)] = &[
    ("openai", "https://api.openai.com/v1", Some("OPENAI_API_KEY")),
    ("mistral", "https://api.mistral.ai/v1", Some("MISTRAL_API_KEY")),
    ("xai", "https://api.x.ai/v1", Some("XAI_API_KEY")),
    ("nebius", "https://api.studio.nebius.com/v1", Some("NEBIUS_API_KEY")),
    (
        "google",
        "https://generativelanguage.googleapis.com/v1beta/openai",
        Some("GOOGLE_API_KEY"),
    ),
    ("ollama", "http://localhost:11434/v1", None),
];

/// Construct the provider for `model`.
///
/// With a gateway, every provider is reached through the gateway's
/// OpenAI-compatible endpoint and the full `provider/model` is sent as the
/// model name (see [`request_model_name`]).
pub fn create_provider(
    model: &ModelRef,
    lookup: &dyn Fn(&str) -> Option<String>,
    gateway: Option<&str>,
) -> Result<Arc<dyn ModelProvider>> {
    let get = |name: &str| lookup(name).filter(|v| !v.is_empty());

    if let Some(gateway) = gateway.filter(|g| !g.is_empty()) {
        return Ok(Arc::new(OpenAiCompatibleProvider::new(
            "gateway",
            gateway,
            get(GATEWAY_TOKEN_ENV),
        )));
    }

    if model.provider == "anthropic" {
        let key = get("ANTHROPIC_API_KEY").ok_or_else(|| JudgeError::MissingApiKey {
            provider: "anthropic".to_string(),
            env_var: "ANTHROPIC_API_KEY".to_string(),
        })?;
        return Ok(Arc::new(AnthropicProvider::new(key)));
    }

    let (name, base_url, key_var) = OPENAI_COMPATIBLE
        .iter()
        .find(|(name, _, _)| *name == model.provider)
        .ok_or_else(|| JudgeError::UnknownProvider(model.provider.clone()))?;

    let api_key = match key_var {
        Some(var) => Some(get(var).ok_or_else(|| JudgeError::MissingApiKey {
            provider: name.to_string(),
            env_var: var.to_string(),
        })?),
        None => None,
    };

    Ok(Arc::new(OpenAiCompatibleProvider::new(*name, *base_url, api_key)))
}

/// Model name to put in requests for `model`.
pub fn request_model_name(model: &ModelRef, gateway: Option<&str>) -> String {
    if gateway.is_some_and(|g| !g.is_empty()) {
        model.to_string()
    } else {
        model.model.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_parse_model_ref() {
        let m = ModelRef::parse("anthropic/claude-sonnet-4-5").unwrap();
        assert_eq!(m.provider, "anthropic");
        assert_eq!(m.model, "claude-sonnet-4-5");
        assert_eq!(m.to_string(), "anthropic/claude-sonnet-4-5");
    }

    #[test]
    fn test_parse_keeps_slashes_in_model() {
        let m = ModelRef::parse("nebius/meta-llama/Llama-3.3-70B").unwrap();
        assert_eq!(m.provider, "nebius");
        assert_eq!(m.model, "meta-llama/Llama-3.3-70B");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in ["gpt-4o", "/gpt-4o", "openai/", ""] {
            let err = ModelRef::parse(bad).unwrap_err();
            assert!(matches!(err, JudgeError::InvalidModel(_)), "{bad}");
        }
    }

    #[test]
    fn test_create_openai_requires_key() {
        let m = ModelRef::parse("openai/gpt-4o").unwrap();
        let err = create_provider(&m, &env(&[]), None).err().unwrap();
        assert!(matches!(err, JudgeError::MissingApiKey { .. }));

        let p = create_provider(&m, &env(&[("OPENAI_API_KEY", "sk")]), None).unwrap();
        assert_eq!(p.name(), "openai");
    }

    #[test]
    fn test_create_anthropic() {
        let m = ModelRef::parse("anthropic/claude-sonnet-4-5").unwrap();
        let p = create_provider(&m, &env(&[("ANTHROPIC_API_KEY", "k")]), None).unwrap();
        assert_eq!(p.name(), "anthropic");
    }

    #[test]
    fn test_create_ollama_needs_no_key() {
        let m = ModelRef::parse("ollama/llama3").unwrap();
        let p = create_provider(&m, &env(&[]), None).unwrap();
        assert_eq!(p.name(), "ollama");
    }

    #[test]
    fn test_unknown_provider() {
        let m = ModelRef::parse("acme/model").unwrap();
        let err = create_provider(&m, &env(&[]), None).err().unwrap();
        assert!(matches!(err, JudgeError::UnknownProvider(ref p) if p == "acme"));
    }

    #[test]
    fn test_gateway_overrides_provider() {
        let m = ModelRef::parse("anthropic/claude-sonnet-4-5").unwrap();
        let p = create_provider(&m, &env(&[]), Some("http://gw.local/v1")).unwrap();
        assert_eq!(p.name(), "gateway");
        assert_eq!(
            request_model_name(&m, Some("http://gw.local/v1")),
            "anthropic/claude-sonnet-4-5"
        );
        assert_eq!(request_model_name(&m, None), "claude-sonnet-4-5");
    }
}
