//! Environment lookup used when forwarding credentials into containers.

use std::collections::HashMap;

/// API-key variables forwarded into the agent container when set.
pub const FORWARDED_API_KEYS: &[&str] = &[
    "OPENAI_API_KEY",
    "ANTHROPIC_API_KEY",
    "GOOGLE_API_KEY",
    "MISTRAL_API_KEY",
    "XAI_API_KEY",
    "NEBIUS_API_KEY",
];

/// Variable carrying the models gateway URL inside the container.
pub const GATEWAY_URL_ENV: &str = "AGENT_MODELS_GATEWAY";

/// Variable carrying the models gateway auth token.
pub const GATEWAY_TOKEN_ENV: &str = "AGENT_GATEWAY_TOKEN";

/// Source of environment values.
pub trait EnvProvider: Send + Sync {
    fn get(&self, name: &str) -> Option<String>;

    /// Like `get`, but treats an empty value as unset.
    fn get_non_empty(&self, name: &str) -> Option<String> {
        self.get(name).filter(|v| !v.is_empty())
    }
}

/// Reads from the current process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvProvider for ProcessEnv {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// Fixed set of values, for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct MapEnv(HashMap<String, String>);

impl MapEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }
}

impl EnvProvider for MapEnv {
    fn get(&self, name: &str) -> Option<String> {
        self.0.get(name).cloned()
    }
}
