//! Error types for llm-judge

use thiserror::Error;

/// Errors that can occur while talking to a judge model
#[derive(Error, Debug)]
pub enum JudgeError {
    /// Model reference is not `provider/model`
    #[error("invalid judge model format {0:?}: expected 'provider/model'")]
    InvalidModel(String),

    /// Provider name is not supported
    #[error("unsupported judge provider: {0}")]
    UnknownProvider(String),

    /// Required API key is not set
    #[error("missing API key for {provider}: set {env_var}")]
    MissingApiKey { provider: String, env_var: String },

    /// Transport-level HTTP failure
    #[error("HTTP error: {0}")]
    Http(String),

    /// Provider answered with a non-success status
    #[error("{provider} API error ({status}): {body}")]
    Api {
        provider: String,
        status: u16,
        body: String,
    },

    /// Malformed chunk in a streamed response
    #[error("stream error: {0}")]
    Stream(String),

    /// Cancellation fired before the check finished
    #[error("context cancelled")]
    Cancelled,

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<reqwest::Error> for JudgeError {
    fn from(err: reqwest::Error) -> Self {
        JudgeError::Http(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_model_message() {
        let err = JudgeError::InvalidModel("gpt-4o".into());
        assert_eq!(
            err.to_string(),
            "invalid judge model format \"gpt-4o\": expected 'provider/model'"
        );
    }

    #[test]
    fn test_missing_key_message() {
        let err = JudgeError::MissingApiKey {
            provider: "openai".into(),
            env_var: "OPENAI_API_KEY".into(),
        };
        assert_eq!(err.to_string(), "missing API key for openai: set OPENAI_API_KEY");
    }
}
