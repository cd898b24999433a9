//! LLM-Judge: relevance checks for agent-eval
//!
//! A [`Judge`] asks a model whether a response satisfies each of a list of
//! natural-language criteria, using structured output so the verdict is a
//! machine-readable `pass` or `fail`.
//!
//! Models are reached through the [`ModelProvider`] trait; use
//! [`create_provider`] to build one from a `provider/model` string.

mod error;
pub mod fakes;
mod judge;
pub mod providers;

pub use error::JudgeError;
pub use judge::{
    judge_response_schema, parse_judge_response, relevance_prompt, Judge, RelevanceOutcome,
};
pub use providers::{
    create_provider, request_model_name, ChatRequest, ChatStream, ModelProvider, ModelRef,
    StreamChunk,
};

/// Result type for llm-judge operations
pub type Result<T> = std::result::Result<T, JudgeError>;
