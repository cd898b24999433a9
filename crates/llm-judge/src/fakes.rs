//! Scripted model provider (testing only)
//!
//! Answers each request by calling a function of the prompt text, streams
//! the answer back in two chunks and records request and concurrency
//! statistics.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::JudgeError;
use crate::providers::{ChatRequest, ChatStream, ModelProvider, StreamChunk};
use crate::Result;

type Script = dyn Fn(&str) -> Result<String> + Send + Sync;

/// Provider whose answers come from a closure over the prompt.
pub struct ScriptedProvider {
    script: Arc<Script>,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl ScriptedProvider {
    pub fn new(script: impl Fn(&str) -> Result<String> + Send + Sync + 'static) -> Self {
        Self {
            script: Arc::new(script),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Passes every criterion whose text contains `needle`, fails the rest.
    pub fn passing_when_contains(needle: &'static str) -> Self {
        Self::new(move |prompt| {
            let criterion = prompt
                .split("<criteria>\n")
                .nth(1)
                .and_then(|rest| rest.split("\n</criteria>").next())
                .unwrap_or_default();
            let result = if criterion.contains(needle) { "pass" } else { "fail" };
            Ok(format!(r#"{{"result":"{}","reason":"scripted"}}"#, result))
        })
    }

    /// Hold each stream open for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of requests observed in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn chat_stream(&self, request: ChatRequest) -> Result<ChatStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let prompt = request
            .messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let answer = (self.script)(&prompt);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let answer = answer?;
        let split = answer
            .char_indices()
            .nth(answer.chars().count() / 2)
            .map(|(i, _)| i)
            .unwrap_or(0);
        let chunks: Vec<Result<StreamChunk>> = vec![
            Ok(StreamChunk {
                delta: answer[..split].to_string(),
            }),
            Ok(StreamChunk {
                delta: answer[split..].to_string(),
            }),
        ];
        Ok(Box::pin(futures::stream::iter(chunks)))
    }
}

/// Provider that fails every request.
pub fn failing_provider(message: &'static str) -> ScriptedProvider {
    ScriptedProvider::new(move |_| Err(JudgeError::Http(message.to_string())))
}
