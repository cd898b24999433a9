//! Concurrent LLM-as-a-judge relevance checks.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::JudgeError;
use crate::providers::{ChatRequest, Message, ModelProvider, StructuredOutput};
use crate::Result;

const MAX_JUDGE_TOKENS: u32 = 1024;

/// Prompt sent for each criterion.
pub fn relevance_prompt(response: &str, criterion: &str) -> String {
    format!(
        "You are an evaluation judge. Check if the response matches the given relevance criteria.\n\
         \n\
         Response to evaluate:\n\
         <response>\n\
         {response}\n\
         </response>\n\
         \n\
         Criteria to check:\n\
         <criteria>\n\
         {criterion}\n\
         </criteria>\n\
         \n\
         Evaluate whether the response satisfies the criteria and respond with your judgment."
    )
}

/// Schema the judge's answer must follow.
pub fn judge_response_schema() -> StructuredOutput {
    StructuredOutput {
        name: "judge_response".to_string(),
        description: "Evaluation result for a relevance criterion".to_string(),
        schema: json!({
            "type": "object",
            "properties": {
                "result": {
                    "type": "string",
                    "enum": ["pass", "fail"],
                    "description": "Whether the response satisfies the criterion",
                },
                "reason": {
                    "type": "string",
                    "description": "Brief explanation of why the criterion passed or failed",
                },
            },
            "required": ["result", "reason"],
            "additionalProperties": false,
        }),
        strict: true,
    }
}

#[derive(Debug, Deserialize)]
struct JudgeVerdict {
    result: String,
    #[serde(default)]
    reason: String,
}

impl JudgeVerdict {
    fn passed(&self) -> bool {
        self.result.eq_ignore_ascii_case("pass")
    }
}

fn parse_verdict(text: &str) -> Option<JudgeVerdict> {
    serde_json::from_str(text.trim()).ok()
}

/// Whether the judge's answer is a pass. Anything unparseable is a fail.
pub fn parse_judge_response(text: &str) -> bool {
    parse_verdict(text).is_some_and(|v| v.passed())
}

/// Outcome of checking all criteria for one response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelevanceOutcome {
    /// Number of criteria judged as passing.
    pub passed: usize,
    /// Criteria judged as failing, in input order.
    pub failed: Vec<String>,
    /// One message per criterion that could not be judged, in input order.
    pub errors: Vec<String>,
}

/// Runs relevance checks against a model with bounded concurrency.
///
/// The concurrency limit is shared by every `check_relevance` call on the
/// same judge, so concurrent evaluations never exceed it in total.
pub struct Judge {
    provider: Arc<dyn ModelProvider>,
    model: String,
    concurrency: usize,
    permits: Arc<Semaphore>,
}

impl Judge {
    /// Create a judge; `concurrency` below 1 is raised to 1.
    pub fn new(provider: Arc<dyn ModelProvider>, model: impl Into<String>, concurrency: usize) -> Self {
        let concurrency = concurrency.max(1);
        Self {
            provider,
            model: model.into(),
            concurrency,
            permits: Arc::new(Semaphore::new(concurrency)),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Judge `response` against every criterion.
    pub async fn check_relevance(
        &self,
        cancel: &CancellationToken,
        response: &str,
        criteria: &[String],
    ) -> RelevanceOutcome {
        if criteria.is_empty() {
            return RelevanceOutcome::default();
        }

        let queue: Mutex<VecDeque<(usize, &str)>> =
            Mutex::new(criteria.iter().map(String::as_str).enumerate().collect());
        let slots: Mutex<Vec<Option<Result<bool>>>> =
            Mutex::new((0..criteria.len()).map(|_| None).collect());

        {
            let queue = &queue;
            let slots = &slots;
            let workers = self.concurrency.min(criteria.len());
            futures::future::join_all((0..workers).map(move |_| async move {
                loop {
                    let next = queue.lock().unwrap_or_else(|e| e.into_inner()).pop_front();
                    let Some((index, criterion)) = next else {
                        break;
                    };
                    let outcome = if cancel.is_cancelled() {
                        Err(JudgeError::Cancelled)
                    } else {
                        self.check_single(cancel, response, criterion).await
                    };
                    slots.lock().unwrap_or_else(|e| e.into_inner())[index] = Some(outcome);
                }
            }))
            .await;
        }

        let results = slots.into_inner().unwrap_or_else(|e| e.into_inner());
        let mut outcome = RelevanceOutcome::default();
        for (criterion, result) in criteria.iter().zip(results) {
            match result.unwrap_or(Err(JudgeError::Cancelled)) {
                Ok(true) => outcome.passed += 1,
                Ok(false) => outcome.failed.push(criterion.clone()),
                Err(e) => outcome
                    .errors
                    .push(format!("error checking {:?}: {}", criterion, e)),
            }
        }
        outcome
    }

    async fn check_single(
        &self,
        cancel: &CancellationToken,
        response: &str,
        criterion: &str,
    ) -> Result<bool> {
        let _permit = tokio::select! {
            permit = self.permits.acquire() => permit.map_err(|_| JudgeError::Cancelled)?,
            _ = cancel.cancelled() => return Err(JudgeError::Cancelled),
        };

        let request = ChatRequest::new(
            self.model.clone(),
            vec![Message::user(relevance_prompt(response, criterion))],
        )
        .with_max_tokens(MAX_JUDGE_TOKENS)
        .with_structured_output(judge_response_schema());

        let mut stream = tokio::select! {
            stream = self.provider.chat_stream(request) => stream?,
            _ = cancel.cancelled() => return Err(JudgeError::Cancelled),
        };

        let mut text = String::new();
        loop {
            tokio::select! {
                chunk = stream.next() => match chunk {
                    Some(Ok(chunk)) => text.push_str(&chunk.delta),
                    Some(Err(e)) => {
                        debug!(criterion = %criterion, error = %e, "judge stream ended early");
                        break;
                    }
                    None => break,
                },
                _ = cancel.cancelled() => return Err(JudgeError::Cancelled),
            }
        }

        match parse_verdict(&text) {
            Some(verdict) => {
                debug!(
                    criterion = %criterion,
                    result = %verdict.result,
                    reason = %verdict.reason,
                    "judge verdict"
                );
                Ok(verdict.passed())
            }
            None => {
                debug!(criterion = %criterion, output = %text, "unparseable judge verdict");
                Ok(false)
            }
        }
    }
}
