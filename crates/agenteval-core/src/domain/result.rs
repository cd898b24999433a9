//! Per-fixture evaluation result.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use transcript_store::Session;

/// Outcome of replaying one fixture against the agent.
///
/// When `error` is set the remaining pass/fail fields are not consulted:
/// an errored evaluation is reported as a single failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvalResult {
    pub input_path: String,
    pub title: String,
    pub question: String,
    pub response: String,
    pub cost: f64,
    pub output_tokens: i64,
    pub size: String,
    pub size_expected: String,
    /// Tool-call F1 score in `[0, 1]`.
    pub tool_calls_score: f64,
    /// `1` when the fixture expects tool calls, else `0`.
    #[serde(rename = "tool_calls_score_expected")]
    pub tool_calls_expected: f64,
    #[serde(rename = "handoffs")]
    pub handoffs_match: bool,
    #[serde(rename = "relevance")]
    pub relevance_passed: f64,
    pub relevance_expected: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_relevance: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub raw_output: Vec<Value>,

    /// Transcript rebuilt from the agent's events.
    #[serde(skip)]
    pub session: Option<Session>,
}

impl EvalResult {
    /// Human-readable successes and failures, in report order.
    pub fn check_results(&self) -> (Vec<String>, Vec<String>) {
        if let Some(error) = &self.error {
            return (Vec::new(), vec![error.clone()]);
        }

        let mut successes = Vec::new();
        let mut failures = Vec::new();

        if !self.size_expected.is_empty() {
            if self.size_expected == self.size {
                successes.push(format!("size {}", self.size));
            } else {
                failures.push(format!(
                    "size expected {}, got {}",
                    self.size_expected, self.size
                ));
            }
        }

        if self.tool_calls_expected > 0.0 {
            if self.tool_calls_score >= 1.0 {
                successes.push("tool calls".to_string());
            } else {
                failures.push(format!("tool calls score {:.2}", self.tool_calls_score));
            }
        }

        if self.handoffs_match {
            successes.push("handoffs".to_string());
        } else {
            failures.push("handoffs mismatch".to_string());
        }

        if self.relevance_expected > 0.0 {
            if self.relevance_passed >= self.relevance_expected {
                successes.push(format!(
                    "relevance {:.0}/{:.0}",
                    self.relevance_passed, self.relevance_expected
                ));
            } else {
                for criterion in &self.failed_relevance {
                    failures.push(format!("relevance: {}", criterion));
                }
            }
        }

        (successes, failures)
    }

    /// True when `check_results` reports no failures.
    pub fn passed(&self) -> bool {
        self.check_results().1.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_is_the_only_failure() {
        let result = EvalResult {
            error: Some("container failed".to_string()),
            size_expected: "M".to_string(),
            handoffs_match: true,
            ..Default::default()
        };

        let (successes, failures) = result.check_results();
        assert!(successes.is_empty());
        assert_eq!(failures, vec!["container failed"]);
    }

    #[test]
    fn test_size_mismatch_and_handoffs() {
        let result = EvalResult {
            size_expected: "M".to_string(),
            size: "S".to_string(),
            handoffs_match: true,
            ..Default::default()
        };

        let (successes, failures) = result.check_results();
        assert_eq!(successes, vec!["handoffs"]);
        assert_eq!(failures, vec!["size expected M, got S"]);
        assert!(!result.passed());
    }

    #[test]
    fn test_all_checks_pass() {
        let result = EvalResult {
            size_expected: "L".to_string(),
            size: "L".to_string(),
            tool_calls_expected: 1.0,
            tool_calls_score: 1.0,
            handoffs_match: true,
            relevance_expected: 2.0,
            relevance_passed: 2.0,
            ..Default::default()
        };

        let (successes, failures) = result.check_results();
        assert_eq!(successes, vec!["size L", "tool calls", "handoffs", "relevance 2/2"]);
        assert!(failures.is_empty());
        assert!(result.passed());
    }

    #[test]
    fn test_partial_tool_calls_and_relevance() {
        let result = EvalResult {
            tool_calls_expected: 1.0,
            tool_calls_score: 0.5,
            handoffs_match: false,
            relevance_expected: 3.0,
            relevance_passed: 1.0,
            failed_relevance: vec!["cites a source".to_string(), "is polite".to_string()],
            ..Default::default()
        };

        let (successes, failures) = result.check_results();
        assert!(successes.is_empty());
        assert_eq!(
            failures,
            vec![
                "tool calls score 0.50",
                "handoffs mismatch",
                "relevance: cites a source",
                "relevance: is polite",
            ]
        );
    }

    #[test]
    fn test_json_field_names() {
        let result = EvalResult {
            title: "t".to_string(),
            tool_calls_expected: 1.0,
            handoffs_match: true,
            relevance_passed: 2.0,
            session: Some(Session::new("t")),
            ..Default::default()
        };

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["tool_calls_score_expected"], 1.0);
        assert_eq!(value["handoffs"], true);
        assert_eq!(value["relevance"], 2.0);
        assert!(value.get("error").is_none());
        assert!(value.get("raw_output").is_none());
        assert!(value.get("session").is_none());
    }
}
