//! Deterministic scoring: response size, tool-call F1 and hand-offs.

use std::collections::HashMap;

use transcript_store::Item;

/// Tool name that transfers control to another agent.
pub const HANDOFF_TOOL: &str = "handoff";

/// Size class of a response by byte length.
pub fn classify_size(response: &str) -> &'static str {
    match response.len() {
        0..=499 => "S",
        500..=1499 => "M",
        1500..=4999 => "L",
        _ => "XL",
    }
}

fn counts(names: &[String]) -> HashMap<&str, usize> {
    let mut counts = HashMap::new();
    for name in names {
        *counts.entry(name.as_str()).or_insert(0) += 1;
    }
    counts
}

/// F1 score of `actual` against `expected`, comparing names as multisets.
pub fn tool_call_f1_score(expected: &[String], actual: &[String]) -> f64 {
    if expected.is_empty() && actual.is_empty() {
        return 1.0;
    }
    if expected.is_empty() || actual.is_empty() {
        return 0.0;
    }

    let actual_counts = counts(actual);
    let true_positives: usize = counts(expected)
        .into_iter()
        .map(|(name, n)| n.min(actual_counts.get(name).copied().unwrap_or(0)))
        .sum();

    let precision = true_positives as f64 / actual.len() as f64;
    let recall = true_positives as f64 / expected.len() as f64;

    if precision + recall == 0.0 {
        return 0.0;
    }
    2.0 * precision * recall / (precision + recall)
}

/// Number of hand-off tool calls.
pub fn count_handoffs(tool_calls: &[String]) -> usize {
    tool_calls.iter().filter(|name| *name == HANDOFF_TOOL).count()
}

/// Tool names called anywhere in `items`, including nested sub-sessions.
pub fn expected_tool_calls(items: &[Item]) -> Vec<String> {
    let mut names = Vec::new();
    for item in items {
        if let Some(message) = &item.message {
            names.extend(
                message
                    .message
                    .tool_calls
                    .iter()
                    .map(|tc| tc.function.name.clone()),
            );
        }
        if let Some(sub) = &item.sub_session {
            names.extend(expected_tool_calls(&sub.messages));
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use transcript_store::{ChatMessage, Message, MessageRole, Session, ToolCall};

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_size_boundaries() {
        assert_eq!(classify_size(""), "S");
        assert_eq!(classify_size(&"a".repeat(499)), "S");
        assert_eq!(classify_size(&"a".repeat(500)), "M");
        assert_eq!(classify_size(&"a".repeat(1499)), "M");
        assert_eq!(classify_size(&"a".repeat(1500)), "L");
        assert_eq!(classify_size(&"a".repeat(4999)), "L");
        assert_eq!(classify_size(&"a".repeat(5000)), "XL");
    }

    #[test]
    fn test_size_counts_bytes() {
        // 250 two-byte characters
        assert_eq!(classify_size(&"é".repeat(250)), "M");
    }

    #[test]
    fn test_f1_empty_sides() {
        assert_eq!(tool_call_f1_score(&[], &[]), 1.0);
        assert_eq!(tool_call_f1_score(&names(&["a"]), &[]), 0.0);
        assert_eq!(tool_call_f1_score(&[], &names(&["a"])), 0.0);
    }

    #[test]
    fn test_f1_is_order_independent() {
        let expected = names(&["search", "read", "search"]);
        let actual = names(&["read", "search", "search"]);
        assert_eq!(tool_call_f1_score(&expected, &actual), 1.0);
    }

    #[test]
    fn test_f1_partial_overlap() {
        // tp = 1, precision = 1/2, recall = 1/1
        let score = tool_call_f1_score(&names(&["search"]), &names(&["search", "write"]));
        assert!((score - 2.0 / 3.0).abs() < 1e-9);

        // multiset: expected twice, called once
        let score = tool_call_f1_score(&names(&["a", "a"]), &names(&["a"]));
        assert!((score - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_f1_disjoint_is_zero() {
        assert_eq!(tool_call_f1_score(&names(&["a"]), &names(&["b"])), 0.0);
    }

    #[test]
    fn test_count_handoffs() {
        assert_eq!(count_handoffs(&names(&["handoff", "transfer_task", "handoff"])), 2);
        assert_eq!(count_handoffs(&names(&["transfer_task"])), 0);
        assert_eq!(count_handoffs(&names(&["Handoff"])), 0);
    }

    #[test]
    fn test_expected_tool_calls_recurses_into_sub_sessions() {
        let call = |name: &str| Message {
            agent_name: "root".to_string(),
            message: ChatMessage {
                role: MessageRole::Assistant,
                tool_calls: vec![ToolCall::function(name, "{}")],
                ..Default::default()
            },
        };

        let mut child = Session::new("child");
        child.add_message(call("search"));

        let mut root = Session::new("root");
        root.add_message(Message::user("q"));
        root.add_message(call("handoff"));
        root.messages.push(Item::sub_session(child));
        root.add_message(call("write"));

        assert_eq!(
            expected_tool_calls(&root.messages),
            names(&["handoff", "search", "write"])
        );
    }
}
