//! Typed view of the JSON events an agent prints on stdout.
//!
//! Events are decoded once, at the boundary. Anything with an unrecognized
//! `type`, or whose payload does not have the expected shape, becomes
//! [`AgentEvent::Unknown`] and is ignored downstream.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};

/// Function part of a streamed tool call.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct EventFunction {
    #[serde(default)]
    pub name: Option<String>,
    /// Serialized arguments; non-string payloads are kept but not used.
    #[serde(default)]
    pub arguments: Option<Value>,
}

/// Tool call carried by `tool_call` and `tool_call_response` events.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct EventToolCall {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub function: Option<EventFunction>,
}

impl EventToolCall {
    /// Name of the called function, if present.
    pub fn name(&self) -> Option<&str> {
        self.function.as_ref()?.name.as_deref()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct EventToolDefinition {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: Option<Value>,
}

/// Running token totals reported by `token_usage` events.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct EventUsage {
    #[serde(default)]
    pub input_tokens: Option<f64>,
    #[serde(default)]
    pub output_tokens: Option<f64>,
    #[serde(default)]
    pub cost: Option<f64>,
    /// Usage of the most recent model response. Keys may be snake_case or
    /// capitalized depending on the agent version.
    #[serde(default)]
    pub last_message: Option<Map<String, Value>>,
}

/// One event of the agent's output stream.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    AgentChoice {
        #[serde(default)]
        content: Option<String>,
        #[serde(default)]
        agent_name: Option<String>,
        #[serde(default)]
        timestamp: Option<String>,
    },
    AgentChoiceReasoning {
        #[serde(default)]
        content: Option<String>,
        #[serde(default)]
        agent_name: Option<String>,
        #[serde(default)]
        timestamp: Option<String>,
    },
    ToolCall {
        #[serde(default)]
        tool_call: Option<EventToolCall>,
        #[serde(default)]
        tool_definition: Option<EventToolDefinition>,
        #[serde(default)]
        agent_name: Option<String>,
        #[serde(default)]
        timestamp: Option<String>,
    },
    ToolCallResponse {
        #[serde(default)]
        tool_call: Option<EventToolCall>,
        #[serde(default)]
        response: Option<String>,
        #[serde(default)]
        timestamp: Option<String>,
    },
    TokenUsage {
        #[serde(default)]
        usage: Option<EventUsage>,
    },
    Error {
        #[serde(default)]
        error: Option<String>,
        #[serde(default)]
        timestamp: Option<String>,
    },
    SessionTitle {
        #[serde(default)]
        title: Option<String>,
    },
    StreamStopped,
    #[serde(other)]
    Unknown,
}

impl AgentEvent {
    /// Decode one raw event; malformed events become `Unknown`.
    pub fn decode(raw: &Value) -> Self {
        AgentEvent::deserialize(raw).unwrap_or(AgentEvent::Unknown)
    }
}

/// Decode a captured event stream.
pub fn decode_events(raw: &[Value]) -> Vec<AgentEvent> {
    raw.iter().map(AgentEvent::decode).collect()
}

/// The event's timestamp if it is valid RFC 3339, otherwise the current time.
pub fn event_timestamp(timestamp: Option<&str>) -> String {
    match timestamp {
        Some(ts) if DateTime::parse_from_rfc3339(ts).is_ok() => ts.to_string(),
        _ => Utc::now().to_rfc3339(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_known_events() {
        let event = AgentEvent::decode(&json!({
            "type": "agent_choice",
            "content": "Hello",
            "agent_name": "root",
        }));
        assert_eq!(
            event,
            AgentEvent::AgentChoice {
                content: Some("Hello".to_string()),
                agent_name: Some("root".to_string()),
                timestamp: None,
            }
        );

        let event = AgentEvent::decode(&json!({
            "type": "tool_call",
            "tool_call": {"id": "c1", "type": "function", "function": {"name": "search", "arguments": "{}"}},
        }));
        match event {
            AgentEvent::ToolCall { tool_call, tool_definition, .. } => {
                assert_eq!(tool_call.unwrap().name(), Some("search"));
                assert!(tool_definition.is_none());
            }
            other => panic!("unexpected event: {:?}", other),
        }

        assert_eq!(
            AgentEvent::decode(&json!({"type": "stream_stopped", "extra": 1})),
            AgentEvent::StreamStopped
        );
    }

    #[test]
    fn test_unknown_and_malformed_events() {
        assert_eq!(AgentEvent::decode(&json!({"type": "heartbeat"})), AgentEvent::Unknown);
        assert_eq!(AgentEvent::decode(&json!({"content": "no type"})), AgentEvent::Unknown);
        assert_eq!(AgentEvent::decode(&json!({"type": 7})), AgentEvent::Unknown);
        assert_eq!(
            AgentEvent::decode(&json!({"type": "agent_choice", "content": 42})),
            AgentEvent::Unknown
        );
    }

    #[test]
    fn test_null_fields_are_absent() {
        let event = AgentEvent::decode(&json!({"type": "agent_choice", "content": null}));
        assert_eq!(
            event,
            AgentEvent::AgentChoice {
                content: None,
                agent_name: None,
                timestamp: None,
            }
        );
    }

    #[test]
    fn test_non_string_arguments_keep_the_name() {
        let event = AgentEvent::decode(&json!({
            "type": "tool_call",
            "tool_call": {"function": {"name": "search", "arguments": {"q": "rust"}}},
        }));
        match event {
            AgentEvent::ToolCall { tool_call, .. } => {
                assert_eq!(tool_call.unwrap().name(), Some("search"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_event_timestamp() {
        assert_eq!(
            event_timestamp(Some("2025-03-01T12:00:00Z")),
            "2025-03-01T12:00:00Z"
        );

        let fallback = event_timestamp(Some("yesterday"));
        assert!(DateTime::parse_from_rfc3339(&fallback).is_ok());
        assert!(DateTime::parse_from_rfc3339(&event_timestamp(None)).is_ok());
    }
}
