//! Turning an agent's event stream into scores and transcripts.
//!
//! Two views are derived from the same events:
//!
//! - [`parse_container_events`] extracts just what scoring needs.
//! - [`session_from_events`] rebuilds the whole conversation as a
//!   [`Session`] that can be stored and inspected later.
//!
//! The two disagree on token accounting on purpose: the lightweight view
//! adds up `output_tokens` across `token_usage` events, while the
//! transcript keeps the last reported totals.

use serde_json::{Map, Value};
use transcript_store::{
    ChatMessage, FunctionCall, Message, MessageRole, Session, ToolCall, ToolDefinition, Usage,
};

use crate::events::{event_timestamp, AgentEvent, EventToolCall, EventToolDefinition};

/// What scoring needs from an agent run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedOutput {
    /// Concatenated `agent_choice` content.
    pub response: String,
    /// Last reported cost.
    pub cost: f64,
    /// Sum of all reported output tokens.
    pub output_tokens: i64,
    /// Names of the tools the agent called, in order.
    pub tool_calls: Vec<String>,
}

pub fn parse_container_events(events: &[AgentEvent]) -> ParsedOutput {
    let mut out = ParsedOutput::default();

    for event in events {
        match event {
            AgentEvent::AgentChoice {
                content: Some(content),
                ..
            } => out.response.push_str(content),
            AgentEvent::ToolCall {
                tool_call: Some(tc),
                ..
            } => {
                if let Some(name) = tc.name() {
                    out.tool_calls.push(name.to_string());
                }
            }
            AgentEvent::TokenUsage { usage: Some(usage) } => {
                if let Some(cost) = usage.cost {
                    out.cost = cost;
                }
                if let Some(tokens) = usage.output_tokens {
                    out.output_tokens += tokens as i64;
                }
            }
            _ => {}
        }
    }

    out
}

fn to_tool_call(tc: &EventToolCall) -> ToolCall {
    let function = tc.function.as_ref();
    ToolCall {
        id: tc.id.clone().unwrap_or_default(),
        kind: tc.kind.clone().unwrap_or_default(),
        function: FunctionCall {
            name: function.and_then(|f| f.name.clone()).unwrap_or_default(),
            arguments: function
                .and_then(|f| f.arguments.as_ref())
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        },
    }
}

fn to_tool_definition(td: &EventToolDefinition) -> ToolDefinition {
    ToolDefinition {
        name: td.name.clone().unwrap_or_default(),
        category: td.category.clone().unwrap_or_default(),
        description: td.description.clone().unwrap_or_default(),
        parameters: td.parameters.clone(),
    }
}

fn usage_value(m: &Map<String, Value>, keys: &[&str]) -> i64 {
    keys.iter()
        .find_map(|k| m.get(*k).and_then(Value::as_f64))
        .map(|v| v as i64)
        .unwrap_or(0)
}

fn message_usage(m: &Map<String, Value>) -> Usage {
    Usage {
        input_tokens: usage_value(m, &["input_tokens", "InputTokens"]),
        output_tokens: usage_value(m, &["output_tokens", "OutputTokens"]),
        cached_input_tokens: usage_value(m, &["cached_input_tokens", "CachedInputTokens"]),
        cache_write_tokens: usage_value(
            m,
            &["cache_write_tokens", "cached_write_tokens", "CacheWriteTokens"],
        ),
        reasoning_tokens: usage_value(m, &["reasoning_tokens", "ReasoningTokens"]),
    }
}

/// Assistant turn being assembled from streamed events.
#[derive(Default)]
struct PendingTurn {
    content: String,
    reasoning: String,
    tool_calls: Vec<ToolCall>,
    tool_definitions: Vec<ToolDefinition>,
    model: String,
    usage: Option<Usage>,
    cost: f64,
    timestamp: String,
}

impl PendingTurn {
    fn is_empty(&self) -> bool {
        self.content.is_empty() && self.reasoning.is_empty() && self.tool_calls.is_empty()
    }
}

struct Reconstruction {
    session: Session,
    agent_name: String,
    pending: PendingTurn,
}

impl Reconstruction {
    fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let turn = std::mem::take(&mut self.pending);
        self.session.add_message(Message {
            agent_name: self.agent_name.clone(),
            message: ChatMessage {
                role: MessageRole::Assistant,
                content: turn.content,
                reasoning_content: turn.reasoning,
                tool_calls: turn.tool_calls,
                tool_definitions: turn.tool_definitions,
                created_at: turn.timestamp,
                model: turn.model,
                usage: turn.usage,
                cost: turn.cost,
                ..Default::default()
            },
        });
    }

    fn attribute(&mut self, agent_name: &Option<String>, timestamp: &Option<String>) {
        if let Some(name) = agent_name.as_deref().filter(|n| !n.is_empty()) {
            self.agent_name = name.to_string();
        }
        self.pending.timestamp = event_timestamp(timestamp.as_deref());
    }

    fn apply(&mut self, event: &AgentEvent) {
        match event {
            AgentEvent::AgentChoice {
                content,
                agent_name,
                timestamp,
            } => {
                if let Some(content) = content {
                    self.pending.content.push_str(content);
                }
                self.attribute(agent_name, timestamp);
            }
            AgentEvent::AgentChoiceReasoning {
                content,
                agent_name,
                timestamp,
            } => {
                if let Some(content) = content {
                    self.pending.reasoning.push_str(content);
                }
                self.attribute(agent_name, timestamp);
            }
            AgentEvent::ToolCall {
                tool_call,
                tool_definition,
                agent_name,
                timestamp,
            } => {
                if let Some(tc) = tool_call {
                    self.pending.tool_calls.push(to_tool_call(tc));
                }
                // Placeholder keeps definitions index-aligned with calls.
                self.pending.tool_definitions.push(
                    tool_definition
                        .as_ref()
                        .map(to_tool_definition)
                        .unwrap_or_default(),
                );
                self.attribute(agent_name, timestamp);
            }
            AgentEvent::ToolCallResponse {
                tool_call,
                response,
                timestamp,
            } => {
                self.flush();
                if let Some(tc) = tool_call {
                    self.session.add_message(Message {
                        agent_name: String::new(),
                        message: ChatMessage {
                            role: MessageRole::Tool,
                            content: response.clone().unwrap_or_default(),
                            tool_call_id: tc.id.clone().unwrap_or_default(),
                            created_at: event_timestamp(timestamp.as_deref()),
                            ..Default::default()
                        },
                    });
                }
            }
            AgentEvent::TokenUsage { usage: Some(usage) } => {
                if let Some(v) = usage.input_tokens {
                    self.session.input_tokens = v as i64;
                }
                if let Some(v) = usage.output_tokens {
                    self.session.output_tokens = v as i64;
                }
                if let Some(v) = usage.cost {
                    self.session.cost = v;
                }
                if let Some(last) = &usage.last_message {
                    self.pending.usage = Some(message_usage(last));
                    if let Some(model) = last.get("Model").and_then(Value::as_str) {
                        self.pending.model = model.to_string();
                    }
                    if let Some(cost) = last.get("Cost").and_then(Value::as_f64) {
                        self.pending.cost = cost;
                    }
                }
            }
            AgentEvent::Error { error, timestamp } => {
                self.flush();
                if let Some(error) = error.as_deref().filter(|e| !e.is_empty()) {
                    self.session.add_message(Message {
                        agent_name: String::new(),
                        message: ChatMessage {
                            role: MessageRole::System,
                            content: format!("Error: {}", error),
                            created_at: event_timestamp(timestamp.as_deref()),
                            ..Default::default()
                        },
                    });
                }
            }
            AgentEvent::SessionTitle { title } => {
                if let Some(title) = title.as_deref().filter(|t| !t.is_empty()) {
                    self.session.title = title.to_string();
                }
            }
            AgentEvent::StreamStopped => self.flush(),
            AgentEvent::TokenUsage { usage: None } | AgentEvent::Unknown => {}
        }
    }
}

/// Rebuild the conversation the agent had from its event stream.
///
/// The question, if any, becomes the first (user) message. The session is
/// marked tools-approved since the agent ran unattended.
pub fn session_from_events(events: &[AgentEvent], title: &str, question: &str) -> Session {
    let mut session = Session::new(title).with_tools_approved(true);
    if !question.is_empty() {
        session.add_message(Message::user(question));
    }

    let mut rebuild = Reconstruction {
        session,
        agent_name: String::new(),
        pending: PendingTurn::default(),
    };
    for event in events {
        rebuild.apply(event);
    }
    rebuild.flush();

    rebuild.session
}
