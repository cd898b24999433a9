//! Conversation transcript model
//!
//! A [`Session`] is an ordered list of [`Item`]s. Each item is either a chat
//! message attributed to an agent, or a nested sub-session produced by a
//! hand-off to another agent.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role of a chat message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    #[default]
    User,
    Assistant,
    Tool,
}

impl MessageRole {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::Tool => "tool",
        }
    }
}

/// Function name and serialized arguments of a tool call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

/// A single tool invocation requested by the model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub function: FunctionCall,
}

impl ToolCall {
    pub fn function(name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: format!("call_{}", Uuid::new_v4().simple()),
            kind: "function".to_string(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

/// Definition of a tool offered to the model.
///
/// An all-empty definition is a placeholder that keeps
/// `tool_definitions[i]` aligned with `tool_calls[i]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub category: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
}

impl ToolDefinition {
    pub fn is_placeholder(&self) -> bool {
        self.name.is_empty()
            && self.category.is_empty()
            && self.description.is_empty()
            && self.parameters.is_none()
    }
}

/// Token usage attributed to a single model response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: i64,
    #[serde(default)]
    pub output_tokens: i64,
    #[serde(default)]
    pub cached_input_tokens: i64,
    #[serde(default)]
    pub cache_write_tokens: i64,
    #[serde(default)]
    pub reasoning_tokens: i64,
}

fn is_zero(v: &f64) -> bool {
    *v == 0.0
}

/// A chat message as exchanged with the model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reasoning_content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_definitions: Vec<ToolDefinition>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tool_call_id: String,
    /// RFC 3339 timestamp
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub created_at: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub cost: f64,
}

/// A chat message attributed to the agent that produced it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub agent_name: String,
    pub message: ChatMessage,
}

impl Message {
    /// User-role message stamped with the current time.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            agent_name: String::new(),
            message: ChatMessage {
                role: MessageRole::User,
                content: content.into(),
                created_at: Utc::now().to_rfc3339(),
                ..Default::default()
            },
        }
    }
}

/// One entry of a session transcript
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Item {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_session: Option<Session>,
}

impl Item {
    pub fn message(message: Message) -> Self {
        Self {
            message: Some(message),
            sub_session: None,
        }
    }

    pub fn sub_session(session: Session) -> Self {
        Self {
            message: None,
            sub_session: Some(session),
        }
    }
}

/// A recorded conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub messages: Vec<Item>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub input_tokens: i64,
    #[serde(default)]
    pub output_tokens: i64,
    #[serde(default)]
    pub cost: f64,
    #[serde(default)]
    pub tools_approved: bool,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: String::new(),
            messages: Vec::new(),
            created_at: Utc::now(),
            input_tokens: 0,
            output_tokens: 0,
            cost: 0.0,
            tools_approved: false,
        }
    }
}

impl Session {
    /// Create an empty session with a fresh id.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_tools_approved(mut self, approved: bool) -> Self {
        self.tools_approved = approved;
        self
    }

    pub fn add_message(&mut self, message: Message) {
        self.messages.push(Item::message(message));
    }

    /// Top-level messages, skipping sub-sessions.
    pub fn chat_messages(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter_map(|item| item.message.as_ref())
    }

    /// Content of the first user-role message, or empty.
    pub fn first_user_message(&self) -> String {
        self.chat_messages()
            .find(|m| m.message.role == MessageRole::User)
            .map(|m| m.message.content.clone())
            .unwrap_or_default()
    }

    /// Wall-clock span between the first and last timestamped messages.
    ///
    /// Zero when fewer than two messages carry a parseable timestamp.
    pub fn duration(&self) -> Duration {
        let stamps: Vec<DateTime<Utc>> = self
            .chat_messages()
            .filter_map(|m| DateTime::parse_from_rfc3339(&m.message.created_at).ok())
            .map(|t| t.with_timezone(&Utc))
            .collect();

        match (stamps.first(), stamps.last()) {
            (Some(first), Some(last)) => (*last - *first).to_std().unwrap_or_default(),
            _ => Duration::ZERO,
        }
    }
}
