//! Transcript-Store: conversation transcripts for agent-eval
//!
//! This crate owns the data model shared by fixtures and reconstructed runs,
//! and the persistence layer that stores reconstructed transcripts.
//!
//! ## Key Components
//!
//! - `Session`: an ordered transcript of messages and nested sub-sessions
//! - `SessionStore`: async storage trait
//! - `SqliteSessionStore`: SQLite implementation (one database per run)
//! - `fakes::MemorySessionStore`: in-memory implementation for tests

mod error;
pub mod fakes;
mod session;
mod store;

pub use error::StoreError;
pub use session::{
    ChatMessage, FunctionCall, Item, Message, MessageRole, Session, ToolCall, ToolDefinition,
    Usage,
};
pub use store::{SessionStore, SqliteSessionStore};

/// Result type for transcript-store operations
pub type Result<T> = std::result::Result<T, StoreError>;
