//! Agent-Eval Core Library
//!
//! Replays golden conversations against a containerized agent and scores
//! what the agent actually did.
//!
//! ## Key Components
//!
//! - `domain`: fixtures, per-fixture results, run summaries
//! - `events` / `transcript`: decoding the agent's JSON event stream
//! - `scoring`: size class, tool-call F1, hand-off matching
//! - `Runner`: loads fixtures and runs them on a bounded worker pool
//! - `ProgressBar`: live status line and per-result report
//! - `save`: run artifacts and fixture files

pub mod config;
pub mod domain;
pub mod error;
pub mod events;
pub mod pattern;
pub mod progress;
pub mod run_name;
pub mod runner;
pub mod save;
pub mod scoring;
pub mod summary;
pub mod telemetry;
pub mod transcript;

pub use config::{default_concurrency, EvalConfig, DEFAULT_JUDGE_MODEL};
pub use domain::{EvalCriteria, EvalResult, EvalRun, EvalSession, Summary};
pub use error::EvalError;
pub use events::{decode_events, AgentEvent};
pub use pattern::matches_any_pattern;
pub use progress::{Console, ProgressBar};
pub use run_name::generate_run_name;
pub use runner::{build_judge, evaluate, load_eval_sessions, Runner};
pub use save::{save_fixture, save_run_json, save_run_sessions, save_run_sessions_json};
pub use scoring::{classify_size, count_handoffs, expected_tool_calls, tool_call_f1_score};
pub use summary::{compute_summary, format_duration, print_summary};
pub use telemetry::init_tracing;
pub use transcript::{parse_container_events, session_from_events, ParsedOutput};

/// Result type for agenteval-core operations
pub type Result<T> = std::result::Result<T, EvalError>;
